//! pixel-explorer: browse, filter and export Pixel Sets.

pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod reindex;
pub mod state;
pub mod web;
