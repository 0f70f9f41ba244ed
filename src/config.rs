use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

/// Browse, filter and export Pixel Sets over HTTP.
#[derive(Parser, Debug)]
#[command(name = "pixel-explorer", author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the web explorer.
    Serve(ServeArgs),
    /// Recompute the cached fields of every Pixel Set from its pixel file.
    Reindex(ReindexArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Catalog JSON file.
    #[arg(long, env = "PIXEL_EXPLORER_CATALOG")]
    pub catalog: PathBuf,
    /// Directory pixel file paths are relative to (defaults to the catalog's directory).
    #[arg(long, env = "PIXEL_EXPLORER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
    #[arg(long, env = "PIXEL_EXPLORER_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,
    /// Pixel Sets per list page.
    #[arg(long, env = "PIXEL_EXPLORER_PAGE_SIZE", default_value_t = 10, value_parser = positive_usize)]
    pub page_size: usize,
    /// Pixels shown on a detail page.
    #[arg(long, env = "PIXEL_EXPLORER_PREVIEW_LIMIT", default_value_t = 100, value_parser = positive_usize)]
    pub preview_limit: usize,
    /// Idle time after which a session is forgotten.
    #[arg(long, env = "PIXEL_EXPLORER_SESSION_TTL", default_value_t = 1_209_600, value_parser = positive_u64)]
    pub session_ttl_secs: u64,
}

impl ServeArgs {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| default_data_dir(&self.catalog))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ReindexArgs {
    #[arg(long, env = "PIXEL_EXPLORER_CATALOG")]
    pub catalog: PathBuf,
    #[arg(long, env = "PIXEL_EXPLORER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

impl ReindexArgs {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| default_data_dir(&self.catalog))
    }
}

/// The catalog's parent directory, or `.` for a bare file name.
pub fn default_data_dir(catalog: &Path) -> PathBuf {
    catalog
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn positive_usize(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn positive_u64(raw: &str) -> Result<u64, String> {
    match raw.parse::<u64>() {
        Ok(0) => Err("must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
