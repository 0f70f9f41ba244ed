use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

use crate::data::model::{DanglingReference, Id};
use crate::web::views::ErrorPage;

/// Failures of the Pixel Set store and its pixel source.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("catalog is inconsistent: {0}")]
    Integrity(DanglingReference),

    #[error("no Pixel Set with id {0}")]
    NotFound(Id),

    #[error("pixel file {} of Pixel Set {pixel_set} is missing", .path.display())]
    MissingPixelFile { pixel_set: String, path: PathBuf },

    #[error("cannot read pixel file of Pixel Set {pixel_set}: {reason}")]
    UnreadablePixelFile { pixel_set: String, reason: String },
}

/// Failures while producing an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("export aborted: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by HTTP handlers, rendered as HTML error pages.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("session data could not be stored: {0}")]
    Session(#[from] serde_json::Error),

    #[error("pixel reader failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::Store(StoreError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Export(ExportError::Store(StoreError::NotFound(_))) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let title = match status {
            StatusCode::NOT_FOUND => "Not found",
            StatusCode::BAD_REQUEST => "Bad request",
            _ => "Server error",
        };
        if status.is_server_error() {
            log::error!("{status}: {self}");
        }
        let page = ErrorPage {
            status: status.as_u16(),
            title: title.to_string(),
            message: self.to_string(),
        };
        (status, Html(page.to_string())).into_response()
    }
}
