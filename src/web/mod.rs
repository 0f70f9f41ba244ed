//! HTTP surface: router, shared state and request logging.

pub mod charts;
pub mod form;
pub mod handlers;
pub mod render;
pub mod session;
pub mod views;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use crate::data::store::CatalogStore;
use crate::state::SessionStore;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_PREVIEW_LIMIT: usize = 100;

/// Shared by every handler. The store is immutable; sessions carry their own lock.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CatalogStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub page_size: usize,
    pub preview_limit: usize,
}

impl AppState {
    pub fn new(store: CatalogStore, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            store: Arc::new(store),
            sessions,
            page_size: DEFAULT_PAGE_SIZE,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_preview_limit(mut self, preview_limit: usize) -> Self {
        self.preview_limit = preview_limit.max(1);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/pixelsets/",
            get(handlers::list_get).post(handlers::list_post),
        )
        .route("/pixelsets/export", get(handlers::export_selection))
        .route("/pixelsets/selection/clear", post(handlers::clear_selection))
        .route("/pixelsets/selection/values", get(handlers::selection_values))
        .route(
            "/pixelsets/selection/quality-scores",
            get(handlers::selection_quality_scores),
        )
        .route(
            "/pixelsets/selection/cumulative-values",
            get(handlers::selection_cumulative_values),
        )
        .route(
            "/pixelsets/selection/cumulative-quality-scores",
            get(handlers::selection_cumulative_quality_scores),
        )
        .route(
            "/pixelsets/:id",
            get(handlers::detail_get).post(handlers::detail_post),
        )
        .route("/pixelsets/:id/clear", post(handlers::clear_detail))
        .route("/pixelsets/:id/export", get(handlers::export_single))
        .route("/pixelsets/:id/values", get(handlers::detail_values))
        .route(
            "/pixelsets/:id/quality-scores",
            get(handlers::detail_quality_scores),
        )
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    log::info!(
        "{method} {path} {} {}ms",
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}
