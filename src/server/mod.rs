pub mod assets;
pub mod health;
pub mod pages;
pub mod routes;
pub mod sse;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::daemon::downloader::Downloader;
use crate::daemon::tracker::JobTracker;
use crate::models::ServerConfig;
use crate::storage::JsonWatchStore;

/// Shared application state for the Axum server.
pub struct AppState {
    pub store: Arc<JsonWatchStore>,
    pub tracker: Arc<JobTracker>,
    pub downloader: Arc<Downloader>,
    pub config: Arc<ServerConfig>,
    pub start_time: Instant,
}

/// Create the Axum router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::download_form).post(routes::start_download))
        .route("/progress/{job_id}", get(routes::progress))
        .route("/progress/{job_id}/stream", get(sse::progress_stream))
        .route("/watches", get(routes::list_watches))
        .route(
            "/watches/add",
            get(routes::add_watch_form).post(routes::add_watch),
        )
        .route(
            "/watches/{id}/edit",
            get(routes::edit_watch_form).post(routes::edit_watch),
        )
        .route("/watches/{id}/delete", post(routes::delete_watch))
        .route("/watches/{id}/run", post(routes::run_watch))
        .route("/health", get(health::health_check))
        .route("/api/watches", get(routes::api_list_watches))
        .route("/api/jobs/{id}", get(routes::api_get_job))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .fallback(assets::serve_embedded)
}
