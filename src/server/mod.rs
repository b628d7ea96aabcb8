//! HTTP surface of the pipeline.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /health` | liveness and version |
//! | `GET/POST /api/settings` | runtime settings |
//! | `GET/POST /api/firmendaten` | firm data of the issuer |
//! | `POST /api/process` | run one job on the multipart field `file` |
//! | `GET /api/output/:job/:file` | download an artifact |

mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use handlers::Health;

use crate::config::ConfigStore;
use crate::pipeline::JobOrchestrator;

/// Room for multipart framing on top of the document limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared state of all handlers.
pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub orchestrator: Arc<JobOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<JobOrchestrator>) -> Self {
        Self {
            store: orchestrator.store().clone(),
            orchestrator,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.orchestrator.config().extractor.max_document_bytes + MULTIPART_OVERHEAD;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/settings",
            get(handlers::get_settings).post(handlers::update_settings),
        )
        .route(
            "/api/firmendaten",
            get(handlers::get_issuer).post(handlers::update_issuer),
        )
        .route("/api/process", post(handlers::process))
        .route("/api/output/:job/:file", get(handlers::output_file))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
