pub mod config;
pub mod error;
pub mod handlers;
pub mod heavy_task;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod process;
pub mod state;
pub mod timing;

use axum::{Router, middleware, routing::get};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

use crate::handlers::{hello_handler, metrics_handler, panic_response, slow_handler};
use crate::state::AppState;

// the three routes, no instrumentation
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(hello_handler))
        .route("/slow", get(slow_handler))
        .route("/metrics", get(metrics_handler))
}

/// Wrap `router` so every request (404s included) is timed and recorded,
/// with panics turned into a 500 inside the timing layer.
pub fn instrument(router: Router<Arc<AppState>>, state: Arc<AppState>) -> Router {
    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(state.clone(), timing::track_timing))
        .with_state(state)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    instrument(routes(), state)
}
