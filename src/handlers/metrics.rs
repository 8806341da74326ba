use axum::{extract::State, http::header, response::IntoResponse};
use std::sync::Arc;
use crate::state::AppState;

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.metrics.serialize();
    ([(header::CONTENT_TYPE, state.metrics.content_type())], body)
}
