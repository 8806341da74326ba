use axum::{Json, extract::State, http::StatusCode, response::{IntoResponse, Response}};
use std::sync::Arc;
use crate::models::{ErrorResponse, SlowResponse};
use crate::state::AppState;

pub async fn slow_handler(State(state): State<Arc<AppState>>) -> Response {
    tracing::info!("Req came on /slow route");

    match state.heavy_task.run().await {
        Ok(ms) => Json(SlowResponse {
            status: "Success".to_string(),
            message: format!("Heavy task completed in {} ms", ms),
        })
        .into_response(),
        // logged here, the client only sees the generic body
        Err(e) => {
            tracing::error!("{}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::internal())).into_response()
        }
    }
}
