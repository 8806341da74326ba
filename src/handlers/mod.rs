mod hello;
mod metrics;
mod slow;

pub use hello::hello_handler;
pub use metrics::metrics_handler;
pub use slow::slow_handler;

use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use std::any::Any;

use crate::models::ErrorResponse;

// used by the panic layer: a panicking handler answers like a failed one
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic"
    };
    tracing::error!(panic = detail, "handler panicked");

    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::internal())).into_response()
}
