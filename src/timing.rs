//! Request timing interceptor.
//!
//! Every request gets a `PendingRequest` when it arrives. Once the inner
//! service has produced a response it is turned into an `Observation`
//! (which consumes it, so it can only complete once) and recorded into
//! `HttpMetrics`. If the request future is dropped first (client went away)
//! nothing is recorded.

use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::{HttpMetrics, Observation};
use crate::state::AppState;

// PENDING half of a request's lifecycle
pub struct PendingRequest {
    method: String,
    route: String,
    start: Instant,
    completed: bool,
}

impl PendingRequest {
    pub fn start(method: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            route: route.into(),
            start: Instant::now(),
            completed: false,
        }
    }

    /// Move to COMPLETED. Takes `self`, so a request can't complete twice.
    pub fn finish(mut self, status: StatusCode) -> Observation {
        self.completed = true;
        Observation {
            method: std::mem::take(&mut self.method),
            route: std::mem::take(&mut self.route),
            status_code: status.as_u16(),
            elapsed_ms: (self.start.elapsed().as_secs_f64() * 1000.0).max(0.0),
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if !self.completed {
            tracing::debug!(
                method = %self.method,
                route = %self.route,
                "request dropped before a response was produced, not recorded"
            );
        }
    }
}

// Record one observation. A label mismatch here is a bug in this crate,
// it gets logged and the observation is dropped.
pub fn record(metrics: &HttpMetrics, obs: &Observation) {
    if let Err(e) = metrics.record(obs) {
        tracing::error!(error = %e, "dropping request observation");
    }
}

fn route_of(req: &Request) -> String {
    match req.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => req.uri().path().to_string(),
    }
}

/// axum middleware, installed with `middleware::from_fn_with_state`.
pub async fn track_timing(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let pending = PendingRequest::start(req.method().as_str(), route_of(&req));

    let response = next.run(req).await;

    let obs = pending.finish(response.status());
    record(&state.http_metrics, &obs);

    response
}
