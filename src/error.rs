use thiserror::Error;

// Errors raised by the metrics registry
#[derive(Debug, Error)]
pub enum MetricsError {
    // bad registration (duplicate name, malformed buckets) - fatal at startup
    #[error("metrics config error: {0}")]
    Config(String),

    // observation whose labels don't match the declared label names
    #[error("label mismatch on {metric}: expected {expected:?}, got {got:?}")]
    LabelMismatch {
        metric: String,
        expected: Vec<String>,
        got: Vec<String>,
    },
}

impl From<prometheus::Error> for MetricsError {
    fn from(err: prometheus::Error) -> Self {
        MetricsError::Config(err.to_string())
    }
}

// Failure inside a route handler, always answered with a generic 500
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Task(String),
}
