use serde::{Deserialize, Serialize};

// GET / response
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HelloResponse {
    pub message: String,
}

// GET /slow success response
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SlowResponse {
    pub status: String,
    pub message: String,
}

// generic 500 body, never carries the underlying error
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn internal() -> Self {
        Self {
            status: "Error".to_string(),
            error: "Internal Server Error".to_string(),
        }
    }
}
