use axum::Json;
use crate::models::HelloResponse;

pub async fn hello_handler() -> Json<HelloResponse> {
    tracing::info!("Req came on / route");
    Json(HelloResponse {
        message: "Hello from Express server".to_string(),
    })
}
