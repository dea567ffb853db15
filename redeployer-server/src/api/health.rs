//! Health Check API Handler
//!
//! Unauthenticated liveness endpoint for monitoring.

use axum::Json;
use redeployer_core::domain::request::ResponseMessage;

/// GET /health
/// Always answers `{"message": "OK"}`
pub async fn health_check() -> Json<ResponseMessage> {
    Json(ResponseMessage::new("OK"))
}
