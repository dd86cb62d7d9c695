pub mod setup;
pub mod sheet;
pub mod tools;
pub mod versions;

use axum::Json;

/// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
