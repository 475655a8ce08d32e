use axum::response::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "ok" }))
}
