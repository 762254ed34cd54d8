use crate::services;
use crate::startup::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use service_core::error::AppError;

pub async fn health_check(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.db.health_check().await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

pub async fn metrics() -> impl IntoResponse {
    services::metrics::render()
}
