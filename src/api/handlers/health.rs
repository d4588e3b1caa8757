use crate::AppState;
use crate::config::OutputLayout;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub extractor: String,
    pub active_jobs: usize,
    pub queued_jobs: usize,
    pub max_concurrent_jobs: usize,
    pub output_layout: OutputLayout,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let extractor_status = if state.pool.extractor().health_check().await {
        "available"
    } else {
        "unavailable"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        extractor: extractor_status.to_string(),
        active_jobs: state.pool.active_jobs(),
        queued_jobs: state.pool.queued_jobs(),
        max_concurrent_jobs: state.pool.max_concurrent(),
        output_layout: state.config.output_layout,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
