use crate::api::error::AppError;
use crate::services::jobs::JobRecord;
use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/jobs/{id}",
    params(
        ("id" = String, Path, description = "Job ID returned by /upload")
    ),
    responses(
        (status = 200, description = "Job record", body = JobRecord),
        (status = 400, description = "Malformed job ID", body = ErrorResponse),
        (status = 404, description = "Unknown job", body = ErrorResponse)
    ),
    tag = "images"
)]
pub async fn get_job(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, AppError> {
    let job_id =
        Uuid::parse_str(&id).map_err(|_| AppError::BadRequest("Invalid job ID".to_string()))?;

    state
        .jobs
        .get(&job_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
}
