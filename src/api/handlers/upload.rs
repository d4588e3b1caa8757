use crate::api::error::AppError;
use crate::config::OutputLayout;
use crate::services::jobs::{JobRecord, JobStatus};
use crate::services::storage::uploads_url;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use uuid::Uuid;

use super::types::UploadResponse;
use super::{check_outcome, receive_image};

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Vec<u8>, description = "Multipart form with an `image` file field", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image uploaded and processed", body = UploadResponse),
        (status = 400, description = "No file uploaded", body = ErrorResponse),
        (status = 413, description = "Upload too large", body = ErrorResponse),
        (status = 500, description = "Extractor failed, body carries its stderr", body = ErrorResponse),
        (status = 503, description = "Processing cancelled by shutdown", body = ErrorResponse),
        (status = 504, description = "Extractor timed out", body = ErrorResponse)
    ),
    tag = "images"
)]
pub async fn upload_image(
    State(state): State<crate::AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    tracing::info!("Upload endpoint hit");
    let mut multipart = multipart.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let result = receive_image(&mut multipart, state.storage.uploads_dir()).await;
    let stored = match result {
        Ok(Some(stored)) => stored,
        Ok(None) => {
            tracing::warn!("No file uploaded");
            return Err(AppError::BadRequest("No file uploaded.".to_string()));
        }
        Err(e) => {
            // Drain whatever is left so the client sees our response instead of a reset
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            return Err(e);
        }
    };

    let job_id = Uuid::new_v4();
    let layout = state.config.output_layout;
    let output_dir = state
        .storage
        .job_output_dir(layout, job_id)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to prepare output directory: {:#}", e)))?;

    tracing::info!(job_id = %job_id, "Input File Path: {}", stored.path.display());
    tracing::info!(job_id = %job_id, "Output Directory: {}", output_dir.display());

    let job = state.jobs.track(JobRecord::running(
        job_id,
        &stored.path,
        &output_dir,
        &stored.sha256,
    ));

    let result = state.pool.run(&stored.path, &output_dir).await;
    if let Err((status, err)) = check_outcome(result) {
        job.finish(status, None, Some(err.to_string()));
        return Err(err);
    }

    let artifacts = match layout {
        OutputLayout::Shared => None,
        OutputLayout::PerJob => match state.storage.job_artifact_urls(job_id).await {
            Ok(urls) => Some(urls),
            Err(e) => {
                let err = AppError::Storage(format!("Failed to list job artifacts: {:#}", e));
                job.finish(JobStatus::Failed, None, Some(err.to_string()));
                return Err(err);
            }
        },
    };
    job.finish(JobStatus::Succeeded, artifacts.clone(), None);

    tracing::info!(job_id = %job_id, "✅ Image processed");

    Ok(Json(UploadResponse {
        message: "Image uploaded and processed successfully.".to_string(),
        input_file_path: stored.path.display().to_string(),
        output_dir: output_dir.display().to_string(),
        input_url: uploads_url(&stored.filename),
        job_id,
        sha256: stored.sha256,
        artifacts,
    }))
}
