pub mod health;
pub mod jobs;
pub mod listing;
pub mod process;
pub mod static_files;
pub mod types;
pub mod upload;

use crate::api::error::AppError;
use crate::services::extractor::ProcessorError;
use crate::services::jobs::JobStatus;
use crate::services::pool::JobOutcome;
use crate::services::storage::{StoredUpload, UploadWriter};
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use std::path::Path;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

fn multipart_error(e: MultipartError) -> AppError {
    let err_msg = e.body_text();
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE || err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(err_msg)
    }
}

/// Stream the first `image` field into `dir`. Every other field, including
/// further `image` fields, is drained and ignored.
pub(crate) async fn receive_image(
    multipart: &mut Multipart,
    dir: &Path,
) -> Result<Option<StoredUpload>, AppError> {
    let mut stored: Option<StoredUpload> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let is_image = field.name() == Some(IMAGE_FIELD);
        if !is_image || stored.is_some() {
            while field.chunk().await.map_err(multipart_error)?.is_some() {}
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let mut writer = UploadWriter::create(dir, &original_name)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store upload: {:#}", e)))?;

        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = writer.write_chunk(&chunk).await {
                        writer.abort().await;
                        return Err(AppError::Internal(format!(
                            "Failed to write upload: {:#}",
                            e
                        )));
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    writer.abort().await;
                    return Err(multipart_error(e));
                }
            }
        }

        let upload = writer
            .finish()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to finalize upload: {:#}", e)))?;
        tracing::info!(
            "💾 Stored upload {} ({} bytes, sha256 {})",
            upload.filename,
            upload.size,
            upload.sha256
        );
        stored = Some(upload);
    }

    Ok(stored)
}

/// Classify a finished run. Failures come back with the status to record on
/// the job and the error to return to the client.
pub(crate) fn check_outcome(
    result: Result<JobOutcome, ProcessorError>,
) -> Result<(), (JobStatus, AppError)> {
    match result {
        Ok(JobOutcome::Completed { stdout, stderr }) => {
            if !stderr.trim().is_empty() {
                tracing::warn!("Extractor stderr: {}", stderr.trim());
            }
            tracing::debug!("Extractor stdout: {}", stdout.trim());
            Ok(())
        }
        Ok(JobOutcome::Failed { exit_code, stderr }) => {
            tracing::error!("Extractor exited with {:?}: {}", exit_code, stderr.trim());
            Err((
                JobStatus::Failed,
                AppError::Processing(format!("Error processing image: {}", stderr)),
            ))
        }
        Ok(JobOutcome::TimedOut { after }) => Err((
            JobStatus::TimedOut,
            AppError::Timeout(format!(
                "Image processing timed out after {} seconds",
                after.as_secs_f64()
            )),
        )),
        Ok(JobOutcome::Cancelled) => Err((
            JobStatus::Cancelled,
            AppError::Unavailable("Image processing was cancelled".to_string()),
        )),
        Err(e) => {
            tracing::error!("Extractor could not run: {}", e);
            Err((
                JobStatus::Failed,
                AppError::Processing(format!("Error processing image: {}", e)),
            ))
        }
    }
}
