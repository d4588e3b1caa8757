use crate::api::error::AppError;
use crate::services::storage::list_artifacts;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};

use super::types::ProcessResponse;
use super::{check_outcome, receive_image};

#[utoipa::path(
    post,
    path = "/process",
    request_body(content = Vec<u8>, description = "Multipart form with an `image` file field", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Extracted shapes as base64 PNGs", body = ProcessResponse),
        (status = 400, description = "No image provided", body = ProcessResponse),
        (status = 500, description = "Extraction failed", body = ProcessResponse)
    ),
    tag = "images"
)]
pub async fn process_image(
    State(state): State<crate::AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> (StatusCode, Json<ProcessResponse>) {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => {
            tracing::warn!("Rejected /process request: {}", e.body_text());
            return (e.status(), Json(ProcessResponse::failure(e.body_text())));
        }
    };

    match extract_inline(&state, &mut multipart).await {
        Ok(shapes) => {
            tracing::info!("Processed {} shapes", shapes.len());
            (StatusCode::OK, Json(ProcessResponse::shapes(shapes)))
        }
        Err(e) => {
            let status = e.status();
            (status, Json(ProcessResponse::failure(e.public_message())))
        }
    }
}

/// Run the extractor in a scratch directory and read the shapes back, leaving
/// nothing behind in the shared directories.
async fn extract_inline(
    state: &crate::AppState,
    multipart: &mut Multipart,
) -> Result<Vec<String>, AppError> {
    let scratch = tempfile::Builder::new()
        .prefix("shape-relay-")
        .tempdir()
        .map_err(|e| AppError::Internal(format!("Failed to create scratch dir: {}", e)))?;
    let input_dir = scratch.path().join("input");
    let output_dir = scratch.path().join("output");
    for dir in [&input_dir, &output_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create {}: {}", dir.display(), e)))?;
    }

    let stored = receive_image(multipart, &input_dir)
        .await?
        .ok_or_else(|| AppError::BadRequest("No image provided".to_string()))?;

    let result = state.pool.run(&stored.path, &output_dir).await;
    check_outcome(result).map_err(|(_, e)| e)?;

    let mut shapes = Vec::new();
    for name in list_artifacts(&output_dir).await? {
        if !name.to_lowercase().ends_with(".png") {
            continue;
        }
        let bytes = tokio::fs::read(output_dir.join(&name))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", name, e)))?;
        shapes.push(STANDARD.encode(bytes));
    }

    Ok(shapes)
}
