use crate::api::error::AppError;
use crate::services::storage::StaticArea;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

// Enough for every signature `infer` knows about
const SNIFF_LEN: usize = 8192;

#[utoipa::path(
    get,
    path = "/uploads/{path}",
    params(
        ("path" = String, Path, description = "File name inside the uploads directory")
    ),
    responses(
        (status = 200, description = "Raw file bytes"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn serve_upload(
    State(state): State<crate::AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    serve(&state, StaticArea::Uploads, &path).await
}

#[utoipa::path(
    get,
    path = "/output/{path}",
    params(
        ("path" = String, Path, description = "Artifact path inside the output directory")
    ),
    responses(
        (status = 200, description = "Raw artifact bytes"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn serve_output(
    State(state): State<crate::AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    serve(&state, StaticArea::Output, &path).await
}

async fn serve(
    state: &crate::AppState,
    area: StaticArea,
    requested: &str,
) -> Result<Response, AppError> {
    let not_found = || AppError::NotFound("File not found".to_string());

    let Some(path) = state.storage.resolve(area, requested) else {
        tracing::warn!("Rejected static path: {:?}", requested);
        return Err(not_found());
    };

    let metadata = tokio::fs::metadata(&path).await.map_err(|_| not_found())?;
    if !metadata.is_file() {
        return Err(not_found());
    }

    let mut file = tokio::fs::File::open(&path).await.map_err(|_| not_found())?;

    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut file)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", path.display(), e)))?;
    file.seek(SeekFrom::Start(0))
        .await
        .map_err(|e| AppError::Internal(format!("Failed to rewind {}: {}", path.display(), e)))?;

    let content_type = infer::get(&head)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, metadata.len())
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}
