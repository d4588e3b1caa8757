use crate::api::error::AppError;
use axum::{Json, extract::State};

#[utoipa::path(
    get,
    path = "/processed-images",
    responses(
        (status = 200, description = "Relative URLs of every file in the output directory", body = Vec<String>),
        (status = 500, description = "Output directory could not be read", body = ErrorResponse)
    ),
    tag = "images"
)]
pub async fn list_processed_images(
    State(state): State<crate::AppState>,
) -> Result<Json<Vec<String>>, AppError> {
    let urls = state.storage.list_output_urls().await.map_err(|e| {
        tracing::error!("Failed to list output directory: {:#}", e);
        AppError::Storage("Error retrieving processed images.".to_string())
    })?;

    tracing::debug!("Listing {} processed images", urls.len());
    Ok(Json(urls))
}
