use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    /// Absolute path of the stored upload
    pub input_file_path: String,
    /// Absolute path of the directory the extractor wrote into
    pub output_dir: String,
    /// Relative URL the stored upload is served under
    pub input_url: String,
    pub job_id: Uuid,
    pub sha256: String,
    /// Only present for the per-job output layout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessResponse {
    pub success: bool,
    /// Base64 encoded PNG shapes, ordered by artifact name
    pub shapes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessResponse {
    pub fn shapes(shapes: Vec<String>) -> Self {
        Self {
            success: true,
            shapes,
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            shapes: Vec::new(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
