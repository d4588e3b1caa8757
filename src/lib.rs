pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::RelayConfig;
use crate::services::extractor::ShapeExtractor;
use crate::services::jobs::JobRegistry;
use crate::services::pool::ProcessingPool;
use crate::services::storage::LocalStorage;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Headroom on top of `max_file_size` for multipart boundaries and headers
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_image,
        api::handlers::listing::list_processed_images,
        api::handlers::jobs::get_job,
        api::handlers::process::process_image,
        api::handlers::static_files::serve_upload,
        api::handlers::static_files::serve_output,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::types::UploadResponse,
            api::handlers::types::ProcessResponse,
            api::handlers::types::ErrorResponse,
            api::handlers::health::HealthResponse,
            services::jobs::JobRecord,
            services::jobs::JobStatus,
            config::OutputLayout,
        )
    ),
    tags(
        (name = "images", description = "Upload and shape extraction endpoints"),
        (name = "files", description = "Static uploads and artifacts"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub storage: Arc<LocalStorage>,
    pub pool: Arc<ProcessingPool>,
    pub jobs: JobRegistry,
}

impl AppState {
    /// Wire up the processing pool. Cancelling `shutdown` cancels every
    /// in-flight extractor run.
    pub fn new(
        config: RelayConfig,
        storage: Arc<LocalStorage>,
        extractor: Arc<dyn ShapeExtractor>,
        shutdown: CancellationToken,
    ) -> Self {
        let pool = ProcessingPool::new(
            extractor,
            config.max_concurrent_jobs,
            config.job_timeout(),
            shutdown,
        );

        Self {
            config,
            storage,
            pool: Arc::new(pool),
            jobs: JobRegistry::new(),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/upload", post(api::handlers::upload::upload_image))
        .route("/process", post(api::handlers::process::process_image))
        .route(
            "/processed-images",
            get(api::handlers::listing::list_processed_images),
        )
        .route("/jobs/:id", get(api::handlers::jobs::get_job))
        .route(
            "/uploads/*path",
            get(api::handlers::static_files::serve_upload),
        )
        .route(
            "/output/*path",
            get(api::handlers::static_files::serve_output),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(api::middleware::trace::make_request_span)
                .on_request(api::middleware::trace::log_request)
                .on_response(api::middleware::trace::log_response),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_file_size + MULTIPART_OVERHEAD,
        ))
        .with_state(state)
}
