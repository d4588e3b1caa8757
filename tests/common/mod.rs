#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use shape_relay::config::RelayConfig;
use shape_relay::services::extractor::CommandExtractor;
use shape_relay::services::storage::LocalStorage;
use shape_relay::{AppState, create_app};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// Copies the input into two deterministic artifacts named after it.
pub const TWO_SHAPES: &str = r#"base=$(basename "$1")
cp "$1" "$2/${base}_shape_1.png"
printf 'second shape' > "$2/${base}_shape_2.png"
echo "Processed 2 shapes""#;

pub const FAILING: &str = r#"echo "Error: Could not load $1" >&2; exit 1"#;

pub struct TestRelay {
    pub app: Router,
    pub state: AppState,
    pub shutdown: CancellationToken,
    _root: TempDir,
}

/// Build the relay over temp directories with `sh -c <script>` as the extractor,
/// so the script sees the input as `$1` and the output directory as `$2`.
pub async fn setup(script: &str, tweak: impl FnOnce(&mut RelayConfig)) -> TestRelay {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("shape_relay=debug,tower_http=debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();

    let root = tempfile::tempdir().unwrap();
    let mut config = RelayConfig {
        uploads_dir: root.path().join("uploads"),
        output_dir: root.path().join("output"),
        extractor_program: "sh".to_string(),
        extractor_args: vec!["-c".to_string(), script.to_string(), "extract".to_string()],
        ..RelayConfig::default()
    };
    tweak(&mut config);

    let storage = Arc::new(LocalStorage::new(&config.uploads_dir, &config.output_dir));
    storage.ensure_dirs().await.unwrap();

    let extractor = Arc::new(CommandExtractor::from_config(&config));
    let shutdown = CancellationToken::new();
    let state = AppState::new(config, storage, extractor, shutdown.clone());

    TestRelay {
        app: create_app(state.clone()),
        state,
        shutdown,
        _root: root,
    }
}

pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
        Content-Type: image/png\r\n\r\n",
        boundary = BOUNDARY,
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

pub async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let json = serde_json::from_slice(&body).unwrap_or_else(|_| {
        panic!(
            "status {} with non-JSON body: {:?}",
            status,
            String::from_utf8_lossy(&body)
        )
    });
    (status, json)
}

pub async fn upload(app: &Router, filename: &str, content: &[u8]) -> (StatusCode, Value) {
    send_json(
        app,
        multipart_request("/upload", multipart_body("image", filename, content)),
    )
    .await
}
