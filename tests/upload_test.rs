#![cfg(unix)]

mod common;

use axum::http::StatusCode;
use common::*;
use shape_relay::config::OutputLayout;
use shape_relay::utils::hash::calculate_hash;
use std::path::Path;

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nnot really a png";

#[tokio::test]
async fn test_upload_runs_extractor_and_reports_paths() {
    let relay = setup(TWO_SHAPES, |_| {}).await;

    let (status, json) = upload(&relay.app, "drawing.png", PNG_BYTES).await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);

    assert_eq!(json["message"], "Image uploaded and processed successfully.");
    let input = json["inputFilePath"].as_str().unwrap();
    let output_dir = json["outputDir"].as_str().unwrap();
    assert!(!input.is_empty());
    assert!(!output_dir.is_empty());
    assert!(Path::new(input).is_absolute());
    assert!(input.ends_with("-drawing.png"));
    assert_eq!(Path::new(output_dir), relay.state.storage.output_dir());
    assert_eq!(json["sha256"], calculate_hash(PNG_BYTES));
    // shared layout cannot attribute artifacts
    assert!(json.get("artifacts").is_none());

    assert_eq!(tokio::fs::read(input).await.unwrap(), PNG_BYTES);

    let job_id = json["jobId"].as_str().unwrap();
    let (status, job) = send_json(&relay.app, get(&format!("/jobs/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "succeeded");
    assert_eq!(job["inputFilePath"], input);
    assert!(job["artifacts"].is_null());
}

#[tokio::test]
async fn test_uploaded_file_is_served_back() {
    let relay = setup(TWO_SHAPES, |_| {}).await;
    let (_, json) = upload(&relay.app, "drawing.png", PNG_BYTES).await;

    let (status, body) = send(&relay.app, get(json["inputUrl"].as_str().unwrap())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, PNG_BYTES);
}

#[tokio::test]
async fn test_missing_image_field_is_rejected() {
    let relay = setup(TWO_SHAPES, |_| {}).await;

    let (status, json) = send_json(
        &relay.app,
        multipart_request("/upload", multipart_body("file", "drawing.png", PNG_BYTES)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No file uploaded.");

    let mut uploads = tokio::fs::read_dir(relay.state.storage.uploads_dir()).await.unwrap();
    assert!(uploads.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn test_extractor_failure_returns_stderr() {
    let relay = setup(FAILING, |_| {}).await;

    let (status, json) = upload(&relay.app, "broken.png", PNG_BYTES).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = json["error"].as_str().unwrap();
    assert!(error.starts_with("Error processing image:"));
    assert!(error.contains("Could not load"), "error: {}", error);
}

#[tokio::test]
async fn test_missing_extractor_is_a_server_error() {
    let relay = setup(TWO_SHAPES, |config| {
        config.extractor_program = "/nonexistent/python".to_string();
    })
    .await;

    let (status, json) = upload(&relay.app, "drawing.png", PNG_BYTES).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("/nonexistent/python"));
}

#[tokio::test]
async fn test_slow_extractor_times_out() {
    let relay = setup("sleep 10", |config| config.job_timeout_secs = 1).await;

    let (status, json) = upload(&relay.app, "drawing.png", PNG_BYTES).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(json["error"].as_str().unwrap().contains("timed out"));
    assert_eq!(relay.state.pool.active_jobs(), 0);
}

#[tokio::test]
async fn test_shutdown_cancels_running_jobs() {
    let relay = setup("sleep 10", |_| {}).await;
    let shutdown = relay.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        shutdown.cancel();
    });

    let (status, _) = upload(&relay.app, "drawing.png", PNG_BYTES).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let relay = setup(TWO_SHAPES, |config| config.max_file_size = 16).await;

    let big = vec![7u8; 2 * 1024 * 1024];
    let (status, body) = send(
        &relay.app,
        multipart_request("/upload", multipart_body("image", "big.png", &big)),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "body: {:?}", String::from_utf8_lossy(&body));
}

#[tokio::test]
async fn test_concurrent_uploads_succeed_but_share_output() {
    let relay = setup(TWO_SHAPES, |_| {}).await;

    let (first, second) = tokio::join!(
        upload(&relay.app, "a.png", b"first image"),
        upload(&relay.app, "a.png", b"second image"),
    );

    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    assert_ne!(first.1["inputFilePath"], second.1["inputFilePath"]);
    assert_ne!(first.1["jobId"], second.1["jobId"]);
    assert_eq!(first.1["outputDir"], second.1["outputDir"]);

    let (status, listing) = send_json(&relay.app, get("/processed-images")).await;
    assert_eq!(status, StatusCode::OK);
    let urls: Vec<&str> = listing
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(urls.len(), 4);

    // The listing is flat: no entry names the job that produced it
    for job in [&first.1["jobId"], &second.1["jobId"]] {
        let job = job.as_str().unwrap();
        assert!(urls.iter().all(|url| !url.contains(job)));
    }
    assert!(urls.iter().all(|url| url.matches('/').count() == 2));
}

#[tokio::test]
async fn test_per_job_layout_attributes_artifacts() {
    let relay = setup(TWO_SHAPES, |config| {
        config.output_layout = OutputLayout::PerJob;
    })
    .await;

    let (status, json) = upload(&relay.app, "drawing.png", PNG_BYTES).await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);

    let job_id = json["jobId"].as_str().unwrap();
    assert!(json["outputDir"].as_str().unwrap().ends_with(job_id));

    let artifacts = json["artifacts"].as_array().unwrap();
    assert_eq!(artifacts.len(), 2);
    for artifact in artifacts {
        let url = artifact.as_str().unwrap();
        assert!(url.starts_with(&format!("/output/{}/", job_id)));
        let (status, _) = send(&relay.app, get(url)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, job) = send_json(&relay.app, get(&format!("/jobs/{}", job_id))).await;
    assert_eq!(job["artifacts"], json["artifacts"]);
}

#[tokio::test]
async fn test_job_lookup_errors() {
    let relay = setup(TWO_SHAPES, |_| {}).await;

    let (status, _) = send_json(&relay.app, get("/jobs/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &relay.app,
        get("/jobs/00000000-0000-4000-8000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_job_is_recorded() {
    let relay = setup(FAILING, |config| {
        config.output_layout = OutputLayout::PerJob;
    })
    .await;

    let (status, _) = upload(&relay.app, "broken.png", PNG_BYTES).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(relay.state.jobs.len(), 1);
}

#[tokio::test]
async fn test_non_multipart_upload_gets_json_error() {
    let relay = setup(TWO_SHAPES, |_| {}).await;

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/upload")
        .header("Content-Type", "application/json")
        .body(axum::body::Body::from(r#"{"image": "nope"}"#))
        .unwrap();
    let (status, json) = send_json(&relay.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
    assert_eq!(relay.state.jobs.len(), 0);
}

#[tokio::test]
async fn test_input_url_is_percent_encoded() {
    let relay = setup(TWO_SHAPES, |_| {}).await;

    let (status, json) = upload(&relay.app, "ñandú.png", PNG_BYTES).await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);

    let input_url = json["inputUrl"].as_str().unwrap();
    assert!(input_url.is_ascii());
    assert!(input_url.ends_with("-%C3%B1and%C3%BA.png"), "url: {}", input_url);

    let (status, body) = send(&relay.app, get(input_url)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, PNG_BYTES);
}
