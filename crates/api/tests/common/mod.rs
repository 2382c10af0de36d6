#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, RgbImage};
use relume_core::layout::StorageLayout;
use relume_core::stage::Stage;
use relume_pipeline::enhancer::{EnhancerKind, ImageFnEnhancer};
use relume_pipeline::orchestrator::{Orchestrator, StagePolicies};
use relume_pipeline::queue::{MarkerQueue, WaitPolicy};
use relume_pipeline::JobQueue;
use relume_worker::watcher::{StageWatcher, WatcherSettings};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use relume_api::config::{ServerConfig, DEFAULT_MAX_UPLOAD_BYTES};
use relume_api::router::build_app_router;
use relume_api::state::AppState;

/// Fast poll interval used by both the orchestrator and the test worker.
pub const POLL: Duration = Duration::from_millis(20);

/// Build a test `ServerConfig` over `layout` with short stage waits.
pub fn test_config(layout: StorageLayout, max_wait: Duration) -> ServerConfig {
    test_config_with_limit(layout, max_wait, DEFAULT_MAX_UPLOAD_BYTES)
}

pub fn test_config_with_limit(
    layout: StorageLayout,
    max_wait: Duration,
    max_upload_bytes: usize,
) -> ServerConfig {
    let policy = WaitPolicy {
        max_wait,
        poll_interval: POLL,
    };
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes,
        layout,
        stage_policies: StagePolicies {
            super_resolution: policy,
            face_restoration: policy,
        },
    }
}

/// A router over a private storage directory, plus the handles tests need
/// to inspect that directory and drive workers against it.
pub struct TestApp {
    pub app: Router,
    pub layout: StorageLayout,
    pub queue: Arc<MarkerQueue>,
    workers: CancellationToken,
    _dir: tempfile::TempDir,
}

impl TestApp {
    /// Start in-process workers for both stages. Super-resolution doubles
    /// the image; face restoration mirrors it.
    pub fn start_workers(&self) {
        let stages: [(Stage, ImageFnEnhancer); 2] = [
            (
                Stage::SuperResolution,
                ImageFnEnhancer::new(EnhancerKind::SuperResolution, |img| {
                    Ok(img.resize_exact(
                        img.width() * 2,
                        img.height() * 2,
                        image::imageops::FilterType::Nearest,
                    ))
                }),
            ),
            (
                Stage::FaceRestoration,
                ImageFnEnhancer::new(EnhancerKind::FaceRestoration, |img| Ok(img.fliph())),
            ),
        ];

        for (stage, enhancer) in stages {
            let queue: Arc<dyn JobQueue> = self.queue.clone();
            let watcher = StageWatcher::new(
                stage,
                self.layout.clone(),
                queue,
                Arc::new(enhancer),
                WatcherSettings {
                    scan_interval: POLL,
                    error_backoff: POLL,
                    budget: Duration::from_secs(10),
                    upscale: 4,
                },
            );
            let cancel = self.workers.clone();
            tokio::spawn(async move { watcher.run(cancel).await });
        }
    }

    pub fn input(&self, name: &str) -> std::path::PathBuf {
        self.layout.inputs_dir.join(name)
    }

    pub fn output(&self, name: &str) -> std::path::PathBuf {
        self.layout.outputs_dir.join(name)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.workers.cancel();
    }
}

/// Build the full application router with all middleware layers.
///
/// This goes through the same `build_app_router` as `main.rs`, so tests
/// exercise the production middleware stack.
pub fn build_test_app(max_wait: Duration) -> TestApp {
    build_test_app_with_limit(max_wait, DEFAULT_MAX_UPLOAD_BYTES)
}

/// [`build_test_app`] with a custom request body limit.
pub fn build_test_app_with_limit(max_wait: Duration, max_upload_bytes: usize) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path().join("inputs"), dir.path().join("outputs"));
    std::fs::create_dir_all(&layout.inputs_dir).unwrap();
    std::fs::create_dir_all(&layout.outputs_dir).unwrap();

    let config = test_config_with_limit(layout.clone(), max_wait, max_upload_bytes);
    let queue = Arc::new(MarkerQueue::new(layout.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        layout.clone(),
        queue.clone(),
        config.stage_policies,
    ));
    let state = AppState { orchestrator };

    TestApp {
        app: build_app_router(state, &config),
        layout,
        queue,
        workers: CancellationToken::new(),
        _dir: dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post_json(app: &Router, uri: &str, json: serde_json::Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_form(app: &Router, uri: &str, form: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST a single-part multipart body.
pub async fn post_multipart(
    app: &Router,
    uri: &str,
    field: &str,
    filename: &str,
    content: &[u8],
) -> Response {
    let boundary = "relume-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Encode a small solid-colour image in `format`.
pub fn image_bytes(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 120, 60])));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// Sorted filenames in `dir`.
pub fn dir_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
