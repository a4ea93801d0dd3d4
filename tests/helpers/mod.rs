//! Test helpers: fake model adapters, image builders and an in-process app.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, Rgb, RgbImage};

use cheque_extract::{
    app_state::AppState,
    models::job::{Completion, Delivery, JobId, JobOptions, JobOutcome, JobState},
    routes,
    services::{
        adapters::{
            annotate, BoundingBox, Detection, DetectionError, DetectionOutput, Detector,
            RecognitionError, Recognizer,
        },
        encoding::encode_png,
        pipeline::Pipeline,
        store::{JobStore, MemoryJobStore, StoreError},
    },
};

use crate::fixtures::ChequeFixture;

pub const TEST_TTL: Duration = Duration::from_secs(3600);
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const BOUNDARY: &str = "cheque-extract-test-boundary";

/// Detector that always reports the same detections.
pub struct ScriptedDetector {
    detections: Vec<Detection>,
}

impl ScriptedDetector {
    pub fn new(fixture: &ChequeFixture) -> Self {
        let detections = fixture
            .regions
            .iter()
            .map(|region| {
                let [x1, y1, x2, y2] = region.bbox;
                Detection {
                    label: region.label.to_string(),
                    confidence: region.confidence,
                    bbox: BoundingBox::new(x1, y1, x2, y2),
                }
            })
            .collect();
        Self { detections }
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<DetectionOutput, DetectionError> {
        Ok(DetectionOutput {
            detections: self.detections.clone(),
            visualization: annotate(image, &self.detections),
        })
    }
}

/// Detector whose model crashes mid-call.
pub struct PanickingDetector;

#[async_trait]
impl Detector for PanickingDetector {
    async fn detect(&self, _image: &DynamicImage) -> Result<DetectionOutput, DetectionError> {
        panic!("detector crashed")
    }
}

/// Recognizer that counts calls and returns a fixed reply.
pub struct CountingRecognizer {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl CountingRecognizer {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn offline() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for CountingRecognizer {
    async fn recognize(&self, _region: &DynamicImage) -> Result<String, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .ok_or_else(|| RecognitionError::Unavailable("recognizer offline".to_string()))
    }
}

/// Pipeline wired to the fakes for `fixture`; the recognizer is returned so
/// tests can count calls.
pub fn fake_pipeline(fixture: &ChequeFixture) -> (Arc<Pipeline>, Arc<CountingRecognizer>) {
    let recognizer = Arc::new(CountingRecognizer::replying(fixture.recognizer_reply));
    let pipeline = Pipeline::new(
        Arc::new(ScriptedDetector::new(fixture)),
        Arc::clone(&recognizer) as Arc<dyn Recognizer>,
    );
    (Arc::new(pipeline), recognizer)
}

/// A deterministic gradient "cheque" encoded as PNG.
pub fn cheque_png(fixture: &ChequeFixture) -> Vec<u8> {
    let image = RgbImage::from_fn(fixture.width, fixture.height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    encode_png(&DynamicImage::ImageRgb8(image)).expect("encode test image")
}

/// Valid PNG signature followed by garbage: passes sniffing, fails decoding.
pub fn corrupted_png() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
    bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef].repeat(16));
    bytes
}

/// One part of a multipart form.
pub enum FormPart<'a> {
    File {
        name: &'a str,
        filename: &'a str,
        bytes: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

/// Encode a multipart/form-data body; returns `(content_type, body)`.
pub fn multipart_body(parts: &[FormPart<'_>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            FormPart::File {
                name,
                filename,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            FormPart::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// POST /api/v1/extract request carrying `parts`.
pub fn extract_request(parts: &[FormPart<'_>], api_key: Option<&str>) -> Request<Body> {
    let (content_type, body) = multipart_body(parts);
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/extract")
        .header(header::CONTENT_TYPE, content_type);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body)).expect("build request")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

pub fn memory_store() -> Arc<MemoryJobStore> {
    Arc::new(MemoryJobStore::new(TEST_TTL))
}

/// Router over `store` without a metrics endpoint.
pub fn test_app(store: Arc<dyn JobStore>, api_key: Option<&str>) -> Router {
    let state = AppState::new(store, api_key.map(str::to_string));
    routes::build_router(state, MAX_UPLOAD_BYTES, None)
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

/// Store whose backend is permanently unreachable.
pub struct FailingStore;

fn unreachable_backend() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl JobStore for FailingStore {
    async fn enqueue(&self, _input: Vec<u8>, _options: JobOptions) -> Result<JobId, StoreError> {
        Err(unreachable_backend())
    }

    async fn dequeue(&self) -> Result<Delivery, StoreError> {
        Err(unreachable_backend())
    }

    async fn complete(&self, _job_id: JobId, _outcome: JobOutcome) -> Result<Completion, StoreError> {
        Err(unreachable_backend())
    }

    async fn get_state(&self, _job_id: JobId) -> Result<JobState, StoreError> {
        Err(unreachable_backend())
    }

    async fn requeue_expired_leases(&self, _lease_timeout: Duration) -> Result<usize, StoreError> {
        Err(unreachable_backend())
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        Err(unreachable_backend())
    }

    async fn queue_depth(&self) -> Result<u64, StoreError> {
        Err(unreachable_backend())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Err(unreachable_backend())
    }
}
