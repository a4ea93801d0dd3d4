use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;

use crate::services::adapters::{
    annotate, BoundingBox, Detection, DetectionError, DetectionOutput, Detector, RecognitionError,
    Recognizer,
};
use crate::services::encoding::{decode_artifact, encode_png};

fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

#[derive(Deserialize)]
struct DetectResponse {
    detections: Vec<WireDetection>,
    #[serde(default)]
    visualization: Option<String>,
}

#[derive(Deserialize)]
struct WireDetection {
    label: String,
    confidence: f32,
    bbox: [f32; 4],
}

#[derive(Deserialize)]
struct RecognizeResponse {
    text: String,
}

/// Client for the object-detection model server.
pub struct HttpDetector {
    http: Client,
    url: String,
}

impl HttpDetector {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: build_client(timeout)?,
            url: endpoint(base_url, "detect"),
        })
    }

    fn into_output(
        response: DetectResponse,
        image: &DynamicImage,
    ) -> Result<DetectionOutput, DetectionError> {
        let detections = response
            .detections
            .into_iter()
            .map(|wire| {
                if !(0.0..=1.0).contains(&wire.confidence) {
                    return Err(DetectionError::InvalidResponse(format!(
                        "confidence {} for {:?} is outside [0, 1]",
                        wire.confidence, wire.label
                    )));
                }
                let [x1, y1, x2, y2] = wire.bbox;
                Ok(Detection {
                    label: wire.label,
                    confidence: wire.confidence,
                    bbox: BoundingBox::new(x1, y1, x2, y2),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let visualization = match response.visualization.as_deref().map(decode_artifact) {
            Some(Ok(rendered)) => rendered,
            Some(Err(err)) => {
                tracing::warn!(error = %err, "detector visualization unreadable, drawing boxes locally");
                annotate(image, &detections)
            }
            None => annotate(image, &detections),
        };

        Ok(DetectionOutput {
            detections,
            visualization,
        })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<DetectionOutput, DetectionError> {
        let body = encode_png(image)
            .map_err(|e| DetectionError::InvalidResponse(format!("cannot encode request image: {e}")))?;

        let response = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: DetectResponse = response.json().await?;
        Self::into_output(parsed, image)
    }
}

/// Client for the text-recognition model server.
pub struct HttpRecognizer {
    http: Client,
    url: String,
}

impl HttpRecognizer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: build_client(timeout)?,
            url: endpoint(base_url, "recognize"),
        })
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(&self, region: &DynamicImage) -> Result<String, RecognitionError> {
        let body = encode_png(region)
            .map_err(|e| RecognitionError::InvalidResponse(format!("cannot encode region: {e}")))?;

        let response = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: RecognizeResponse = response.json().await?;
        Ok(parsed.text)
    }
}
