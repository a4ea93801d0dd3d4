//! Pipeline executor: decode, detect, crop, encode, then optionally recognize.
//!
//! Stages run strictly in sequence. Decode and detection failures fail the
//! job; encoding and recognition failures degrade single fields to `None`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;

use crate::error::ErrorKind;
use crate::models::extraction::{DetectedRegion, ExtractionResult, ACCOUNT_LABEL};
use crate::models::job::{ErrorResult, JobId, JobOptions};
use crate::services::adapters::{Detection, DetectionError, Detector, RecognitionError, Recognizer};
use crate::services::encoding;

pub const DEFAULT_BINARIZE_THRESHOLD: u8 = 127;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("Image task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::DecodeError,
            Self::Detection(err) => err.kind(),
            Self::TaskJoin(_) => ErrorKind::Internal,
        }
    }
}

impl From<PipelineError> for ErrorResult {
    fn from(err: PipelineError) -> Self {
        ErrorResult::new(err.kind(), err.to_string())
    }
}

pub struct Pipeline {
    detector: Arc<dyn Detector>,
    recognizer: Arc<dyn Recognizer>,
    binarize_threshold: Option<u8>,
}

impl Pipeline {
    pub fn new(detector: Arc<dyn Detector>, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            detector,
            recognizer,
            binarize_threshold: Some(DEFAULT_BINARIZE_THRESHOLD),
        }
    }

    /// Threshold applied to the source image before regions are cropped.
    /// `None` crops from the untouched image.
    pub fn with_binarize_threshold(mut self, threshold: Option<u8>) -> Self {
        self.binarize_threshold = threshold;
        self
    }

    /// Run every stage for one job. Pixel work (decode, binarize, crop,
    /// encode) runs on the blocking pool; only adapter calls stay async.
    pub async fn run(
        &self,
        job_id: JobId,
        input: Vec<u8>,
        options: JobOptions,
    ) -> Result<ExtractionResult, PipelineError> {
        let image = tokio::task::spawn_blocking(move || image::load_from_memory(&input)).await??;
        tracing::debug!(
            job_id = %job_id,
            width = image.width(),
            height = image.height(),
            "Image decoded"
        );

        let start = Instant::now();
        let output = self.detector.detect(&image).await?;
        tracing::info!(
            job_id = %job_id,
            detections = output.detections.len(),
            detect_ms = start.elapsed().as_millis() as u64,
            "Detection complete"
        );

        let threshold = self.binarize_threshold;
        let (detected_objects, account_crop, labeled_image) =
            tokio::task::spawn_blocking(move || {
                let source = match threshold {
                    Some(threshold) => binarize(&image, threshold),
                    None => image,
                };
                let (regions, account_crop) = collect_regions(job_id, &source, &output.detections);
                let labeled_image = encode_or_log(job_id, "visualization", &output.visualization);
                (regions, account_crop, labeled_image)
            })
            .await?;

        let recognized_text = match (options.perform_recognition, account_crop) {
            (true, Some(crop)) => self.recognize_account(job_id, &crop).await,
            (true, None) => {
                tracing::info!(job_id = %job_id, "No account region detected, skipping recognition");
                None
            }
            (false, _) => None,
        };

        Ok(ExtractionResult {
            detected_objects,
            labeled_image,
            recognized_text,
        })
    }

    /// Recognition is best-effort: any failure is logged and becomes `None`.
    async fn recognize_account(&self, job_id: JobId, crop: &DynamicImage) -> Option<String> {
        let start = Instant::now();
        let recognized = self
            .recognizer
            .recognize(crop)
            .await
            .and_then(|raw| normalize_account_number(&raw));

        match recognized {
            Ok(text) => {
                tracing::info!(
                    job_id = %job_id,
                    recognize_ms = start.elapsed().as_millis() as u64,
                    "Account number recognized"
                );
                Some(text)
            }
            Err(err) => {
                metrics::counter!("extraction_recognition_failures_total").increment(1);
                tracing::error!(job_id = %job_id, error = %err, "Recognition failed");
                None
            }
        }
    }
}

/// Build the label-keyed region map. Duplicate labels resolve last-write-wins
/// in detector order; the returned account crop follows the same rule.
fn collect_regions(
    job_id: JobId,
    source: &DynamicImage,
    detections: &[Detection],
) -> (BTreeMap<String, DetectedRegion>, Option<DynamicImage>) {
    let mut regions = BTreeMap::new();
    let mut account_crop = None;

    for detection in detections {
        let crop = detection
            .bbox
            .clamp_to(source.width(), source.height())
            .map(|(x, y, w, h)| source.crop_imm(x, y, w, h));

        let cropped_image = match &crop {
            Some(crop) => encode_or_log(job_id, &detection.label, crop),
            None => {
                tracing::warn!(job_id = %job_id, label = %detection.label, "Detection box lies outside the image");
                None
            }
        };

        if detection.label == ACCOUNT_LABEL {
            account_crop = crop;
        }

        let replaced = regions.insert(
            detection.label.clone(),
            DetectedRegion {
                confidence: detection.confidence,
                cropped_image,
            },
        );
        if replaced.is_some() {
            tracing::debug!(job_id = %job_id, label = %detection.label, "Duplicate label, keeping the later detection");
        }
    }

    (regions, account_crop)
}

fn encode_or_log(job_id: JobId, artifact: &str, image: &DynamicImage) -> Option<String> {
    match encoding::encode_artifact(image) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::warn!(job_id = %job_id, artifact, error = %err, "Artifact unavailable");
            None
        }
    }
}

/// Per-channel binary threshold: values above `threshold` become 255, the rest 0.
pub fn binarize(image: &DynamicImage, threshold: u8) -> DynamicImage {
    let mut rgb = image.to_rgb8();
    for pixel in rgb.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = if *channel > threshold { 255 } else { 0 };
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

/// Strip whitespace and require a non-empty run of ASCII digits.
pub fn normalize_account_number(raw: &str) -> Result<String, RecognitionError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() || !compact.chars().all(|c| c.is_ascii_digit()) {
        return Err(RecognitionError::NotNumeric(raw.to_string()));
    }
    Ok(compact)
}
