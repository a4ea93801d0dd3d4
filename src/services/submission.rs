//! Submission service: validate an upload, enqueue it, hand back the job id.
//!
//! Nothing is enqueued unless validation passes, and a store failure leaves
//! no partial job behind.

use garde::Validate;
use image::ImageFormat;

use crate::models::job::{JobId, JobOptions};
use crate::services::store::{JobStore, StoreError};

/// File extensions accepted when the client names the upload.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "tif", "bmp", "gif"];

const ACCEPTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Tiff,
    ImageFormat::Bmp,
    ImageFormat::Gif,
];

/// An inbound image plus its options, as read off the request.
#[derive(Debug, Validate)]
pub struct Upload {
    #[garde(length(min = 1, max = 255))]
    pub filename: Option<String>,

    #[garde(length(min = 1))]
    pub bytes: Vec<u8>,

    #[garde(skip)]
    pub perform_recognition: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("job store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Check the upload is a non-empty image in an accepted format.
/// Returns the sniffed format.
pub fn validate_upload(upload: &Upload) -> Result<ImageFormat, SubmissionError> {
    upload
        .validate()
        .map_err(|report| SubmissionError::InvalidInput(format!("Invalid upload: {report}")))?;

    if let Some(filename) = &upload.filename {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(SubmissionError::InvalidInput(
                "Invalid file type. Please upload an image file.".to_string(),
            ));
        }
    }

    let format = image::guess_format(&upload.bytes).map_err(|_| {
        SubmissionError::InvalidInput("Payload is not a recognised image".to_string())
    })?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(SubmissionError::InvalidInput(format!(
            "Unsupported image format {format:?}"
        )));
    }

    Ok(format)
}

/// Validate and enqueue. Returns as soon as the job is queued.
pub async fn submit(store: &dyn JobStore, upload: Upload) -> Result<JobId, SubmissionError> {
    let format = validate_upload(&upload)?;
    let size = upload.bytes.len();
    let options = JobOptions {
        perform_recognition: upload.perform_recognition,
    };

    let job_id = store.enqueue(upload.bytes, options).await?;

    metrics::counter!("extraction_jobs_submitted_total").increment(1);
    tracing::info!(
        job_id = %job_id,
        filename = upload.filename.as_deref().unwrap_or("<unnamed>"),
        format = ?format,
        size,
        perform_recognition = options.perform_recognition,
        "Job submitted"
    );

    Ok(job_id)
}

/// Parse a form value as a boolean flag.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
