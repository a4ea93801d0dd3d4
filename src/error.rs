//! Error taxonomy shared by the store, the pipeline and the HTTP surface.
//!
//! Component errors (`StoreError`, `PipelineError`, ...) live next to the
//! component. Each maps onto an [`ErrorKind`], which is the only thing a
//! client ever sees besides a human-readable message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::services::store::StoreError;
use crate::services::submission::SubmissionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or unsupported upload, rejected before enqueue.
    InvalidInput,
    /// Bytes are not a decodable image.
    DecodeError,
    /// A capability adapter could not be invoked.
    ModelUnavailable,
    /// The job store could not be reached.
    StoreUnavailable,
    /// Duplicate completion attempt.
    AlreadyTerminal,
    /// Identifier never issued or expired.
    Unknown,
    /// Missing or wrong API key.
    Unauthorized,
    /// The pipeline task aborted.
    Internal,
}

/// Body returned for every rejected request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("missing or invalid API key")]
    Unauthorized,

    #[error("job store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::Multipart(_) => ErrorKind::InvalidInput,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Multipart(err) => err.status(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::InvalidInput(message) => Self::InvalidInput(message),
            SubmissionError::StoreUnavailable(source) => Self::StoreUnavailable(source),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
