use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::job::JobId;
use crate::services::polling::{self, ResultResponse};
use crate::services::submission::{self, parse_flag, Upload};

/// Response after submitting an image.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: String,
}

/// POST /api/v1/extract — Upload a cheque image for extraction.
///
/// Multipart fields: `file` (or `image`) and `perform_recognition`
/// (or `perform_ocr`).
pub async fn submit_extraction(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let mut filename = None;
    let mut bytes = None;
    let mut perform_recognition = false;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") | Some("image") => {
                filename = field.file_name().map(str::to_string);
                bytes = Some(field.bytes().await?.to_vec());
            }
            Some("perform_recognition") | Some("perform_ocr") => {
                let value = field.text().await?;
                perform_recognition = parse_flag(&value).ok_or_else(|| {
                    ApiError::InvalidInput(format!("Invalid boolean value {value:?}"))
                })?;
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| ApiError::InvalidInput("Missing image file".to_string()))?;
    let upload = Upload {
        filename,
        bytes,
        perform_recognition,
    };

    let job_id = submission::submit(state.store.as_ref(), upload).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: "pending".to_string(),
        }),
    ))
}

/// GET /api/v1/result/{job_id} — Poll an extraction job.
pub async fn get_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<(StatusCode, Json<ResultResponse>), ApiError> {
    let response = polling::poll(state.store.as_ref(), &job_id).await?;
    let status = match response {
        ResultResponse::Unknown => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };
    Ok((status, Json(response)))
}
