//! Polling service: a pure read of job state, reshaped for clients.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::models::extraction::ExtractionResult;
use crate::models::job::{JobId, JobState};
use crate::services::store::{JobStore, StoreError};

/// The four shapes a client can see when polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultResponse {
    Pending,
    Success { data: ExtractionResult },
    Failure { kind: ErrorKind, message: String },
    Unknown,
}

impl From<JobState> for ResultResponse {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Pending => Self::Pending,
            JobState::Success(data) => Self::Success { data },
            JobState::Failure(error) => Self::Failure {
                kind: error.kind,
                message: error.message,
            },
            JobState::Unknown => Self::Unknown,
        }
    }
}

/// Look up a job by its raw identifier. Strings that are not valid job ids
/// were never issued and read as `Unknown`.
pub async fn poll(store: &dyn JobStore, raw_id: &str) -> Result<ResultResponse, StoreError> {
    let Ok(job_id) = raw_id.parse::<JobId>() else {
        return Ok(ResultResponse::Unknown);
    };
    let state = store.get_state(job_id).await?;
    Ok(state.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{ErrorResult, JobOptions, JobOutcome};
    use crate::services::store::MemoryJobStore;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn shapes_serialize_with_a_status_tag() {
        assert_eq!(serde_json::to_value(ResultResponse::Pending).unwrap(), json!({"status": "pending"}));
        assert_eq!(serde_json::to_value(ResultResponse::Unknown).unwrap(), json!({"status": "unknown"}));
        assert_eq!(
            serde_json::to_value(ResultResponse::Failure {
                kind: ErrorKind::DecodeError,
                message: "Failed to decode image".into(),
            })
            .unwrap(),
            json!({"status": "failure", "kind": "decode_error", "message": "Failed to decode image"})
        );
    }

    #[tokio::test]
    async fn malformed_identifier_is_unknown() {
        let store = MemoryJobStore::new(Duration::from_secs(60));
        assert_eq!(poll(&store, "../etc/passwd").await.unwrap(), ResultResponse::Unknown);
    }

    #[tokio::test]
    async fn pending_and_unknown_are_distinct() {
        let store = MemoryJobStore::new(Duration::from_secs(60));
        let id = store.enqueue(vec![1], JobOptions::default()).await.unwrap();

        assert_eq!(poll(&store, &id.to_string()).await.unwrap(), ResultResponse::Pending);
        assert_eq!(
            poll(&store, &JobId::new().to_string()).await.unwrap(),
            ResultResponse::Unknown
        );
    }

    #[tokio::test]
    async fn failure_carries_kind_and_message() {
        let store = MemoryJobStore::new(Duration::from_secs(60));
        let id = store.enqueue(vec![1], JobOptions::default()).await.unwrap();
        store.dequeue().await.unwrap();
        store
            .complete(
                id,
                JobOutcome::Failure(ErrorResult::new(ErrorKind::ModelUnavailable, "detector down")),
            )
            .await
            .unwrap();

        assert_eq!(
            poll(&store, &id.to_string()).await.unwrap(),
            ResultResponse::Failure {
                kind: ErrorKind::ModelUnavailable,
                message: "detector down".into(),
            }
        );
    }
}
