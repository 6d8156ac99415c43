// ============================================================================
// Event Decoder
// ============================================================================

use crate::schema::validator::ValidatedPayload;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use submission_types::{SubmissionEvent, SubmissionState, Verbatim};
use thiserror::Error;
use uuid::Uuid;

/// The validator accepted a payload the decoder cannot map.
///
/// Seeing this means the two stages disagree about the contract.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("validated payload failed to deserialize: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("validated payload is inconsistent: {0}")]
    Inconsistent(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WireEvent {
    artifact_id: Verbatim<Uuid>,
    submission_state: SubmissionState,
    #[serde(default)]
    blockchain_tx_id: Option<String>,
    submitted_at: Verbatim<DateTime<FixedOffset>>,
    #[serde(default)]
    peer_id: Option<String>,
    version: String,
}

/// Map a validated payload onto a [`SubmissionEvent`]
pub fn decode(payload: &ValidatedPayload) -> Result<SubmissionEvent, DecodeError> {
    let wire = WireEvent::deserialize(payload.as_value())?;

    if wire.submission_state.requires_tx_id() && wire.blockchain_tx_id.is_none() {
        return Err(DecodeError::Inconsistent(format!(
            "{} without blockchainTxId",
            wire.submission_state
        )));
    }

    Ok(SubmissionEvent {
        artifact_id: wire.artifact_id,
        submission_state: wire.submission_state,
        blockchain_tx_id: wire.blockchain_tx_id,
        submitted_at: wire.submitted_at,
        peer_id: wire.peer_id,
        version: wire.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate;

    #[test]
    fn test_decode_preserves_every_field() {
        let raw = br#"{
            "artifactId": "6a4e924f-fde0-4460-93c5-03bfb8ed7980",
            "submissionState": "SUCCESS",
            "submittedAt": "2023-12-07T15:30:00.000Z",
            "blockchainTxId": "0xabc",
            "peerId": "peer-1",
            "version": "v1"
        }"#;

        let event = decode(&validate(raw).unwrap()).unwrap();
        assert_eq!(
            event.artifact_id.to_string(),
            "6a4e924f-fde0-4460-93c5-03bfb8ed7980"
        );
        assert_eq!(event.submission_state, SubmissionState::Success);
        assert_eq!(event.blockchain_tx_id.as_deref(), Some("0xabc"));
        assert_eq!(event.peer_id.as_deref(), Some("peer-1"));
        assert_eq!(event.version, "v1");
        assert_eq!(event.submitted_at.as_str(), "2023-12-07T15:30:00.000Z");
    }

    #[test]
    fn test_decode_keeps_offset_and_id_spelling() {
        let raw = br#"{
            "artifactId": "6A4E924F-FDE0-4460-93C5-03BFB8ED7980",
            "submissionState": "PENDING",
            "submittedAt": "2024-01-01T02:00:00+02:00",
            "version": "v1"
        }"#;

        let event = decode(&validate(raw).unwrap()).unwrap();
        assert_eq!(event.submitted_at.as_str(), "2024-01-01T02:00:00+02:00");
        assert_eq!(event.submitted_at_utc().to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(event.artifact_id.as_str(), "6A4E924F-FDE0-4460-93C5-03BFB8ED7980");
        assert!(event.blockchain_tx_id.is_none());
        assert!(event.peer_id.is_none());
    }
}
