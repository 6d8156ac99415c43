use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// artifact.submitted.v1 contract
// ============================================================================

/// Schema identifier carried in logs and dead-letter records
pub const SCHEMA_NAME: &str = "artifact.submitted.v1";

/// The only accepted value of the `version` field
pub const SCHEMA_VERSION: &str = "v1";

pub const FIELD_ARTIFACT_ID: &str = "artifactId";
pub const FIELD_SUBMISSION_STATE: &str = "submissionState";
pub const FIELD_BLOCKCHAIN_TX_ID: &str = "blockchainTxId";
pub const FIELD_SUBMITTED_AT: &str = "submittedAt";
pub const FIELD_PEER_ID: &str = "peerId";
pub const FIELD_VERSION: &str = "version";

/// Fields that must be present in every message
pub const REQUIRED_FIELDS: [&str; 4] = [
    FIELD_ARTIFACT_ID,
    FIELD_SUBMISSION_STATE,
    FIELD_SUBMITTED_AT,
    FIELD_VERSION,
];

/// Every field the contract allows
pub const ALLOWED_FIELDS: [&str; 6] = [
    FIELD_ARTIFACT_ID,
    FIELD_SUBMISSION_STATE,
    FIELD_BLOCKCHAIN_TX_ID,
    FIELD_SUBMITTED_AT,
    FIELD_PEER_ID,
    FIELD_VERSION,
];

pub const BLOCKCHAIN_TX_ID_MIN_LEN: usize = 1;
pub const BLOCKCHAIN_TX_ID_MAX_LEN: usize = 128;
pub const PEER_ID_MAX_LEN: usize = 64;

// ============================================================================
// SubmissionState
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubmissionState {
    Pending,
    Failed,
    Success,
}

impl SubmissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Pending => "PENDING",
            SubmissionState::Failed => "FAILED",
            SubmissionState::Success => "SUCCESS",
        }
    }

    /// Whether this state makes `blockchainTxId` mandatory
    pub fn requires_tx_id(&self) -> bool {
        matches!(self, SubmissionState::Success)
    }
}

impl std::str::FromStr for SubmissionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SubmissionState::Pending),
            "FAILED" => Ok(SubmissionState::Failed),
            "SUCCESS" => Ok(SubmissionState::Success),
            _ => Err(format!("Unknown submission state: {}", s)),
        }
    }
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Verbatim
// ============================================================================

/// A parsed field that keeps the exact text it was parsed from.
///
/// Values are forwarded downstream as written by the producer, so two
/// spellings of the same instant or id stay distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verbatim<T> {
    raw: String,
    value: T,
}

impl<T> Verbatim<T> {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T: std::str::FromStr> std::str::FromStr for Verbatim<T> {
    type Err = T::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            raw: s.to_string(),
            value: s.parse()?,
        })
    }
}

impl<T> std::fmt::Display for Verbatim<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl<T> Serialize for Verbatim<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de, T> Deserialize<'de> for Verbatim<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SubmissionEvent
// ============================================================================

/// A validated `artifact.submitted.v1` event.
///
/// `artifact_id` identifies the logical artifact, not the message: retries and
/// resubmissions may carry the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionEvent {
    pub artifact_id: Verbatim<Uuid>,
    pub submission_state: SubmissionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_tx_id: Option<String>,
    pub submitted_at: Verbatim<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    pub version: String,
}

impl SubmissionEvent {
    pub fn uuid(&self) -> Uuid {
        *self.artifact_id.value()
    }

    pub fn submitted_at_utc(&self) -> DateTime<Utc> {
        self.submitted_at.value().with_timezone(&Utc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_str() {
        for state in [
            SubmissionState::Pending,
            SubmissionState::Failed,
            SubmissionState::Success,
        ] {
            assert_eq!(state.as_str().parse::<SubmissionState>(), Ok(state));
        }
        assert!("SUBMITTED".parse::<SubmissionState>().is_err());
        assert!("pending".parse::<SubmissionState>().is_err());
    }

    #[test]
    fn test_only_success_requires_tx_id() {
        assert!(SubmissionState::Success.requires_tx_id());
        assert!(!SubmissionState::Pending.requires_tx_id());
        assert!(!SubmissionState::Failed.requires_tx_id());
    }

    #[test]
    fn test_wire_spelling_is_kept() {
        let event = SubmissionEvent {
            artifact_id: "6A4E924F-FDE0-4460-93C5-03BFB8ED7980".parse().unwrap(),
            submission_state: SubmissionState::Pending,
            blockchain_tx_id: None,
            submitted_at: "2024-01-01T02:00:00.000+02:00".parse().unwrap(),
            peer_id: None,
            version: SCHEMA_VERSION.to_string(),
        };
        assert_eq!(event.artifact_id.to_string(), "6A4E924F-FDE0-4460-93C5-03BFB8ED7980");
        assert_eq!(event.submitted_at.as_str(), "2024-01-01T02:00:00.000+02:00");
        assert_eq!(
            event.submitted_at_utc(),
            "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            event.uuid().to_string(),
            "6a4e924f-fde0-4460-93c5-03bfb8ed7980"
        );
    }

    #[test]
    fn test_verbatim_serializes_raw_text() {
        let at: Verbatim<DateTime<FixedOffset>> = "2023-12-07T15:30:00.000Z".parse().unwrap();
        let json = serde_json::to_string(&at).unwrap();
        assert_eq!(json, "\"2023-12-07T15:30:00.000Z\"");
        let back: Verbatim<DateTime<FixedOffset>> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, at);
        assert!(serde_json::from_str::<Verbatim<Uuid>>("\"nope\"").is_err());
    }

    #[test]
    fn test_required_fields_are_allowed() {
        for field in REQUIRED_FIELDS {
            assert!(ALLOWED_FIELDS.contains(&field));
        }
    }
}
