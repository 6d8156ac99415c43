// ============================================================================
// Schema Validator
// ============================================================================
//
// Checks, in this order (first failure wins, so results are deterministic):
// 1. UTF-8 JSON object
// 2. No fields outside the contract
// 3. Required fields present
// 4. Every field is a string
// 5. version == "v1", submissionState is a known state
// 6. artifactId is a hyphenated UUID, submittedAt is RFC 3339
// 7. Length bounds on blockchainTxId and peerId
// 8. SUCCESS requires blockchainTxId (explicit post-parse rule)
//
// ============================================================================

use chrono::DateTime;
use serde_json::{Map, Value};
use submission_types::{
    SubmissionState, ALLOWED_FIELDS, BLOCKCHAIN_TX_ID_MAX_LEN, BLOCKCHAIN_TX_ID_MIN_LEN,
    FIELD_ARTIFACT_ID, FIELD_BLOCKCHAIN_TX_ID, FIELD_PEER_ID, FIELD_SUBMISSION_STATE,
    FIELD_SUBMITTED_AT, FIELD_VERSION, PEER_ID_MAX_LEN, REQUIRED_FIELDS, SCHEMA_VERSION,
};
use thiserror::Error;
use uuid::Uuid;

/// Structural defect in an inbound message. Always terminal for that message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("payload is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be a string")]
    NotAString { field: &'static str },

    #[error("unsupported version '{0}', expected 'v1'")]
    UnsupportedVersion(String),

    #[error("invalid submissionState '{0}'")]
    InvalidState(String),

    #[error("artifactId '{0}' is not a valid UUID")]
    InvalidUuid(String),

    #[error("submittedAt '{0}' is not an RFC 3339 date-time")]
    InvalidTimestamp(String),

    #[error("field '{field}' length {actual} outside {min}..={max}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("blockchainTxId is required when submissionState is {state}")]
    MissingTxId { state: SubmissionState },
}

impl SchemaViolation {
    /// Stable code for logs and dead-letter records
    pub fn code(&self) -> &'static str {
        match self {
            SchemaViolation::MalformedJson(_) => "MALFORMED_JSON",
            SchemaViolation::NotAnObject => "NOT_AN_OBJECT",
            SchemaViolation::UnknownField(_) => "UNKNOWN_FIELD",
            SchemaViolation::MissingField(_) => "MISSING_FIELD",
            SchemaViolation::NotAString { .. } => "INVALID_TYPE",
            SchemaViolation::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
            SchemaViolation::InvalidState(_) => "INVALID_STATE",
            SchemaViolation::InvalidUuid(_) => "INVALID_UUID",
            SchemaViolation::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
            SchemaViolation::InvalidLength { .. } => "INVALID_LENGTH",
            SchemaViolation::MissingTxId { .. } => "MISSING_TX_ID",
        }
    }
}

/// A payload that passed every schema check.
///
/// Only [`SchemaValidator::validate`] constructs this type.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayload {
    value: Value,
}

impl ValidatedPayload {
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// The artifact id as it appeared on the wire
    pub fn artifact_id(&self) -> &str {
        self.value
            .get(FIELD_ARTIFACT_ID)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Stateless validator for artifact.submitted.v1
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, raw: &[u8]) -> Result<ValidatedPayload, SchemaViolation> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| SchemaViolation::MalformedJson(e.to_string()))?;

        let object = value.as_object().ok_or(SchemaViolation::NotAnObject)?;

        if let Some(unknown) = object
            .keys()
            .find(|key| !ALLOWED_FIELDS.contains(&key.as_str()))
        {
            return Err(SchemaViolation::UnknownField(unknown.clone()));
        }

        for field in REQUIRED_FIELDS {
            if !object.contains_key(field) {
                return Err(SchemaViolation::MissingField(field));
            }
        }

        for field in ALLOWED_FIELDS {
            if let Some(v) = object.get(field) {
                if !v.is_string() {
                    return Err(SchemaViolation::NotAString { field });
                }
            }
        }

        let version = required_str(object, FIELD_VERSION);
        if version != SCHEMA_VERSION {
            return Err(SchemaViolation::UnsupportedVersion(version.to_string()));
        }

        let raw_state = required_str(object, FIELD_SUBMISSION_STATE);
        let state: SubmissionState = raw_state
            .parse()
            .map_err(|_| SchemaViolation::InvalidState(raw_state.to_string()))?;

        let artifact_id = required_str(object, FIELD_ARTIFACT_ID);
        if !is_hyphenated_uuid(artifact_id) {
            return Err(SchemaViolation::InvalidUuid(artifact_id.to_string()));
        }

        let submitted_at = required_str(object, FIELD_SUBMITTED_AT);
        if DateTime::parse_from_rfc3339(submitted_at).is_err() {
            return Err(SchemaViolation::InvalidTimestamp(submitted_at.to_string()));
        }

        let tx_id = optional_str(object, FIELD_BLOCKCHAIN_TX_ID);
        if let Some(tx_id) = tx_id {
            check_length(
                FIELD_BLOCKCHAIN_TX_ID,
                tx_id,
                BLOCKCHAIN_TX_ID_MIN_LEN,
                BLOCKCHAIN_TX_ID_MAX_LEN,
            )?;
        }

        if let Some(peer_id) = optional_str(object, FIELD_PEER_ID) {
            check_length(FIELD_PEER_ID, peer_id, 0, PEER_ID_MAX_LEN)?;
        }

        // Conditional rule: kept apart from the shape checks above
        if state.requires_tx_id() && tx_id.map_or(true, str::is_empty) {
            return Err(SchemaViolation::MissingTxId { state });
        }

        Ok(ValidatedPayload { value })
    }
}

/// Validate with the default validator
pub fn validate(raw: &[u8]) -> Result<ValidatedPayload, SchemaViolation> {
    SchemaValidator::new().validate(raw)
}

fn required_str<'a>(object: &'a Map<String, Value>, field: &str) -> &'a str {
    optional_str(object, field).unwrap_or_default()
}

fn optional_str<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    object.get(field).and_then(Value::as_str)
}

fn check_length(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), SchemaViolation> {
    let actual = value.chars().count();
    if actual < min || actual > max {
        return Err(SchemaViolation::InvalidLength {
            field,
            min,
            max,
            actual,
        });
    }
    Ok(())
}

fn is_hyphenated_uuid(s: &str) -> bool {
    s.len() == 36 && Uuid::try_parse(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ARTIFACT_ID: &str = "6a4e924f-fde0-4460-93c5-03bfb8ed7980";

    fn success_message() -> Value {
        json!({
            "artifactId": ARTIFACT_ID,
            "submissionState": "SUCCESS",
            "submittedAt": "2023-12-07T15:30:00.000Z",
            "blockchainTxId": "0x1234567890abcdef1234567890abcdef12345678",
            "peerId": "12D3KooWBhxQ7uXeY9zF8qG5nM4rL3pT6vN8wS2cK9jH1fX7yR4e",
            "version": "v1"
        })
    }

    fn check(value: &Value) -> Result<ValidatedPayload, SchemaViolation> {
        validate(&serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_full_success_message_is_valid() {
        let payload = check(&success_message()).unwrap();
        assert_eq!(payload.artifact_id(), ARTIFACT_ID);
    }

    #[test]
    fn test_minimal_pending_message_is_valid() {
        let msg = json!({
            "artifactId": ARTIFACT_ID,
            "submissionState": "PENDING",
            "submittedAt": "2024-01-01T00:00:00Z",
            "version": "v1"
        });
        assert!(check(&msg).is_ok());
    }

    #[test]
    fn test_failed_state_may_carry_tx_id() {
        let mut msg = success_message();
        msg["submissionState"] = json!("FAILED");
        assert!(check(&msg).is_ok());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            validate(b"not json"),
            Err(SchemaViolation::MalformedJson(_))
        ));
    }

    #[test]
    fn test_non_object_payload() {
        assert_eq!(validate(b"[1,2,3]"), Err(SchemaViolation::NotAnObject));
        assert_eq!(validate(b"\"v1\""), Err(SchemaViolation::NotAnObject));
    }

    #[test]
    fn test_empty_object_reports_first_missing_field() {
        assert_eq!(
            validate(b"{}"),
            Err(SchemaViolation::MissingField("artifactId"))
        );
    }

    #[test]
    fn test_each_required_field_is_enforced() {
        for field in REQUIRED_FIELDS {
            let mut msg = success_message();
            msg.as_object_mut().unwrap().remove(field);
            assert_eq!(
                check(&msg),
                Err(SchemaViolation::MissingField(field)),
                "removing {field}"
            );
        }
    }

    #[test]
    fn test_additional_field_rejected() {
        let mut msg = success_message();
        msg["error"] = json!("peer timeout");
        assert_eq!(
            check(&msg),
            Err(SchemaViolation::UnknownField("error".to_string()))
        );
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut msg = success_message();
        msg["version"] = json!("v2");
        assert_eq!(
            check(&msg),
            Err(SchemaViolation::UnsupportedVersion("v2".to_string()))
        );
    }

    #[test]
    fn test_invalid_state_rejected() {
        let mut msg = success_message();
        msg["submissionState"] = json!("INVALID_STATE");
        assert_eq!(
            check(&msg),
            Err(SchemaViolation::InvalidState("INVALID_STATE".to_string()))
        );
    }

    #[test]
    fn test_null_and_non_string_values_rejected() {
        let mut msg = success_message();
        msg["peerId"] = Value::Null;
        assert_eq!(
            check(&msg),
            Err(SchemaViolation::NotAString { field: "peerId" })
        );

        let mut msg = success_message();
        msg["version"] = json!(1);
        assert_eq!(
            check(&msg),
            Err(SchemaViolation::NotAString { field: "version" })
        );
    }

    #[test]
    fn test_artifact_id_must_be_hyphenated_uuid() {
        for bad in [
            "artifact-123",
            "6a4e924ffde0446093c503bfb8ed7980",
            "{6a4e924f-fde0-4460-93c5-03bfb8ed7980}",
            "",
        ] {
            let mut msg = success_message();
            msg["artifactId"] = json!(bad);
            assert!(
                matches!(check(&msg), Err(SchemaViolation::InvalidUuid(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_submitted_at_must_be_rfc3339() {
        for bad in ["2023-12-07", "yesterday", "2023-12-07 15:30:00"] {
            let mut msg = success_message();
            msg["submittedAt"] = json!(bad);
            assert!(matches!(
                check(&msg),
                Err(SchemaViolation::InvalidTimestamp(_))
            ));
        }
    }

    #[test]
    fn test_success_without_tx_id_rejected() {
        let mut msg = success_message();
        msg.as_object_mut().unwrap().remove("blockchainTxId");
        assert_eq!(
            check(&msg),
            Err(SchemaViolation::MissingTxId {
                state: SubmissionState::Success
            })
        );
    }

    #[test]
    fn test_tx_id_length_bounds() {
        let mut msg = success_message();
        msg["blockchainTxId"] = json!("");
        assert!(matches!(
            check(&msg),
            Err(SchemaViolation::InvalidLength {
                field: "blockchainTxId",
                actual: 0,
                ..
            })
        ));

        msg["blockchainTxId"] = json!("a".repeat(128));
        assert!(check(&msg).is_ok());

        msg["blockchainTxId"] = json!("a".repeat(129));
        assert!(matches!(
            check(&msg),
            Err(SchemaViolation::InvalidLength { actual: 129, .. })
        ));

        msg["blockchainTxId"] = json!("x");
        assert!(check(&msg).is_ok());
    }

    #[test]
    fn test_peer_id_length_counts_characters() {
        let mut msg = success_message();
        msg["peerId"] = json!("é".repeat(64));
        assert!(check(&msg).is_ok());

        msg["peerId"] = json!("p".repeat(65));
        assert!(matches!(
            check(&msg),
            Err(SchemaViolation::InvalidLength {
                field: "peerId",
                ..
            })
        ));
    }

    #[test]
    fn test_validation_is_deterministic() {
        let raw = br#"{"artifactId":"nope","version":"v9","extra":1}"#;
        let first = validate(raw);
        let second = validate(raw);
        assert_eq!(first, second);
        assert_eq!(first, Err(SchemaViolation::UnknownField("extra".to_string())));
    }

    #[test]
    fn test_violation_codes_are_stable() {
        assert_eq!(SchemaViolation::NotAnObject.code(), "NOT_AN_OBJECT");
        assert_eq!(
            SchemaViolation::MissingTxId {
                state: SubmissionState::Success
            }
            .code(),
            "MISSING_TX_ID"
        );
    }
}
