// ============================================================================
// artifact.submitted.v1 schema
// ============================================================================
//
// Two stages, both pure:
// - validator.rs - raw bytes -> ValidatedPayload or SchemaViolation
// - decoder.rs   - ValidatedPayload -> SubmissionEvent
//
// A ValidatedPayload can only be produced by the validator, so the decoder
// never sees unchecked input. A decode failure therefore means the two
// stages disagree, which is a bug rather than bad input.
//
// ============================================================================

pub mod decoder;
pub mod validator;

pub use decoder::{decode, DecodeError};
pub use validator::{validate, SchemaValidator, SchemaViolation, ValidatedPayload};
