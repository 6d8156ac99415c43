// ============================================================================
// Submission Types - Core Data Types
// ============================================================================
//
// Data structures shared by the listener modules. No dependencies on the
// broker, the HTTP stack or configuration.
//
// Contents:
// - SubmissionState (PENDING / FAILED / SUCCESS)
// - SubmissionEvent (a validated, decoded artifact.submitted.v1 message)
// - Verbatim<T> (a parsed field that keeps its wire text)
// - Field names and bounds of the artifact.submitted.v1 contract
//
// ============================================================================

pub mod event;

pub use event::*;
