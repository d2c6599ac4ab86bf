// 🚨 Error Taxonomy - per-request vs. whole-batch failures
//
// Per-request errors are captured in that request's result slot and never
// stop the batch. AmbiguousStateError is the only error that aborts a batch.

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// FIELD PARSE ERRORS
// ============================================================================

/// Malformed amount value (anything not matching `^[+-]?[0-9]+$`)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid amount `{raw}`: {reason}")]
pub struct AmountParseError {
    pub raw: String,
    pub reason: String,
}

impl AmountParseError {
    pub fn new(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        AmountParseError {
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

/// Unrecognized card condition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized condition `{0}`")]
pub struct ConditionParseError(pub String);

// ============================================================================
// REQUEST ERRORS (scoped to one request)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestError {
    /// Malformed amount/enum/identity field
    #[error("parse error in `{field}`: {message}")]
    Parse { field: String, message: String },

    /// `id` supplied but absent from the collection
    #[error("id not found: {id}")]
    NotFound { id: String },

    /// Not enough information to resolve or create an entry
    #[error("validation error: {message}")]
    Validation { message: String },
}

impl RequestError {
    pub fn parse(field: &str, message: impl Into<String>) -> Self {
        RequestError::Parse {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(id: &str) -> Self {
        RequestError::NotFound { id: id.to_string() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        RequestError::Validation {
            message: message.into(),
        }
    }
}

impl From<AmountParseError> for RequestError {
    fn from(err: AmountParseError) -> Self {
        RequestError::parse("amount", err.to_string())
    }
}

impl From<ConditionParseError> for RequestError {
    fn from(err: ConditionParseError) -> Self {
        RequestError::parse("condition", err.to_string())
    }
}

// ============================================================================
// FATAL STATE ERROR
// ============================================================================

/// More than one persisted entry shares an identity tuple.
///
/// This means the stored collection already violates the uniqueness
/// invariant. It is surfaced for manual remediation and never auto-repaired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "ambiguous state for owner {owner_id}: {} entries share identity {fingerprint} ({})",
    .entry_ids.len(),
    .entry_ids.join(", ")
)]
pub struct AmbiguousStateError {
    pub owner_id: String,
    pub fingerprint: String,
    pub entry_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_error_converts_to_parse() {
        let err: RequestError = AmountParseError::new("abc", "not a number").into();
        match err {
            RequestError::Parse { field, message } => {
                assert_eq!(field, "amount");
                assert!(message.contains("abc"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_request_error_serializes_with_kind_tag() {
        let json = serde_json::to_value(RequestError::not_found("99")).unwrap();
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["id"], "99");
    }

    #[test]
    fn test_ambiguous_state_message_lists_ids() {
        let err = AmbiguousStateError {
            owner_id: "owner".to_string(),
            fingerprint: "abc".to_string(),
            entry_ids: vec!["1".to_string(), "2".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 entries"));
        assert!(msg.contains("1, 2"));
    }
}
