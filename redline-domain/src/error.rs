//! Error types for redline-domain.
//!
//! Every variant is a malformed-plan condition (exit code 2): the plan cannot
//! be built or trusted, and nothing is persisted.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MalformedPlanError {
    /// An action targets a page the document does not have.
    #[error("action {action} targets page {page}, document has {page_count} page(s)")]
    PageOutOfRange {
        action: String,
        page: u32,
        page_count: u32,
    },

    /// An action is internally inconsistent.
    #[error("invalid action {action}: {message}")]
    InvalidAction { action: String, message: String },

    /// The document could not be read while planning.
    #[error("document {path} is unreadable: {message}")]
    UnreadableDocument { path: String, message: String },

    /// Detection or Bates numbering needs page structure the document lacks.
    #[error("document {path} is not a layout document: {message}")]
    NotLayout { path: String, message: String },

    /// The document changed between hashing and planning.
    #[error("document {path} hashes to {actual}, plan was requested for {expected}")]
    StaleSnapshot {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("unsupported plan schema {found:?}, expected {expected:?}")]
    Schema { found: String, expected: String },

    /// Stored `plan_id` does not match the plan's content.
    #[error("plan id {recorded} does not match content ({recomputed})")]
    PlanIdMismatch {
        recorded: String,
        recomputed: String,
    },

    /// Stored actions are not in canonical order or contain duplicates.
    #[error("plan actions are not canonical: {0}")]
    NotCanonical(String),

    #[error("plan serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl MalformedPlanError {
    /// Returns the recommended exit code for this error.
    pub fn exit_code(&self) -> u8 {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_reports_exit_code_2() {
        let err = MalformedPlanError::PageOutOfRange {
            action: "redact p9 [0,1)".to_string(),
            page: 9,
            page_count: 2,
        };
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("page 9"));
    }
}
