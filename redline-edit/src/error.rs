//! Error types for redline-edit.
//!
//! - Integrity rejection (exit code 1): the document drifted since planning.
//! - Malformed input (exit code 2): bad plan, unusable document, strict resolution miss.
//! - I/O (exit code 3): the artifact could not be read or written.
//! - Ledger failures carry the ledger's own exit code.
//!
//! Every variant is returned before any artifact is left on disk.

use redline_domain::MalformedPlanError;
use redline_ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplyError {
    /// The document no longer hashes to the plan's `document_hash`.
    #[error("integrity check failed for {path}: plan expects {expected}, document is {actual}")]
    Integrity {
        path: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Malformed(#[from] MalformedPlanError),

    /// Strict mode: one or more redactions could not be located on the page.
    #[error("{} redaction(s) could not be located: {}", actions.len(), actions.join(", "))]
    ResolutionMiss { actions: Vec<String> },

    /// The document is not a layout document this engine can mutate.
    #[error("document {path} is not a layout document: {message}")]
    UnsupportedDocument { path: String, message: String },

    #[error("refusing to overwrite the source document {0}")]
    OutputIsSource(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ApplyError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ApplyError::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true if this is a hash-gate rejection.
    pub fn is_integrity(&self) -> bool {
        matches!(self, ApplyError::Integrity { .. })
    }

    /// Returns the recommended exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ApplyError::Integrity { .. } => 1,
            ApplyError::Malformed(e) => e.exit_code(),
            ApplyError::ResolutionMiss { .. } | ApplyError::UnsupportedDocument { .. } => 2,
            ApplyError::OutputIsSource(_) | ApplyError::Io { .. } => 3,
            ApplyError::Ledger(e) => e.exit_code(),
        }
    }
}
