//! Error types for redline-ledger.
//!
//! - Chain breaks and unparseable entries (exit code 2): the ledger cannot be trusted.
//! - I/O errors (exit code 3): the ledger could not be read or durably written.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the chain was found to be broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// The entry body no longer hashes to its recorded `entry_hash`.
    Modified,
    /// Fewer entries than the head anchor records.
    Truncated,
    /// `seq` or `prev_hash` does not link to the preceding entry.
    Relinked,
    /// The last scanned hash disagrees with the head anchor.
    AnchorMismatch,
    /// Entries exist but the head anchor does not.
    AnchorMissing,
    /// A line is not a ledger entry.
    Malformed,
}

impl BreakKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakKind::Modified => "modified",
            BreakKind::Truncated => "truncated",
            BreakKind::Relinked => "relinked",
            BreakKind::AnchorMismatch => "anchor_mismatch",
            BreakKind::AnchorMissing => "anchor_missing",
            BreakKind::Malformed => "malformed",
        }
    }
}

/// Verification found a discontinuity. Never auto-repaired.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("ledger chain broken at entry {index} ({}): {detail}", kind.as_str())]
pub struct ChainBreakError {
    pub index: u64,
    pub kind: BreakKind,
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("ledger entry {index} is malformed: {message}")]
    Malformed { index: u64, message: String },

    /// The tail entry could not be parsed, so nothing can be chained onto it.
    #[error("ledger tail is corrupt: {0}")]
    CorruptTail(String),

    #[error(transparent)]
    ChainBreak(#[from] ChainBreakError),
}

impl LedgerError {
    /// Returns the recommended exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            LedgerError::Malformed { .. }
            | LedgerError::CorruptTail(_)
            | LedgerError::ChainBreak(_) => 2,
            LedgerError::Io(_) | LedgerError::Serialize(_) => 3,
        }
    }
}
