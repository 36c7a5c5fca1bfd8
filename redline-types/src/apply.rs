use crate::action::Action;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Outcome of applying a plan to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub plan_id: String,
    pub document_path: Utf8PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<Utf8PathBuf>,

    /// Hash of the document bytes actually read at apply time.
    pub input_hash: String,

    /// Hash of the produced artifact (or the would-be artifact in preview mode).
    pub output_hash: String,

    pub applied_count: u64,

    #[serde(default)]
    pub skipped: Vec<SkippedAction>,

    /// True when the document hash did not match the plan and `force` was used.
    pub overridden: bool,

    #[serde(default)]
    pub preview: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_seq: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedAction {
    pub action: Action,
    pub reason: String,
    pub reason_token: String,
}

/// Stable tokens for skip reasons.
pub mod skip_tokens {
    /// The resolver found no geometry for a redaction.
    pub const RESOLUTION_MISS: &str = "resolution_miss";
    /// The action's page does not exist in the document being applied.
    pub const PAGE_MISSING: &str = "page_missing";
}
