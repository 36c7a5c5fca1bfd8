use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Identity of a document at one point in time.
///
/// Snapshots are recomputed on demand and never cached across mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub path: Utf8PathBuf,
    pub content_hash: String,
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
}
