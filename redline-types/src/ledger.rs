use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One line of the audit ledger.
///
/// `ts` is kept as the exact string that was hashed so re-serialization can never
/// change an entry's digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: u64,
    pub ts: String,
    pub operation: String,

    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub args: BTreeMap<String, serde_json::Value>,

    pub prev_hash: String,
    pub entry_hash: String,
}

/// Sidecar anchor recording how long the ledger is supposed to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHead {
    pub schema: String,
    pub count: u64,
    pub last_hash: String,
}
