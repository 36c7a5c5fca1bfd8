//! Clap-free settings for the plan, apply and batch pipelines.

use camino::Utf8PathBuf;
use redline_domain::BatesConfig;
use redline_edit::DEFAULT_STAMP_MARGIN;
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_PAYLOAD: &str = "[REDACTED]";
pub const DEFAULT_LEDGER: &str = "redline-ledger.jsonl";

/// Settings for the plan pipeline.
#[derive(Debug, Clone)]
pub struct PlanSettings {
    pub document: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub ledger_path: Utf8PathBuf,

    // Action sources
    pub terms: Vec<String>,
    pub payload: String,
    pub bates: Option<BatesConfig>,

    pub annotations: BTreeMap<String, Value>,

    /// Encrypt the plan at rest. Requires a key.
    pub seal: bool,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            document: Utf8PathBuf::new(),
            output: Utf8PathBuf::from("plan.json"),
            ledger_path: Utf8PathBuf::from(DEFAULT_LEDGER),
            terms: Vec::new(),
            payload: DEFAULT_PAYLOAD.to_string(),
            bates: None,
            annotations: BTreeMap::new(),
            seal: false,
        }
    }
}

/// Settings for the apply pipeline.
#[derive(Debug, Clone)]
pub struct ApplySettings {
    pub plan_path: Utf8PathBuf,
    pub out_dir: Utf8PathBuf,
    pub ledger_path: Utf8PathBuf,

    pub force: bool,
    pub preview: bool,
    pub strict_redactions: bool,
    pub stamp_margin: f64,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            plan_path: Utf8PathBuf::new(),
            out_dir: Utf8PathBuf::from("redacted"),
            ledger_path: Utf8PathBuf::from(DEFAULT_LEDGER),
            force: false,
            preview: false,
            strict_redactions: false,
            stamp_margin: DEFAULT_STAMP_MARGIN,
        }
    }
}

/// Settings for batch apply.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub plan_paths: Vec<Utf8PathBuf>,
    pub out_dir: Utf8PathBuf,
    pub ledger_path: Utf8PathBuf,

    /// Worker threads; clamped to at least one and at most the number of plans.
    pub jobs: usize,

    pub force: bool,
    pub strict_redactions: bool,
    pub stamp_margin: f64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            plan_paths: Vec::new(),
            out_dir: Utf8PathBuf::from("redacted"),
            ledger_path: Utf8PathBuf::from(DEFAULT_LEDGER),
            jobs: 4,
            force: false,
            strict_redactions: false,
            stamp_margin: DEFAULT_STAMP_MARGIN,
        }
    }
}

impl BatchSettings {
    /// Apply settings for one plan of the batch.
    pub fn for_plan(&self, plan_path: Utf8PathBuf) -> ApplySettings {
        ApplySettings {
            plan_path,
            out_dir: self.out_dir.clone(),
            ledger_path: self.ledger_path.clone(),
            force: self.force,
            preview: false,
            strict_redactions: self.strict_redactions,
            stamp_margin: self.stamp_margin,
        }
    }
}
