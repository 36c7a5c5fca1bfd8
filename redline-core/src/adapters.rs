//! Default filesystem-backed port implementations.

use crate::ports::{FindingsSource, WritePort};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use redline_ledger::durable;
use redline_types::action::Action;
use tracing::debug;

/// Loads findings from a JSON array of actions. No path means no findings.
#[derive(Debug, Clone, Default)]
pub struct FsFindingsSource {
    pub path: Option<Utf8PathBuf>,
}

impl FsFindingsSource {
    pub fn new(path: Option<Utf8PathBuf>) -> Self {
        Self { path }
    }
}

impl FindingsSource for FsFindingsSource {
    fn load_findings(&self) -> anyhow::Result<Vec<Action>> {
        let Some(path) = &self.path else {
            return Ok(vec![]);
        };
        let bytes = fs::read(path)?;
        let findings: Vec<Action> =
            serde_json::from_slice(&bytes).with_context(|| format!("parse findings {}", path))?;
        debug!(path = %path, count = findings.len(), "findings loaded");
        Ok(findings)
    }
}

/// In-memory findings for embedding and testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFindingsSource {
    findings: Vec<Action>,
}

impl InMemoryFindingsSource {
    pub fn new(findings: Vec<Action>) -> Self {
        Self { findings }
    }
}

impl FindingsSource for InMemoryFindingsSource {
    fn load_findings(&self) -> anyhow::Result<Vec<Action>> {
        Ok(self.findings.clone())
    }
}

/// Filesystem write operations; every write is atomic.
#[derive(Debug, Clone, Default)]
pub struct FsWritePort;

impl WritePort for FsWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        durable::write_atomic(path, contents).with_context(|| format!("write {}", path))
    }

    fn remove_file(&self, path: &Utf8Path) -> anyhow::Result<()> {
        Ok(fs::remove_file(path)?)
    }

    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()> {
        Ok(fs::create_dir_all(path)?)
    }
}
