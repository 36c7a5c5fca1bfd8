//! Port traits abstracting I/O away from the pipeline.

use camino::Utf8Path;
use redline_types::action::Action;

/// Source of raw, unordered findings produced by an upstream detector.
pub trait FindingsSource {
    fn load_findings(&self) -> anyhow::Result<Vec<Action>>;
}

/// File-system write operations.
pub trait WritePort {
    /// Write `contents` so that readers never observe a partial file.
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()>;
    fn remove_file(&self, path: &Utf8Path) -> anyhow::Result<()>;
    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()>;
}
