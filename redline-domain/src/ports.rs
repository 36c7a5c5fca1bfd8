use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use redline_ledger::lock::FileLock;
use std::collections::BTreeMap;
use std::io::Read;

/// Read-only document access.
///
/// redline-domain uses this so plan building can be tested against an in-memory implementation.
pub trait DocumentView {
    /// Read the full document bytes as one consistent snapshot.
    fn read(&self, path: &Utf8Path) -> anyhow::Result<Vec<u8>>;
}

/// File-system backed `DocumentView`. Reads hold a shared advisory lock, so
/// they never observe a concurrent apply half-way.
#[derive(Debug, Clone, Default)]
pub struct FsDocumentView;

impl DocumentView for FsDocumentView {
    fn read(&self, path: &Utf8Path) -> anyhow::Result<Vec<u8>> {
        let lock = FileLock::shared_on(path).with_context(|| format!("lock {}", path))?;
        let mut bytes = Vec::new();
        lock.file()
            .read_to_end(&mut bytes)
            .with_context(|| format!("read {}", path))?;
        Ok(bytes)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentView {
    docs: BTreeMap<Utf8PathBuf, Vec<u8>>,
}

impl InMemoryDocumentView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<Utf8PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        self.docs.insert(path.into(), bytes.into());
        self
    }
}

impl DocumentView for InMemoryDocumentView {
    fn read(&self, path: &Utf8Path) -> anyhow::Result<Vec<u8>> {
        self.docs
            .get(path)
            .cloned()
            .with_context(|| format!("no such document {}", path))
    }
}
