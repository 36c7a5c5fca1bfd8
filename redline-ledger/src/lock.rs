//! OS advisory locks.
//!
//! Locks are advisory: they serialize cooperating redline processes and threads,
//! not arbitrary writers. Dropping the guard releases the lock.

use camino::Utf8Path;
use fs2::FileExt;
use std::io;
use tracing::trace;

#[derive(Debug)]
pub struct FileLock {
    file: std::fs::File,
}

impl FileLock {
    /// Exclusive lock on a dedicated lock file, created if missing.
    pub fn exclusive_at(path: &Utf8Path) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        FileExt::lock_exclusive(&file)?;
        trace!(path = %path, "acquired exclusive lock");
        Ok(Self { file })
    }

    /// Exclusive lock on an existing document. Fails with `NotFound` rather than creating it.
    pub fn exclusive_on(path: &Utf8Path) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        FileExt::lock_exclusive(&file)?;
        trace!(path = %path, "acquired exclusive document lock");
        Ok(Self { file })
    }

    /// Shared lock on an existing document; many readers, no exclusive holder.
    pub fn shared_on(path: &Utf8Path) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        FileExt::lock_shared(&file)?;
        trace!(path = %path, "acquired shared document lock");
        Ok(Self { file })
    }

    /// The locked handle, positioned at the start of the file.
    pub fn file(&self) -> &std::fs::File {
        &self.file
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::io::Read;

    #[test]
    fn exclusive_on_missing_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("missing.json")).unwrap();
        let err = FileLock::exclusive_on(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!path.exists());
    }

    #[test]
    fn shared_locks_coexist_and_expose_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("doc.json")).unwrap();
        std::fs::write(&path, b"abc").unwrap();

        let a = FileLock::shared_on(&path).unwrap();
        let b = FileLock::shared_on(&path).unwrap();
        let mut buf = String::new();
        a.file().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "abc");
        drop(b);
    }

    #[test]
    fn exclusive_lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("x.lock")).unwrap();
        let held = FileLock::exclusive_at(&path).unwrap();

        let contender = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        assert!(FileExt::try_lock_exclusive(&contender).is_err());
        drop(held);
        assert!(FileExt::try_lock_exclusive(&contender).is_ok());
    }
}
