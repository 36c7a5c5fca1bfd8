//! Durable write helpers shared by the ledger, the apply engine and the plan store.

use camino::{Utf8Path, Utf8PathBuf};
use std::io::{self, Write};
use tempfile::TempPath;

/// Write `bytes` to `path` so that readers see either the old file or the complete new one.
///
/// The data goes to a temp file in the destination directory, is fsynced, and
/// is renamed over `path`. On any error the temp file is removed and `path`
/// is untouched.
pub fn write_atomic(path: &Utf8Path, bytes: &[u8]) -> io::Result<()> {
    let dir = parent_dir(path);
    let mut tmp = tempfile::Builder::new()
        .prefix(".redline-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    sync_dir(dir);
    Ok(())
}

/// An atomic replacement of `path` that can still be undone.
///
/// A synced copy of the previous file (if any) is kept beside it until the
/// caller either [`keep`](Replacement::keep)s the new file or
/// [`undo`](Replacement::undo)es the write.
#[must_use = "a replacement must be kept or undone"]
#[derive(Debug)]
pub struct Replacement {
    path: Utf8PathBuf,
    backup: Option<TempPath>,
}

/// Like [`write_atomic`], but keeps what `path` held before so it can be restored.
pub fn replace_atomic(path: &Utf8Path, bytes: &[u8]) -> io::Result<Replacement> {
    let dir = parent_dir(path);
    let backup = match std::fs::metadata(path) {
        Ok(_) => {
            let backup = tempfile::Builder::new()
                .prefix(".redline-")
                .suffix(".bak")
                .tempfile_in(dir)?
                .into_temp_path();
            std::fs::copy(path, &backup)?;
            std::fs::File::open(&backup)?.sync_all()?;
            Some(backup)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };
    write_atomic(path, bytes)?;
    Ok(Replacement {
        path: path.to_path_buf(),
        backup,
    })
}

impl Replacement {
    /// Keep the new file; the backup is deleted.
    pub fn keep(self) {}

    /// Put the previous file back, or remove the new one if there was none.
    pub fn undo(self) -> io::Result<()> {
        match self.backup {
            Some(backup) => backup.persist(&self.path).map_err(|e| e.error)?,
            None => std::fs::remove_file(&self.path)?,
        }
        sync_dir(parent_dir(&self.path));
        Ok(())
    }
}

pub(crate) fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(p) if !p.as_str().is_empty() => p,
        _ => Utf8Path::new("."),
    }
}

/// Persist the directory entry after a rename. Best effort; not every platform can open directories.
fn sync_dir(dir: &Utf8Path) {
    #[cfg(unix)]
    if let Ok(handle) = std::fs::File::open(dir) {
        let _ = handle.sync_all();
    }
    #[cfg(not(unix))]
    let _ = dir;
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn replaces_existing_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let target = root.join("out.json");
        std::fs::write(&target, b"old").unwrap();

        write_atomic(&target, b"new").unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        let names: Vec<_> = std::fs::read_dir(&root)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["out.json".to_string()]);
    }

    fn names_in(root: &Utf8Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn undone_replacement_restores_previous_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let target = root.join("out.json");
        std::fs::write(&target, b"previous").unwrap();

        let replacement = replace_atomic(&target, b"next").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"next");
        replacement.undo().unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"previous");
        assert_eq!(names_in(&root), vec!["out.json".to_string()]);
    }

    #[test]
    fn undone_replacement_of_nothing_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let target = root.join("out.json");

        replace_atomic(&target, b"next").unwrap().undo().unwrap();
        assert!(!target.exists());
        assert!(names_in(&root).is_empty());
    }

    #[test]
    fn kept_replacement_drops_the_backup() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let target = root.join("out.json");
        std::fs::write(&target, b"previous").unwrap();

        replace_atomic(&target, b"next").unwrap().keep();
        assert_eq!(std::fs::read(&target).unwrap(), b"next");
        assert_eq!(names_in(&root), vec!["out.json".to_string()]);
    }

    #[test]
    fn missing_directory_is_an_error_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let target = root.join("nope").join("out.json");
        assert!(write_atomic(&target, b"x").is_err());
        assert!(!target.exists());
    }
}
