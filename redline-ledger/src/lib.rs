//! Tamper-evident audit ledger.
//!
//! The ledger is a JSON-lines file. Each entry embeds the previous entry's hash:
//!
//! ```text
//! entry_hash = H(prev_hash || canonical({args, inputs, operation, outputs, ts}))
//! ```
//!
//! with `prev_hash = H("")` for the first entry. A sidecar head anchor
//! (`<ledger>.head`) records the expected entry count and last hash so that
//! truncation is detectable.
//!
//! Appends are serialized by an in-process mutex and an exclusive file lock on
//! `<ledger>.lock`, and refuse to chain onto a tail the anchor disagrees with;
//! verification takes no lock and checks only the entries the anchor recorded
//! when it started.

pub mod durable;
pub mod error;
pub mod lock;
mod txn;
pub mod verify;

pub use error::{BreakKind, ChainBreakError, LedgerError};
pub use verify::{VerifyReport, verify_lines};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{SecondsFormat, Utc};
use fs_err as fs;
use redline_hash::{canonical_bytes, genesis_hash, sha256_concat_hex};
use redline_types::ledger::{LedgerEntry, LedgerHead};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use txn::AppendTxn;

pub type Args = BTreeMap<String, Value>;

/// Hash of one entry body chained onto `prev_hash`.
pub fn entry_hash(
    prev_hash: &str,
    ts: &str,
    operation: &str,
    inputs: &[String],
    outputs: &[String],
    args: &Args,
) -> Result<String, serde_json::Error> {
    let body = serde_json::json!({
        "ts": ts,
        "operation": operation,
        "inputs": inputs,
        "outputs": outputs,
        "args": args,
    });
    let body = canonical_bytes(&body)?;
    Ok(sha256_concat_hex([prev_hash.as_bytes(), body.as_slice()]))
}

#[derive(Debug)]
pub struct AuditLedger {
    path: Utf8PathBuf,
    gate: Mutex<()>,
}

impl AuditLedger {
    /// Open (lazily create) a ledger at `path`. The parent directory must exist.
    pub fn open(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn head_path(&self) -> Utf8PathBuf {
        sidecar(&self.path, "head")
    }

    pub fn lock_path(&self) -> Utf8PathBuf {
        sidecar(&self.path, "lock")
    }

    /// Append one entry and return it once it is durably on disk.
    ///
    /// Errors are fatal to the caller: an operation whose audit record could not be
    /// written must not be reported as done. A ledger whose tail disagrees with
    /// its head anchor is refused with [`LedgerError::ChainBreak`].
    pub fn append(
        &self,
        operation: &str,
        inputs: Vec<String>,
        outputs: Vec<String>,
        args: Args,
    ) -> Result<LedgerEntry, LedgerError> {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let mut txn = AppendTxn::begin(&self.path, &self.lock_path())?;

        let last = txn.last_entry()?;
        txn::check_anchor(last.as_ref(), self.read_head()?.as_ref())?;
        let (seq, prev_hash) = match last {
            Some(last) => (last.seq + 1, last.entry_hash),
            None => (0, genesis_hash()),
        };
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let entry_hash = entry_hash(&prev_hash, &ts, operation, &inputs, &outputs, &args)?;

        let entry = LedgerEntry {
            seq,
            ts,
            operation: operation.to_string(),
            inputs,
            outputs,
            args,
            prev_hash,
            entry_hash,
        };
        txn.commit(&entry, &self.head_path())?;

        debug!(
            ledger = %self.path,
            seq = entry.seq,
            operation = entry.operation.as_str(),
            "ledger entry appended"
        );
        Ok(entry)
    }

    /// Verify the chain from genesis. Read-only; never repairs.
    pub fn verify(&self) -> Result<VerifyReport, LedgerError> {
        let head = self.read_head()?;
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(verify_lines(std::io::empty(), head.as_ref())?);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(verify_lines(BufReader::new(file), head.as_ref())?)
    }

    pub fn read_head(&self) -> Result<Option<LedgerHead>, LedgerError> {
        let path = self.head_path();
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| LedgerError::Malformed {
                    index: 0,
                    message: format!("head anchor {path}: {e}"),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All parseable entries in file order.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let entry = serde_json::from_str(&line).map_err(|e| LedgerError::Malformed {
                index: index as u64,
                message: e.to_string(),
            })?;
            out.push(entry);
        }
        Ok(out)
    }
}

fn sidecar(path: &Utf8Path, ext: &str) -> Utf8PathBuf {
    let mut name = path.file_name().unwrap_or("ledger").to_string();
    name.push('.');
    name.push_str(ext);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_ledger() -> (tempfile::TempDir, AuditLedger) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("audit.jsonl")).unwrap();
        (dir, AuditLedger::open(path))
    }

    #[test]
    fn first_entry_chains_from_genesis() {
        let (_dir, ledger) = temp_ledger();
        let entry = ledger
            .append("plan", vec!["a.json".into()], vec![], Args::new())
            .unwrap();
        assert_eq!(entry.seq, 0);
        assert_eq!(entry.prev_hash, genesis_hash());
        assert!(redline_hash::is_hex64(&entry.entry_hash));
    }

    #[test]
    fn entries_link_and_anchor_tracks_tail() {
        let (_dir, ledger) = temp_ledger();
        let a = ledger.append("plan", vec![], vec![], Args::new()).unwrap();
        let b = ledger.append("apply", vec![], vec![], Args::new()).unwrap();
        assert_eq!(b.seq, 1);
        assert_eq!(b.prev_hash, a.entry_hash);

        let head = ledger.read_head().unwrap().unwrap();
        assert_eq!(head.count, 2);
        assert_eq!(head.last_hash, b.entry_hash);
        assert_eq!(ledger.entries().unwrap(), vec![a, b]);
    }

    #[test]
    fn entry_hash_covers_every_body_field() {
        let args: Args = [("k".to_string(), Value::from(1))].into_iter().collect();
        let base = entry_hash("p", "t", "op", &["i".into()], &["o".into()], &args).unwrap();
        assert_ne!(base, entry_hash("q", "t", "op", &["i".into()], &["o".into()], &args).unwrap());
        assert_ne!(base, entry_hash("p", "u", "op", &["i".into()], &["o".into()], &args).unwrap());
        assert_ne!(base, entry_hash("p", "t", "op2", &["i".into()], &["o".into()], &args).unwrap());
        assert_ne!(base, entry_hash("p", "t", "op", &[], &["o".into()], &args).unwrap());
        assert_ne!(base, entry_hash("p", "t", "op", &["i".into()], &[], &args).unwrap());
        assert_ne!(base, entry_hash("p", "t", "op", &["i".into()], &["o".into()], &Args::new()).unwrap());
    }

    #[test]
    fn sidecars_sit_next_to_ledger() {
        let ledger = AuditLedger::open("logs/audit.jsonl");
        assert_eq!(ledger.head_path(), Utf8PathBuf::from("logs/audit.jsonl.head"));
        assert_eq!(ledger.lock_path(), Utf8PathBuf::from("logs/audit.jsonl.lock"));
    }

    #[test]
    fn malformed_tail_blocks_append() {
        let (_dir, ledger) = temp_ledger();
        ledger.append("plan", vec![], vec![], Args::new()).unwrap();
        let mut contents = std::fs::read_to_string(ledger.path()).unwrap();
        contents.push_str("{\"seq\":1,\"ts\":");
        std::fs::write(ledger.path(), contents).unwrap();

        let err = ledger
            .append("apply", vec![], vec![], Args::new())
            .unwrap_err();
        assert!(matches!(err, LedgerError::CorruptTail(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn verify_on_missing_ledger_is_ok() {
        let (_dir, ledger) = temp_ledger();
        let report = ledger.verify().unwrap();
        assert!(report.ok);
        assert_eq!(report.entries_checked, 0);
    }
}
