//! Scoped append transaction.
//!
//! An [`AppendTxn`] owns the cross-process lock and the open ledger file for the
//! whole read-last-hash / write-entry critical section. Every exit path ends
//! with a durable-write barrier: `commit` syncs explicitly, and `Drop` rolls a
//! half-written line back to the starting length and syncs.

use crate::durable;
use crate::error::{BreakKind, ChainBreakError, LedgerError};
use crate::lock::FileLock;
use camino::Utf8Path;
use fs_err as fs;
use redline_types::ledger::{LedgerEntry, LedgerHead};
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::warn;

const TAIL_CHUNK: u64 = 4096;

pub(crate) struct AppendTxn {
    // Field order matters: the ledger handle closes before the lock is released.
    file: fs::File,
    start_len: u64,
    pending: bool,
    _lock: FileLock,
}

impl AppendTxn {
    pub(crate) fn begin(ledger: &Utf8Path, lock: &Utf8Path) -> Result<Self, LedgerError> {
        let lock = FileLock::exclusive_at(lock)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(ledger)?;
        let start_len = file.metadata()?.len();
        Ok(Self {
            file,
            start_len,
            pending: false,
            _lock: lock,
        })
    }

    /// The most recently written entry, or `None` for an empty ledger.
    ///
    /// A tail that does not parse is fatal: nothing may be chained onto it.
    pub(crate) fn last_entry(&mut self) -> Result<Option<LedgerEntry>, LedgerError> {
        let Some(line) = read_last_line(&mut self.file, self.start_len)? else {
            return Ok(None);
        };
        serde_json::from_slice(&line)
            .map(Some)
            .map_err(|e| LedgerError::CorruptTail(e.to_string()))
    }

    /// Append `entry` as one line, force it to disk, then move the head anchor.
    pub(crate) fn commit(
        mut self,
        entry: &LedgerEntry,
        head_path: &Utf8Path,
    ) -> Result<(), LedgerError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        self.pending = true;
        self.file.write_all(&line)?;
        self.file.sync_all()?;
        self.pending = false;

        let head = LedgerHead {
            schema: redline_types::schema::REDLINE_LEDGER_HEAD_V1.to_string(),
            count: entry.seq + 1,
            last_hash: entry.entry_hash.clone(),
        };
        let mut bytes = serde_json::to_vec_pretty(&head)?;
        bytes.push(b'\n');
        durable::write_atomic(head_path, &bytes)?;
        Ok(())
    }
}

impl Drop for AppendTxn {
    fn drop(&mut self) {
        if self.pending {
            warn!(
                ledger = %self.file.path().display(),
                "append interrupted; truncating partial entry"
            );
            let _ = self.file.file().set_len(self.start_len);
        }
        let _ = self.file.sync_all();
    }
}

/// Refuse to chain onto a tail the head anchor does not vouch for.
///
/// The tail must be the entry the anchor records, or exactly one entry past it
/// and linked to it (an append whose anchor update was interrupted). Anything
/// else means entries were removed or replaced, and appending would hide it.
pub(crate) fn check_anchor(
    last: Option<&LedgerEntry>,
    head: Option<&LedgerHead>,
) -> Result<(), ChainBreakError> {
    match (last, head) {
        (None, None) => Ok(()),
        (None, Some(h)) if h.count == 0 => Ok(()),
        (None, Some(h)) => Err(ChainBreakError {
            index: 0,
            kind: BreakKind::Truncated,
            detail: format!("ledger is empty but the anchor records {} entries", h.count),
        }),
        (Some(last), None) => Err(ChainBreakError {
            index: last.seq,
            kind: BreakKind::AnchorMissing,
            detail: "ledger has entries but no head anchor".to_string(),
        }),
        (Some(last), Some(h)) if last.seq + 1 == h.count && last.entry_hash == h.last_hash => {
            Ok(())
        }
        (Some(last), Some(h)) if last.seq == h.count && last.prev_hash == h.last_hash => {
            warn!(seq = last.seq, "head anchor lags the tail by one entry; catching up");
            Ok(())
        }
        (Some(last), Some(h)) if last.seq + 1 < h.count => Err(ChainBreakError {
            index: last.seq + 1,
            kind: BreakKind::Truncated,
            detail: format!(
                "tail is entry {} but the anchor records {} entries",
                last.seq, h.count
            ),
        }),
        (Some(last), Some(h)) => Err(ChainBreakError {
            index: h.count.saturating_sub(1),
            kind: BreakKind::AnchorMismatch,
            detail: format!(
                "anchor records last hash {}, tail entry {} hashes to {}",
                h.last_hash, last.seq, last.entry_hash
            ),
        }),
    }
}

/// Read the last non-empty line of the first `len` bytes of `file`, scanning backwards.
fn read_last_line(file: &mut fs::File, len: u64) -> io::Result<Option<Vec<u8>>> {
    let mut pos = len;
    let mut tail: Vec<u8> = Vec::new();

    while pos > 0 {
        let chunk = TAIL_CHUNK.min(pos);
        pos -= chunk;
        let mut block = vec![0u8; chunk as usize];
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut block)?;
        block.extend_from_slice(&tail);
        tail = block;

        if let Some(end) = tail.iter().rposition(|b| *b != b'\n') {
            if let Some(nl) = tail[..end].iter().rposition(|b| *b == b'\n') {
                return Ok(Some(tail[nl + 1..=end].to_vec()));
            }
        }
    }

    Ok(tail
        .iter()
        .rposition(|b| *b != b'\n')
        .map(|end| tail[..=end].to_vec()))
}
