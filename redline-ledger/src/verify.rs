//! Chain verification.

use crate::error::{BreakKind, ChainBreakError};
use crate::entry_hash;
use redline_hash::genesis_hash;
use redline_types::ledger::{LedgerEntry, LedgerHead};
use serde::{Deserialize, Serialize};
use std::io::BufRead;

/// Result of a verification pass. Tampering is data, not an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub ok: bool,
    pub entries_checked: u64,

    /// Entry count recorded by the head anchor when the scan started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_index: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_kind: Option<BreakKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl VerifyReport {
    fn intact(entries_checked: u64, expected: Option<u64>) -> Self {
        Self {
            ok: true,
            entries_checked,
            expected,
            break_index: None,
            break_kind: None,
            detail: None,
        }
    }

    fn broken(
        entries_checked: u64,
        expected: Option<u64>,
        index: u64,
        kind: BreakKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            ok: false,
            entries_checked,
            expected,
            break_index: Some(index),
            break_kind: Some(kind),
            detail: Some(detail.into()),
        }
    }

    pub fn into_result(self) -> Result<Self, ChainBreakError> {
        match (self.ok, self.break_index, self.break_kind) {
            (false, Some(index), Some(kind)) => Err(ChainBreakError {
                index,
                kind,
                detail: self.detail.unwrap_or_default(),
            }),
            _ => Ok(self),
        }
    }
}

/// Verify a stream of ledger lines against an optional head anchor.
///
/// Only the first `head.count` lines are examined; anything after them was
/// appended after the snapshot and is ignored. Each line must be byte-identical
/// to the re-serialization of the entry it parses to.
pub fn verify_lines<R: BufRead>(
    reader: R,
    head: Option<&LedgerHead>,
) -> std::io::Result<VerifyReport> {
    let expected = head.map(|h| h.count);
    let mut prev = genesis_hash();
    let mut index: u64 = 0;

    for line in reader.lines() {
        if expected.is_some_and(|n| index >= n) {
            break;
        }
        let line = line?;

        let entry: LedgerEntry = match serde_json::from_str(&line) {
            Ok(e) => e,
            Err(e) => {
                return Ok(VerifyReport::broken(
                    index,
                    expected,
                    index,
                    BreakKind::Malformed,
                    format!("unparseable entry: {e}"),
                ));
            }
        };

        if entry.seq != index || entry.prev_hash != prev {
            return Ok(VerifyReport::broken(
                index,
                expected,
                index,
                BreakKind::Relinked,
                format!(
                    "expected seq {index} after {prev}, found seq {} after {}",
                    entry.seq, entry.prev_hash
                ),
            ));
        }

        let recomputed = match entry_hash(
            &entry.prev_hash,
            &entry.ts,
            &entry.operation,
            &entry.inputs,
            &entry.outputs,
            &entry.args,
        ) {
            Ok(h) => h,
            Err(e) => {
                return Ok(VerifyReport::broken(
                    index,
                    expected,
                    index,
                    BreakKind::Malformed,
                    format!("entry body cannot be canonicalized: {e}"),
                ));
            }
        };
        if recomputed != entry.entry_hash {
            return Ok(VerifyReport::broken(
                index,
                expected,
                index,
                BreakKind::Modified,
                format!(
                    "recorded hash {} but body hashes to {recomputed}",
                    entry.entry_hash
                ),
            ));
        }

        let reserialized = serde_json::to_string(&entry).unwrap_or_default();
        if reserialized != line {
            return Ok(VerifyReport::broken(
                index,
                expected,
                index,
                BreakKind::Modified,
                "line bytes differ from the entry they encode",
            ));
        }

        prev = entry.entry_hash;
        index += 1;
    }

    match head {
        Some(h) if index < h.count => Ok(VerifyReport::broken(
            index,
            expected,
            index,
            BreakKind::Truncated,
            format!("anchor records {} entries, found {index}", h.count),
        )),
        Some(h) if h.count > 0 && prev != h.last_hash => Ok(VerifyReport::broken(
            index,
            expected,
            h.count - 1,
            BreakKind::AnchorMismatch,
            format!("anchor records last hash {}, chain ends at {prev}", h.last_hash),
        )),
        None if index > 0 => Ok(VerifyReport::broken(
            index,
            expected,
            index,
            BreakKind::AnchorMissing,
            "ledger has entries but no head anchor",
        )),
        _ => Ok(VerifyReport::intact(index, expected)),
    }
}
