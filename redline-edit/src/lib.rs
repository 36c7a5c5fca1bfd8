//! Apply engine for redline plans.
//!
//! Responsibilities:
//! - Gate every apply on the document's current content hash.
//! - Resolve redactions to page geometry and burn them into a working copy.
//! - Persist the artifact atomically and record one audit ledger entry.
//!
//! An apply moves through `Loaded → Verified → {Rejected | Applied} →
//! Persisted → Logged`. Nothing is left on disk unless it reaches `Logged`; an
//! artifact replaced on the way is restored.

mod burn;
mod error;
pub mod resolve;

pub use burn::{burn, stamp};
pub use error::ApplyError;
pub use resolve::{Resolution, resolve, resolve_in_document};

use camino::{Utf8Path, Utf8PathBuf};
use redline_domain::canonical::verify_plan;
use redline_hash::ContentAddresser;
use redline_ledger::lock::FileLock;
use redline_ledger::{Args, AuditLedger, durable};
use redline_types::action::{Action, ActionKind};
use redline_types::apply::{ApplyResult, SkippedAction, skip_tokens};
use redline_types::layout::LayoutDocument;
use redline_types::plan::Plan;
use serde_json::json;
use std::io::Read;
use tracing::{debug, info, warn};

/// Default distance of stamps from the page edges, in page units.
pub const DEFAULT_STAMP_MARGIN: f64 = 18.0;

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Proceed when the document hash no longer matches the plan.
    pub force: bool,
    /// Compute the result without writing an artifact or a ledger entry.
    pub preview: bool,
    /// Abort instead of skipping when a redaction cannot be located.
    pub strict_redactions: bool,
    pub stamp_margin: f64,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            force: false,
            preview: false,
            strict_redactions: false,
            stamp_margin: DEFAULT_STAMP_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyState {
    Loaded,
    Verified,
    Rejected,
    Applied,
    Persisted,
    Logged,
}

fn enter(state: ApplyState, plan_id: &str) {
    debug!(plan_id = %plan_id, state = ?state, "apply state");
}

/// Apply `plan` to the document at `document_path`, writing the result to `output_path`.
///
/// The source document is held under an exclusive advisory lock for the whole
/// call and is never modified.
pub fn apply_plan(
    plan: &Plan,
    document_path: &Utf8Path,
    output_path: &Utf8Path,
    ledger: &AuditLedger,
    opts: &ApplyOptions,
) -> Result<ApplyResult, ApplyError> {
    verify_plan(plan)?;
    if !opts.preview && is_same_file(document_path, output_path) {
        return Err(ApplyError::OutputIsSource(output_path.to_string()));
    }

    let lock = FileLock::exclusive_on(document_path)
        .map_err(|e| ApplyError::io(format!("lock {document_path}"), e))?;
    let mut bytes = Vec::new();
    lock.file()
        .read_to_end(&mut bytes)
        .map_err(|e| ApplyError::io(format!("read {document_path}"), e))?;
    enter(ApplyState::Loaded, &plan.plan_id);

    let input_hash = ContentAddresser.hash_bytes(&bytes);
    let overridden = input_hash != plan.document_hash;
    if overridden {
        if !opts.force {
            enter(ApplyState::Rejected, &plan.plan_id);
            return Err(ApplyError::Integrity {
                path: document_path.to_string(),
                expected: plan.document_hash.clone(),
                actual: input_hash,
            });
        }
        warn!(
            plan_id = %plan.plan_id,
            document = %document_path,
            expected = %plan.document_hash,
            actual = %input_hash,
            "document changed since planning; applying anyway (forced)"
        );
    }
    enter(ApplyState::Verified, &plan.plan_id);

    let original =
        LayoutDocument::from_slice(&bytes).map_err(|e| ApplyError::UnsupportedDocument {
            path: document_path.to_string(),
            message: e.to_string(),
        })?;

    let outcome = execute(plan, &original, opts)?;
    let out_bytes = outcome
        .document
        .to_bytes()
        .map_err(|e| ApplyError::io("serialize artifact", e.into()))?;
    let output_hash = ContentAddresser.hash_bytes(&out_bytes);
    enter(ApplyState::Applied, &plan.plan_id);

    let mut result = ApplyResult {
        plan_id: plan.plan_id.clone(),
        document_path: document_path.to_path_buf(),
        output_path: None,
        input_hash,
        output_hash,
        applied_count: outcome.applied,
        skipped: outcome.skipped,
        overridden,
        preview: opts.preview,
        ledger_seq: None,
    };
    if opts.preview {
        return Ok(result);
    }

    let replacement = durable::replace_atomic(output_path, &out_bytes)
        .map_err(|e| ApplyError::io(format!("write {output_path}"), e))?;
    result.output_path = Some(output_path.to_path_buf());
    enter(ApplyState::Persisted, &plan.plan_id);

    let entry = match ledger.append(
        "apply",
        vec![document_path.to_string()],
        vec![output_path.to_string()],
        ledger_args(plan, &result),
    ) {
        Ok(entry) => {
            replacement.keep();
            entry
        }
        Err(e) => {
            if let Err(undo) = replacement.undo() {
                warn!(output = %output_path, error = %undo, "could not roll back unlogged artifact");
            }
            return Err(e.into());
        }
    };
    result.ledger_seq = Some(entry.seq);
    enter(ApplyState::Logged, &plan.plan_id);
    drop(lock);

    info!(
        plan_id = %plan.plan_id,
        output = %output_path,
        applied = result.applied_count,
        skipped = result.skipped.len(),
        "artifact persisted"
    );
    Ok(result)
}

/// Whether writing `output_path` would replace the document, however either
/// path is spelled (`..` segments, relative vs absolute, symlinked directories).
fn is_same_file(document_path: &Utf8Path, output_path: &Utf8Path) -> bool {
    let Some(output) = resolve_entry(output_path) else {
        return false;
    };
    resolve_entry(document_path).is_some_and(|doc| doc == output)
        || document_path
            .canonicalize_utf8()
            .is_ok_and(|doc| doc == output)
}

/// `path` with its directory canonicalized and its final component kept, so a
/// symlink at `path` itself is not followed. `None` when the directory does not exist.
fn resolve_entry(path: &Utf8Path) -> Option<Utf8PathBuf> {
    let name = path.file_name()?;
    let dir = match path.parent() {
        Some(p) if !p.as_str().is_empty() => p,
        _ => Utf8Path::new("."),
    };
    dir.canonicalize_utf8().ok().map(|dir| dir.join(name))
}

struct Outcome {
    document: LayoutDocument,
    applied: u64,
    skipped: Vec<SkippedAction>,
}

/// Resolve every action against the original, then mutate a working copy.
fn execute(
    plan: &Plan,
    original: &LayoutDocument,
    opts: &ApplyOptions,
) -> Result<Outcome, ApplyError> {
    let mut working = original.clone();
    let mut applied = 0u64;
    let mut skipped = Vec::new();
    let mut misses = Vec::new();

    // Stamps are placed after the redactions so they are never burned.
    let mut stamps: Vec<(u32, &Action)> = Vec::new();
    let mut burns = Vec::new();

    for action in &plan.actions {
        if let Some(page) = action.page
            && page >= original.page_count()
        {
            warn!(
                plan_id = %plan.plan_id,
                action = %action.label(),
                page_count = original.page_count(),
                "action targets a missing page; skipping"
            );
            skipped.push(skip(
                action,
                format!("page {page} does not exist"),
                skip_tokens::PAGE_MISSING,
            ));
            continue;
        }

        match action.kind {
            ActionKind::Stamp => {
                if let Some(page) = action.page {
                    stamps.push((page, action));
                }
            }
            ActionKind::Redact => match resolve_in_document(original, action) {
                Some(found) => burns.push((found, action)),
                None => {
                    warn!(
                        plan_id = %plan.plan_id,
                        action = %action.label(),
                        "redaction could not be located"
                    );
                    misses.push(action.label());
                    skipped.push(skip(
                        action,
                        "no geometry found for offsets or text".to_string(),
                        skip_tokens::RESOLUTION_MISS,
                    ));
                }
            },
        }
    }

    if opts.strict_redactions && !misses.is_empty() {
        return Err(ApplyError::ResolutionMiss { actions: misses });
    }

    for (found, action) in burns {
        let page = &mut working.pages[found.page as usize];
        let glyphs = burn(page, &found.rects, &action.payload);
        debug!(action = %action.label(), page = found.page, glyphs, "redaction burned");
        applied += 1;
    }
    for (page, action) in stamps {
        stamp(&mut working.pages[page as usize], &action.payload, opts.stamp_margin);
        applied += 1;
    }

    Ok(Outcome {
        document: working,
        applied,
        skipped,
    })
}

fn skip(action: &Action, reason: String, token: &str) -> SkippedAction {
    SkippedAction {
        action: action.clone(),
        reason,
        reason_token: token.to_string(),
    }
}

fn ledger_args(plan: &Plan, result: &ApplyResult) -> Args {
    let skipped: Vec<_> = result
        .skipped
        .iter()
        .map(|s| json!({ "action": s.action.label(), "reason_token": s.reason_token }))
        .collect();

    let mut args = Args::new();
    args.insert("plan_id".into(), json!(plan.plan_id));
    args.insert("expected_hash".into(), json!(plan.document_hash));
    args.insert("input_hash".into(), json!(result.input_hash));
    args.insert("output_hash".into(), json!(result.output_hash));
    args.insert("applied_count".into(), json!(result.applied_count));
    args.insert("skipped".into(), json!(skipped));
    args.insert("overridden".into(), json!(result.overridden));
    args
}
