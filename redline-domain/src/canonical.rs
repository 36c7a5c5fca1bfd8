//! Canonical action ordering and content-derived plan ids.
//!
//! The canonical form of an action set is: duplicates on
//! `(kind, page, start, end, payload)` (plus `text` for redactions located by
//! text alone) collapsed to the highest-confidence instance (ties keep the
//! smallest `text`), then sorted by
//! `(page, start, kind)` with every remaining field breaking ties. Two action
//! sets with the same members always canonicalize to the same sequence.

use crate::error::MalformedPlanError;
use crate::planner::validate_action;
use redline_hash::{canonical_bytes, sha256_concat_hex};
use redline_types::action::Action;
use redline_types::plan::Plan;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Total order over actions.
pub fn canonical_cmp(a: &Action, b: &Action) -> Ordering {
    a.page
        .cmp(&b.page)
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| a.kind.cmp(&b.kind))
        .then_with(|| a.end.cmp(&b.end))
        .then_with(|| a.payload.cmp(&b.payload))
        .then_with(|| a.text.cmp(&b.text))
        .then_with(|| a.confidence.total_cmp(&b.confidence))
}

/// Whether `candidate` should replace `kept` among duplicates.
fn preferred(candidate: &Action, kept: &Action) -> bool {
    match candidate.confidence.total_cmp(&kept.confidence) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.text < kept.text,
    }
}

/// Deduplicate and sort.
pub fn canonicalize(actions: &[Action]) -> Vec<Action> {
    let mut best: BTreeMap<_, usize> = BTreeMap::new();
    for (idx, action) in actions.iter().enumerate() {
        match best.entry(action.dedup_key()) {
            Entry::Vacant(v) => {
                v.insert(idx);
            }
            Entry::Occupied(mut o) => {
                if preferred(action, &actions[*o.get()]) {
                    o.insert(idx);
                }
            }
        }
    }

    let mut out: Vec<Action> = best.into_values().map(|i| actions[i].clone()).collect();
    out.sort_by(canonical_cmp);
    out
}

/// `H(document_hash || canonical(actions) || canonical(annotations))`.
///
/// `actions` must already be canonical; this function does not reorder them.
pub fn compute_plan_id(
    document_hash: &str,
    actions: &[Action],
    annotations: &BTreeMap<String, Value>,
) -> Result<String, serde_json::Error> {
    let actions = canonical_bytes(actions)?;
    let annotations = canonical_bytes(annotations)?;
    Ok(sha256_concat_hex([
        document_hash.as_bytes(),
        actions.as_slice(),
        annotations.as_slice(),
    ]))
}

/// Re-check a stored plan: schema version, action structure, canonical order and `plan_id`.
pub fn verify_plan(plan: &Plan) -> Result<(), MalformedPlanError> {
    if plan.schema_version != redline_types::schema::REDLINE_PLAN_V1 {
        return Err(MalformedPlanError::Schema {
            found: plan.schema_version.clone(),
            expected: redline_types::schema::REDLINE_PLAN_V1.to_string(),
        });
    }

    for action in &plan.actions {
        validate_action(action, None)?;
    }

    let canonical = canonicalize(&plan.actions);
    if canonical.len() != plan.actions.len() {
        return Err(MalformedPlanError::NotCanonical(format!(
            "{} duplicate action(s)",
            plan.actions.len() - canonical.len()
        )));
    }
    if canonical != plan.actions {
        return Err(MalformedPlanError::NotCanonical(
            "actions are out of order".to_string(),
        ));
    }

    let recomputed = compute_plan_id(&plan.document_hash, &plan.actions, &plan.annotations)?;
    if recomputed != plan.plan_id {
        return Err(MalformedPlanError::PlanIdMismatch {
            recorded: plan.plan_id.clone(),
            recomputed,
        });
    }
    Ok(())
}
