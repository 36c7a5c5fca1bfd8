//! Shared DTOs (schemas-as-code) for the redline workspace.
//!
//! # Design constraints
//! - These types are intended to be serialized to disk (plans, ledgers, layout documents).
//! - Be conservative with breaking changes.
//! - Prefer adding optional fields over changing semantics.

pub mod action;
pub mod apply;
pub mod document;
pub mod layout;
pub mod ledger;
pub mod plan;

/// Schema identifiers.
pub mod schema {
    pub const REDLINE_PLAN_V1: &str = "redline.plan.v1";
    pub const REDLINE_SEALED_PLAN_V1: &str = "redline.sealed_plan.v1";
    pub const REDLINE_LAYOUT_V1: &str = "redline.layout.v1";
    pub const REDLINE_LEDGER_HEAD_V1: &str = "redline.ledger_head.v1";
}
