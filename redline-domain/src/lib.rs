//! Domain logic: turn findings and a document snapshot into a deterministic plan.
//!
//! This crate owns *what* should be redacted or stamped and how that set is
//! identified. It does not own *how* edits are applied; that's the
//! `redline-edit` crate.

pub mod bates;
pub mod canonical;
pub mod detect;
mod error;
mod planner;
mod ports;

pub use bates::BatesConfig;
pub use detect::{Detector, EscalatingDetector, Finding, TermDetector};
pub use error::MalformedPlanError;
pub use planner::{PlanBuilder, validate_action};
pub use ports::{DocumentView, FsDocumentView, InMemoryDocumentView};
