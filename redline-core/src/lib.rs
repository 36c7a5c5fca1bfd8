//! Embeddable core library for redline.
//!
//! Provides a clap-free entry point suitable for linking into a larger host
//! process (a review UI, a production pipeline) as well as the `redline` CLI.
//!
//! # Port traits
//!
//! - [`FindingsSource`](ports::FindingsSource): load raw findings from an upstream detector
//! - [`WritePort`](ports::WritePort): write artifacts and create directories
//!
//! The [`adapters`] module provides default filesystem-backed implementations.
//!
//! # Entry points
//!
//! - [`run_plan`](pipeline::run_plan): build a plan for one document
//! - [`run_validate`](pipeline::run_validate): check a stored plan against its document
//! - [`run_apply`](pipeline::run_apply): apply one stored plan
//! - [`run_batch`](pipeline::run_batch): apply many plans on a worker pool
//!
//! Plan keys are passed explicitly into every call that reads or writes
//! plans; nothing here holds key material in global state.

pub mod adapters;
pub mod pipeline;
pub mod ports;
pub mod settings;
pub mod store;

// Re-export so embedders don't need the member crates directly.
pub use redline_domain::{BatesConfig, DocumentView, FsDocumentView};
pub use redline_ledger::AuditLedger;
pub use store::{PlanKey, StoreError};
