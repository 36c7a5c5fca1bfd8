//! Core plan, validate, apply and batch pipelines, extracted from the CLI.
//!
//! Document reads go through [`DocumentView`](redline_domain::DocumentView),
//! findings through [`FindingsSource`] and artifact writes through
//! [`WritePort`]. Errors are `anyhow` chains that keep the typed error of the
//! failing layer; [`exit_code_for`] maps them to process exit codes.

use crate::ports::{FindingsSource, WritePort};
use crate::settings::{ApplySettings, BatchSettings, PlanSettings};
use crate::store::{self, PlanKey, StoreError};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use redline_domain::canonical::verify_plan;
use redline_domain::detect::detect_actions;
use redline_domain::{MalformedPlanError, PlanBuilder, TermDetector, bates};
use redline_edit::{ApplyError, ApplyOptions, apply_plan};
use redline_hash::ContentAddresser;
use redline_ledger::{Args, AuditLedger, ChainBreakError, LedgerError, VerifyReport};
use redline_render::{render_apply_md, render_plan_md};
use redline_types::apply::ApplyResult;
use redline_types::layout::LayoutDocument;
use redline_types::ledger::LedgerEntry;
use redline_types::plan::Plan;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Map an error chain to the process exit code of the layer that failed.
///
/// `0` success, `1` integrity rejection, `2` malformed plan or ledger, `3` I/O.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ApplyError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<MalformedPlanError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<StoreError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<LedgerError>() {
            return e.exit_code();
        }
        if cause.downcast_ref::<ChainBreakError>().is_some() {
            return 2;
        }
    }
    3
}

/// Outcome of `run_plan`.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Plan,
    pub markdown: String,
}

/// Build a plan for `settings.document` from external findings, literal
/// terms and Bates numbering. Nothing is written; see [`write_plan_artifacts`].
pub fn run_plan(
    settings: &PlanSettings,
    findings: &dyn FindingsSource,
    builder: &PlanBuilder,
) -> anyhow::Result<PlanOutcome> {
    let document = settings.document.as_path();
    let bytes = builder
        .view()
        .read(document)
        .map_err(|e| MalformedPlanError::UnreadableDocument {
            path: document.to_string(),
            message: format!("{e:#}"),
        })?;
    let document_hash = ContentAddresser.hash_bytes(&bytes);

    let mut raw = findings.load_findings().context("load findings")?;

    let needs_layout = !settings.terms.is_empty() || settings.bates.is_some();
    if needs_layout {
        let layout =
            LayoutDocument::from_slice(&bytes).map_err(|e| MalformedPlanError::NotLayout {
                path: document.to_string(),
                message: e.to_string(),
            })?;

        let terms = TermDetector::new(settings.terms.clone(), settings.payload.clone());
        if !terms.is_empty() {
            raw.extend(detect_actions(&layout, &terms, Some(&settings.payload)));
        }
        if let Some(cfg) = &settings.bates {
            raw.extend(bates::assign(layout.page_count(), cfg));
        }
    }

    let plan = builder.build_plan(
        document,
        &document_hash,
        &raw,
        settings.annotations.clone(),
    )?;
    info!(
        plan_id = %plan.plan_id,
        document = %document,
        actions = plan.actions.len(),
        "plan built"
    );

    let markdown = render_plan_md(&plan);
    Ok(PlanOutcome { plan, markdown })
}

/// Persist the plan (and, when unsealed, its markdown summary) and log a
/// `plan` ledger entry. On ledger failure the written files are removed.
pub fn write_plan_artifacts(
    outcome: &PlanOutcome,
    settings: &PlanSettings,
    key: Option<&PlanKey>,
    writer: &dyn WritePort,
    ledger: &AuditLedger,
) -> anyhow::Result<LedgerEntry> {
    let seal_key = match (settings.seal, key) {
        (true, Some(k)) => Some(k),
        (true, None) => {
            return Err(StoreError::Key("sealing requires a plan key".to_string()).into());
        }
        (false, _) => None,
    };

    store::write_plan(writer, &settings.output, &outcome.plan, seal_key)?;
    let mut written = vec![settings.output.clone()];

    // A readable summary would defeat sealing.
    if seal_key.is_none() {
        let md_path = settings.output.with_extension("md");
        if md_path != settings.output {
            writer.write_file(&md_path, outcome.markdown.as_bytes())?;
            written.push(md_path);
        }
    }

    let mut args = Args::new();
    args.insert("plan_id".into(), json!(outcome.plan.plan_id));
    args.insert("document_hash".into(), json!(outcome.plan.document_hash));
    args.insert("actions".into(), json!(outcome.plan.actions.len()));
    args.insert("sealed".into(), json!(seal_key.is_some()));

    match ledger.append(
        "plan",
        vec![outcome.plan.document_path.to_string()],
        vec![settings.output.to_string()],
        args,
    ) {
        Ok(entry) => Ok(entry),
        Err(e) => {
            for path in &written {
                if let Err(rm) = writer.remove_file(path) {
                    warn!(path = %path, error = %rm, "could not remove unlogged plan artifact");
                }
            }
            Err(anyhow::Error::new(e).context("record plan in ledger"))
        }
    }
}

/// Outcome of `run_validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateOutcome {
    pub plan_id: String,
    pub document: Utf8PathBuf,
    pub expected_hash: String,
    pub actual_hash: String,
}

impl ValidateOutcome {
    pub fn matches(&self) -> bool {
        self.expected_hash == self.actual_hash
    }
}

/// Check a stored plan's integrity and whether its document is unchanged.
pub fn run_validate(
    plan_path: &Utf8Path,
    key: Option<&PlanKey>,
    builder: &PlanBuilder,
) -> anyhow::Result<ValidateOutcome> {
    let plan = store::read_plan(plan_path, key).with_context(|| format!("read plan {plan_path}"))?;
    verify_plan(&plan)?;

    let bytes = builder
        .view()
        .read(&plan.document_path)
        .with_context(|| format!("read document {}", plan.document_path))?;
    let snapshot = ContentAddresser.snapshot_bytes(&plan.document_path, &bytes);
    let outcome = ValidateOutcome {
        plan_id: plan.plan_id,
        document: snapshot.path,
        expected_hash: plan.document_hash,
        actual_hash: snapshot.content_hash,
    };
    debug!(plan_id = %outcome.plan_id, matches = outcome.matches(), "plan validated");
    Ok(outcome)
}

/// Outcome of `run_apply`.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub result: ApplyResult,
    pub markdown: String,
}

/// Apply one stored plan, writing `<out_dir>/<document file name>`.
pub fn run_apply(
    settings: &ApplySettings,
    key: Option<&PlanKey>,
    writer: &dyn WritePort,
    ledger: &AuditLedger,
) -> anyhow::Result<ApplyOutcome> {
    let plan = store::read_plan(&settings.plan_path, key)
        .with_context(|| format!("read plan {}", settings.plan_path))?;

    let file_name = plan.document_path.file_name().unwrap_or("document.json");
    let output_path = settings.out_dir.join(file_name);
    if !settings.preview {
        writer.create_dir_all(&settings.out_dir)?;
    }

    let opts = ApplyOptions {
        force: settings.force,
        preview: settings.preview,
        strict_redactions: settings.strict_redactions,
        stamp_margin: settings.stamp_margin,
    };
    let result = apply_plan(&plan, &plan.document_path, &output_path, ledger, &opts)
        .with_context(|| format!("apply plan {}", settings.plan_path))?;

    let markdown = render_apply_md(&result);
    Ok(ApplyOutcome { result, markdown })
}

/// Cooperative cancellation for batch runs, checked between documents only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum JobStatus {
    Applied(Box<ApplyResult>),
    Failed { message: String, exit_code: u8 },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub plan_path: Utf8PathBuf,
    pub status: JobStatus,
}

/// Outcome of `run_batch`, one report per plan in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub jobs: Vec<JobReport>,
}

impl BatchOutcome {
    pub fn applied(&self) -> usize {
        self.count(|s| matches!(s, JobStatus::Applied(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, JobStatus::Failed { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|s| matches!(s, JobStatus::Cancelled))
    }

    /// The most severe failure's exit code, or 0.
    pub fn exit_code(&self) -> u8 {
        self.jobs
            .iter()
            .filter_map(|j| match j.status {
                JobStatus::Failed { exit_code, .. } => Some(exit_code),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    fn count(&self, pred: impl Fn(&JobStatus) -> bool) -> usize {
        self.jobs.iter().filter(|j| pred(&j.status)).count()
    }
}

/// Apply many plans on a fixed pool of scoped worker threads.
///
/// Workers pull from a shared queue. `cancel` is checked before each job is
/// started; a job that has started always runs to completion. Plans for the
/// same document serialize on that document's lock.
pub fn run_batch(
    settings: &BatchSettings,
    key: Option<&PlanKey>,
    writer: &(dyn WritePort + Sync),
    ledger: &AuditLedger,
    cancel: &CancelToken,
) -> BatchOutcome {
    let total = settings.plan_paths.len();
    let workers = settings.jobs.clamp(1, total.max(1));
    let queue: Mutex<VecDeque<(usize, Utf8PathBuf)>> =
        Mutex::new(settings.plan_paths.iter().cloned().enumerate().collect());
    let slots: Mutex<Vec<Option<JobStatus>>> = Mutex::new(vec![None; total]);

    debug!(jobs = total, workers, "batch started");
    std::thread::scope(|s| {
        for worker in 0..workers {
            let queue = &queue;
            let slots = &slots;
            s.spawn(move || {
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some((index, plan_path)) = next else {
                        break;
                    };

                    let status = if cancel.is_cancelled() {
                        JobStatus::Cancelled
                    } else {
                        debug!(worker, plan = %plan_path, "job started");
                        match run_apply(&settings.for_plan(plan_path), key, writer, ledger) {
                            Ok(outcome) => JobStatus::Applied(Box::new(outcome.result)),
                            Err(e) => {
                                warn!(worker, error = %format!("{e:#}"), "job failed");
                                JobStatus::Failed {
                                    message: format!("{e:#}"),
                                    exit_code: exit_code_for(&e),
                                }
                            }
                        }
                    };
                    slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(status);
                }
            });
        }
    });

    let slots = slots.into_inner().unwrap_or_else(PoisonError::into_inner);
    let jobs = settings
        .plan_paths
        .iter()
        .zip(slots)
        .map(|(plan_path, status)| JobReport {
            plan_path: plan_path.clone(),
            status: status.unwrap_or(JobStatus::Cancelled),
        })
        .collect();

    let outcome = BatchOutcome { jobs };
    info!(
        applied = outcome.applied(),
        failed = outcome.failed(),
        cancelled = outcome.cancelled(),
        "batch finished"
    );
    outcome
}

/// Verify the whole ledger chain.
pub fn run_verify(ledger: &AuditLedger) -> anyhow::Result<VerifyReport> {
    ledger
        .verify()
        .with_context(|| format!("verify ledger {}", ledger.path()))
}
