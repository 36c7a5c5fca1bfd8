use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use fs_err as fs;
use redline_cli::config::{self, BatesArgs, ConfigMerger};
use redline_core::adapters::{FsFindingsSource, FsWritePort};
use redline_core::pipeline::{
    CancelToken, JobStatus, exit_code_for, run_apply, run_batch, run_plan, run_validate,
    run_verify, write_plan_artifacts,
};
use redline_core::settings::{ApplySettings, BatchSettings, PlanSettings};
use redline_core::{AuditLedger, PlanKey};
use redline_domain::PlanBuilder;
use redline_render::render_verify_md;
use std::collections::BTreeMap;
use std::io::Write;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "redline",
    version,
    about = "Hash-gated Bates stamping and redaction with a tamper-evident audit ledger."
)]
struct Cli {
    /// Audit ledger path (default: from redline.toml, then redline-ledger.jsonl).
    #[arg(long, global = true)]
    ledger: Option<Utf8PathBuf>,

    /// File holding the hex-encoded 32-byte key for sealed plans.
    #[arg(long, global = true, env = "REDLINE_PLAN_KEY_FILE")]
    plan_key_file: Option<Utf8PathBuf>,

    /// Config file (default: redline.toml in the current directory, if present).
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a plan of stamps and redactions for one document snapshot.
    Plan(PlanArgs),

    /// Check that a plan is intact and its document is unchanged (exit 1 if changed).
    Validate(ValidateArgs),

    /// Apply a plan, writing the result into an output directory.
    Apply(ApplyArgs),

    /// Apply many plans concurrently.
    Batch(BatchArgs),

    /// Verify the audit ledger's hash chain (exit 2 on a break).
    VerifyLedger,

    /// Generate a random plan key and write it, hex-encoded, to a new file.
    Keygen(KeygenArgs),
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// Layout document to plan against.
    document: Utf8PathBuf,

    /// Where to write the plan.
    #[arg(long)]
    output: Utf8PathBuf,

    /// JSON array of actions produced by an upstream detector.
    #[arg(long)]
    findings: Option<Utf8PathBuf>,

    /// Literal text to redact wherever it occurs (repeatable).
    #[arg(long = "term")]
    terms: Vec<String>,

    /// Replacement label for term redactions.
    #[arg(long)]
    payload: Option<String>,

    #[arg(long)]
    bates_prefix: Option<String>,

    #[arg(long)]
    bates_start: Option<u64>,

    #[arg(long)]
    bates_width: Option<usize>,

    /// Plan annotation as key=value (repeatable). Covered by the plan id.
    #[arg(long = "annotate")]
    annotations: Vec<String>,

    /// Encrypt the plan at rest with the plan key.
    #[arg(long)]
    seal: bool,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    plan: Utf8PathBuf,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    plan: Utf8PathBuf,

    out_dir: Utf8PathBuf,

    /// Apply even though the document changed since planning. Recorded in the ledger.
    #[arg(long)]
    force: bool,

    /// Report what would happen without writing anything.
    #[arg(long)]
    preview: bool,

    /// Fail instead of skipping redactions that cannot be located.
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct BatchArgs {
    out_dir: Utf8PathBuf,

    #[arg(required = true)]
    plans: Vec<Utf8PathBuf>,

    /// Worker threads.
    #[arg(long)]
    jobs: Option<usize>,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct KeygenArgs {
    path: Utf8PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match real_main() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn real_main() -> anyhow::Result<u8> {
    let cli = Cli::parse();

    let cwd = Utf8PathBuf::from(".");
    let file_config = config::load_or_default(cli.config.as_deref(), &cwd)
        .context("load redline.toml config")?;
    let merger = ConfigMerger::new(file_config);

    let ledger_path = merger.ledger_path(cli.ledger.as_deref());
    let key = match merger.key_file(cli.plan_key_file.as_deref()) {
        Some(path) => Some(PlanKey::load(&path).with_context(|| format!("load plan key {path}"))?),
        None => None,
    };
    debug!(ledger = %ledger_path, sealed_plans = key.is_some(), "configuration resolved");

    match cli.cmd {
        Command::Plan(args) => cmd_plan(args, &merger, ledger_path, key.as_ref()),
        Command::Validate(args) => cmd_validate(args, key.as_ref()),
        Command::Apply(args) => cmd_apply(args, &merger, ledger_path, key.as_ref()),
        Command::Batch(args) => cmd_batch(args, &merger, ledger_path, key.as_ref()),
        Command::VerifyLedger => cmd_verify_ledger(&ledger_path),
        Command::Keygen(args) => cmd_keygen(args),
    }
}

fn cmd_plan(
    args: PlanArgs,
    merger: &ConfigMerger,
    ledger_path: Utf8PathBuf,
    key: Option<&PlanKey>,
) -> anyhow::Result<u8> {
    let mut annotations = BTreeMap::new();
    for entry in &args.annotations {
        let (k, v) = config::parse_annotation(entry)?;
        annotations.insert(k, v);
    }

    let bates = merger.bates(&BatesArgs {
        prefix: args.bates_prefix,
        start: args.bates_start,
        width: args.bates_width,
    });

    let settings = PlanSettings {
        document: args.document,
        output: args.output,
        ledger_path,
        terms: args.terms,
        payload: merger.payload(args.payload.as_deref()),
        bates,
        annotations,
        seal: args.seal,
    };

    let findings = FsFindingsSource::new(args.findings);
    let builder = PlanBuilder::new();
    let outcome = run_plan(&settings, &findings, &builder)?;

    let ledger = open_ledger(&settings.ledger_path)?;
    let entry = write_plan_artifacts(&outcome, &settings, key, &FsWritePort, &ledger)?;
    info!(
        plan_id = %outcome.plan.plan_id,
        output = %settings.output,
        ledger_seq = entry.seq,
        "plan written"
    );

    if !settings.seal {
        print!("{}", outcome.markdown);
    }
    println!("{}", outcome.plan.plan_id);
    Ok(0)
}

fn cmd_validate(args: ValidateArgs, key: Option<&PlanKey>) -> anyhow::Result<u8> {
    let outcome = run_validate(&args.plan, key, &PlanBuilder::new())?;
    if outcome.matches() {
        println!("ok {} {}", outcome.plan_id, outcome.document);
        Ok(0)
    } else {
        println!(
            "mismatch {}: expected {}, found {}",
            outcome.document, outcome.expected_hash, outcome.actual_hash
        );
        Ok(1)
    }
}

fn cmd_apply(
    args: ApplyArgs,
    merger: &ConfigMerger,
    ledger_path: Utf8PathBuf,
    key: Option<&PlanKey>,
) -> anyhow::Result<u8> {
    let settings = ApplySettings {
        plan_path: args.plan,
        out_dir: args.out_dir,
        ledger_path,
        force: args.force,
        preview: args.preview,
        strict_redactions: merger.strict_redactions(args.strict),
        stamp_margin: merger.stamp_margin(),
    };
    let ledger = if settings.preview {
        AuditLedger::open(settings.ledger_path.clone())
    } else {
        open_ledger(&settings.ledger_path)?
    };

    let outcome = run_apply(&settings, key, &FsWritePort, &ledger)?;
    print!("{}", outcome.markdown);
    Ok(0)
}

fn cmd_batch(
    args: BatchArgs,
    merger: &ConfigMerger,
    ledger_path: Utf8PathBuf,
    key: Option<&PlanKey>,
) -> anyhow::Result<u8> {
    let settings = BatchSettings {
        plan_paths: args.plans,
        out_dir: args.out_dir,
        ledger_path,
        jobs: merger.jobs(args.jobs),
        force: args.force,
        strict_redactions: merger.strict_redactions(args.strict),
        stamp_margin: merger.stamp_margin(),
    };
    let ledger = open_ledger(&settings.ledger_path)?;

    let outcome = run_batch(&settings, key, &FsWritePort, &ledger, &CancelToken::new());

    let mut out = std::io::stdout().lock();
    for job in &outcome.jobs {
        match &job.status {
            JobStatus::Applied(result) => writeln!(
                out,
                "applied {} -> {} ({} applied, {} skipped)",
                job.plan_path,
                result
                    .output_path
                    .as_ref()
                    .map(|p| p.as_str())
                    .unwrap_or("-"),
                result.applied_count,
                result.skipped.len()
            )?,
            JobStatus::Failed { message, exit_code } => {
                writeln!(out, "failed {} (exit {}): {}", job.plan_path, exit_code, message)?
            }
            JobStatus::Cancelled => writeln!(out, "cancelled {}", job.plan_path)?,
        }
    }
    writeln!(
        out,
        "{} applied, {} failed, {} cancelled",
        outcome.applied(),
        outcome.failed(),
        outcome.cancelled()
    )?;
    Ok(outcome.exit_code())
}

fn cmd_verify_ledger(ledger_path: &Utf8Path) -> anyhow::Result<u8> {
    let ledger = AuditLedger::open(ledger_path.to_path_buf());
    let report = run_verify(&ledger)?;
    print!("{}", render_verify_md(&report));
    Ok(if report.ok { 0 } else { 2 })
}

fn cmd_keygen(args: KeygenArgs) -> anyhow::Result<u8> {
    let key = PlanKey::generate();
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&args.path)
        .with_context(|| format!("create key file {}", args.path))?;
    writeln!(file, "{}", key.to_hex())?;
    file.sync_all()?;
    info!(path = %args.path, "plan key written");
    Ok(0)
}

/// Open the ledger for appending, creating its directory if needed.
fn open_ledger(path: &Utf8Path) -> anyhow::Result<AuditLedger> {
    if let Some(parent) = path.parent()
        && !parent.as_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create ledger directory {}", parent))?;
    }
    Ok(AuditLedger::open(path.to_path_buf()))
}
