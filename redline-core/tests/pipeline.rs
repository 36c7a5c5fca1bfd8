//! Pipeline tests over real temp directories.

use camino::{Utf8Path, Utf8PathBuf};
use pretty_assertions::assert_eq;
use redline_core::adapters::{FsWritePort, InMemoryFindingsSource};
use redline_core::pipeline::{
    CancelToken, JobStatus, exit_code_for, run_apply, run_batch, run_plan, run_validate,
    run_verify, write_plan_artifacts,
};
use redline_core::settings::{ApplySettings, BatchSettings, PlanSettings};
use redline_core::{AuditLedger, BatesConfig, PlanKey, store};
use redline_domain::PlanBuilder;
use redline_types::action::{Action, ActionKind};
use redline_types::layout::{LayoutDocument, Page, Rect, TextRun};
use tempfile::TempDir;

struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
    ledger: AuditLedger,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let ledger = AuditLedger::open(root.join("ledger.jsonl"));
        Self {
            _dir: dir,
            root,
            ledger,
        }
    }

    fn document(&self, name: &str, texts: &[&str]) -> Utf8PathBuf {
        let pages = texts
            .iter()
            .map(|t| {
                Page::new(
                    612.0,
                    792.0,
                    vec![TextRun::new(*t, Rect::new(72.0, 700.0, 472.0, 712.0))],
                )
            })
            .collect();
        let path = self.root.join(name);
        std::fs::write(&path, LayoutDocument::new(pages).to_bytes().unwrap()).unwrap();
        path
    }

    fn plan_settings(&self, doc: &Utf8Path, output: &str) -> PlanSettings {
        PlanSettings {
            document: doc.to_path_buf(),
            output: self.root.join(output),
            ledger_path: self.ledger.path().to_path_buf(),
            ..PlanSettings::default()
        }
    }

    fn plan(&self, settings: &PlanSettings, key: Option<&PlanKey>) {
        let outcome = run_plan(
            settings,
            &InMemoryFindingsSource::default(),
            &PlanBuilder::new(),
        )
        .unwrap();
        write_plan_artifacts(&outcome, settings, key, &FsWritePort, &self.ledger).unwrap();
    }

    fn apply_settings(&self, plan: &Utf8Path) -> ApplySettings {
        ApplySettings {
            plan_path: plan.to_path_buf(),
            out_dir: self.root.join("out"),
            ledger_path: self.ledger.path().to_path_buf(),
            ..ApplySettings::default()
        }
    }
}

#[test]
fn plan_validate_apply_round() {
    let ws = Workspace::new();
    let doc = ws.document("memo.json", &["SSN: 123-45-6789", "call Jane"]);
    let mut settings = ws.plan_settings(&doc, "memo.plan.json");
    settings.terms = vec!["123-45-6789".into(), "Jane".into()];
    settings.bates = Some(BatesConfig {
        prefix: "ABC".into(),
        start: 1,
        width: 6,
    });

    let outcome = run_plan(
        &settings,
        &InMemoryFindingsSource::new(vec![Action::redact_span(0, 0, 3, "SSN", "[LABEL]")]),
        &PlanBuilder::new(),
    )
    .unwrap();
    assert_eq!(outcome.plan.count_kind(ActionKind::Stamp), 2);
    assert_eq!(outcome.plan.count_kind(ActionKind::Redact), 3);
    assert!(outcome.markdown.contains(&outcome.plan.plan_id));

    let entry =
        write_plan_artifacts(&outcome, &settings, None, &FsWritePort, &ws.ledger).unwrap();
    assert_eq!(entry.operation, "plan");
    assert!(ws.root.join("memo.plan.md").exists());

    let validated = run_validate(&settings.output, None, &PlanBuilder::new()).unwrap();
    assert!(validated.matches());
    assert_eq!(validated.plan_id, outcome.plan.plan_id);

    let applied = run_apply(
        &ws.apply_settings(&settings.output),
        None,
        &FsWritePort,
        &ws.ledger,
    )
    .unwrap();
    assert_eq!(applied.result.applied_count, 5);
    let out = ws.root.join("out/memo.json");
    let burned = LayoutDocument::from_slice(&std::fs::read(&out).unwrap()).unwrap();
    assert!(!burned.text().contains("123-45-6789"));
    assert!(!burned.text().contains("Jane"));
    assert_eq!(burned.pages[1].stamps[0].text, "ABC000002");

    let report = run_verify(&ws.ledger).unwrap();
    assert!(report.ok);
    assert_eq!(report.entries_checked, 2);
}

#[test]
fn validate_detects_drift() {
    let ws = Workspace::new();
    let doc = ws.document("a.json", &["hello"]);
    let settings = ws.plan_settings(&doc, "a.plan.json");
    ws.plan(&settings, None);

    ws.document("a.json", &["hello!"]);
    let validated = run_validate(&settings.output, None, &PlanBuilder::new()).unwrap();
    assert!(!validated.matches());

    let err = run_apply(
        &ws.apply_settings(&settings.output),
        None,
        &FsWritePort,
        &ws.ledger,
    )
    .unwrap_err();
    assert_eq!(exit_code_for(&err), 1);
    assert!(!ws.root.join("out/a.json").exists());
}

#[test]
fn sealed_plans_need_their_key() {
    let ws = Workspace::new();
    let doc = ws.document("s.json", &["SSN: 123-45-6789"]);
    let mut settings = ws.plan_settings(&doc, "s.plan.json");
    settings.terms = vec!["123-45-6789".into()];
    settings.seal = true;

    let key = PlanKey::generate();
    ws.plan(&settings, Some(&key));
    let raw = std::fs::read_to_string(&settings.output).unwrap();
    assert!(!raw.contains("123-45-6789"));
    assert!(!ws.root.join("s.plan.md").exists());

    let err = run_validate(&settings.output, None, &PlanBuilder::new()).unwrap_err();
    assert_eq!(exit_code_for(&err), 2);
    assert!(run_validate(&settings.output, Some(&key), &PlanBuilder::new())
        .unwrap()
        .matches());
    assert_eq!(
        store::read_plan(&settings.output, Some(&key)).unwrap().actions.len(),
        1
    );
}

#[test]
fn sealing_without_key_is_refused_before_writing() {
    let ws = Workspace::new();
    let doc = ws.document("s.json", &["x"]);
    let mut settings = ws.plan_settings(&doc, "s.plan.json");
    settings.seal = true;
    let outcome = run_plan(
        &settings,
        &InMemoryFindingsSource::default(),
        &PlanBuilder::new(),
    )
    .unwrap();
    let err = write_plan_artifacts(&outcome, &settings, None, &FsWritePort, &ws.ledger)
        .unwrap_err();
    assert_eq!(exit_code_for(&err), 2);
    assert!(!settings.output.exists());
}

#[test]
fn unreadable_document_is_malformed() {
    let ws = Workspace::new();
    let settings = ws.plan_settings(&ws.root.join("missing.json"), "m.plan.json");
    let err = run_plan(
        &settings,
        &InMemoryFindingsSource::default(),
        &PlanBuilder::new(),
    )
    .unwrap_err();
    assert_eq!(exit_code_for(&err), 2);
}

#[test]
fn batch_applies_in_parallel_and_reports_in_order() {
    let ws = Workspace::new();
    let mut plans = Vec::new();
    for i in 0..6 {
        let doc = ws.document(&format!("d{i}.json"), &[format!("secret {i}").as_str()]);
        let mut settings = ws.plan_settings(&doc, &format!("d{i}.plan.json"));
        settings.terms = vec!["secret".into()];
        ws.plan(&settings, None);
        plans.push(settings.output);
    }
    // One broken plan in the middle.
    std::fs::write(&plans[3], "{").unwrap();

    let settings = BatchSettings {
        plan_paths: plans.clone(),
        out_dir: ws.root.join("out"),
        ledger_path: ws.ledger.path().to_path_buf(),
        jobs: 3,
        ..BatchSettings::default()
    };
    let outcome = run_batch(&settings, None, &FsWritePort, &ws.ledger, &CancelToken::new());

    assert_eq!(outcome.applied(), 5);
    assert_eq!(outcome.failed(), 1);
    assert_eq!(outcome.exit_code(), 2);
    let order: Vec<&Utf8PathBuf> = outcome.jobs.iter().map(|j| &j.plan_path).collect();
    assert_eq!(order, plans.iter().collect::<Vec<_>>());
    assert!(matches!(outcome.jobs[3].status, JobStatus::Failed { .. }));

    let report = ws.ledger.verify().unwrap();
    assert!(report.ok);
    assert_eq!(report.entries_checked, 6 + 5);
}

#[test]
fn cancelled_batch_starts_nothing() {
    let ws = Workspace::new();
    let doc = ws.document("c.json", &["x"]);
    let settings = ws.plan_settings(&doc, "c.plan.json");
    ws.plan(&settings, None);

    let cancel = CancelToken::new();
    cancel.cancel();
    let batch = BatchSettings {
        plan_paths: vec![settings.output.clone(), settings.output],
        out_dir: ws.root.join("out"),
        ledger_path: ws.ledger.path().to_path_buf(),
        ..BatchSettings::default()
    };
    let outcome = run_batch(&batch, None, &FsWritePort, &ws.ledger, &cancel);
    assert_eq!(outcome.cancelled(), 2);
    assert_eq!(outcome.exit_code(), 0);
    assert!(!ws.root.join("out/c.json").exists());
}

#[test]
fn ledger_failure_removes_plan_artifacts() {
    let ws = Workspace::new();
    let doc = ws.document("l.json", &["x"]);
    let settings = ws.plan_settings(&doc, "l.plan.json");
    let blocked = ws.root.join("blocked.jsonl");
    std::fs::create_dir(&blocked).unwrap();

    let outcome = run_plan(
        &settings,
        &InMemoryFindingsSource::default(),
        &PlanBuilder::new(),
    )
    .unwrap();
    let err = write_plan_artifacts(
        &outcome,
        &settings,
        None,
        &FsWritePort,
        &AuditLedger::open(blocked),
    )
    .unwrap_err();
    assert_eq!(exit_code_for(&err), 3);
    assert!(!settings.output.exists());
    assert!(!ws.root.join("l.plan.md").exists());
}

#[test]
fn out_dir_aliasing_the_document_directory_is_refused() {
    let ws = Workspace::new();
    let doc = ws.document("memo.json", &["SSN: 123-45-6789"]);
    let source = std::fs::read(&doc).unwrap();
    let mut settings = ws.plan_settings(&doc, "memo.plan.json");
    settings.terms = vec!["123-45-6789".into()];
    ws.plan(&settings, None);
    std::fs::create_dir(ws.root.join("sub")).unwrap();

    let apply = ApplySettings {
        out_dir: ws.root.join("sub/.."),
        ..ws.apply_settings(&settings.output)
    };
    let err = run_apply(&apply, None, &FsWritePort, &ws.ledger).unwrap_err();
    assert_eq!(exit_code_for(&err), 3);
    assert!(format!("{err:#}").contains("source document"));
    assert_eq!(std::fs::read(&doc).unwrap(), source);
    assert_eq!(ws.ledger.entries().unwrap().len(), 1);
}
