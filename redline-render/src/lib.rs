//! Rendering helpers (markdown) for human-readable artifacts.

use redline_ledger::VerifyReport;
use redline_types::action::{Action, ActionKind};
use redline_types::apply::ApplyResult;
use redline_types::plan::Plan;

pub fn render_plan_md(plan: &Plan) -> String {
    let mut out = String::new();
    out.push_str("# redline plan\n\n");
    out.push_str(&format!("- Plan id: `{}`\n", plan.plan_id));
    out.push_str(&format!("- Document: `{}`\n", plan.document_path));
    out.push_str(&format!("- Document hash: `{}`\n", plan.document_hash));
    out.push_str(&format!(
        "- Actions: {} (redact {}, stamp {})\n",
        plan.actions.len(),
        plan.count_kind(ActionKind::Redact),
        plan.count_kind(ActionKind::Stamp)
    ));
    out.push_str(&format!("- Pages touched: {}\n", plan.pages_touched()));
    if plan.has_whole_document_actions() {
        out.push_str("- Whole-document actions: resolved on the first matching page\n");
    }

    if !plan.annotations.is_empty() {
        out.push_str("\n## Annotations\n\n");
        for (k, v) in &plan.annotations {
            out.push_str(&format!("- `{}`: {}\n", k, v));
        }
    }

    out.push_str("\n## Actions\n\n");
    if plan.actions.is_empty() {
        out.push_str("_No actions planned._\n");
        return out;
    }

    out.push_str("| # | Kind | Page | Span | Text | Payload | Confidence |\n");
    out.push_str("|---|------|------|------|------|---------|------------|\n");
    for (i, a) in plan.actions.iter().enumerate() {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {:.2} |\n",
            i + 1,
            a.kind.as_str(),
            page_cell(a),
            span_cell(a),
            a.text.as_deref().map(escape_cell).unwrap_or_else(|| "-".to_string()),
            escape_cell(&a.payload),
            a.confidence
        ));
    }

    out
}

pub fn render_apply_md(result: &ApplyResult) -> String {
    let mut out = String::new();
    if result.preview {
        out.push_str("# redline apply (preview)\n\n");
    } else {
        out.push_str("# redline apply\n\n");
    }
    out.push_str(&format!("- Plan id: `{}`\n", result.plan_id));
    out.push_str(&format!("- Document: `{}`\n", result.document_path));
    if let Some(path) = &result.output_path {
        out.push_str(&format!("- Output: `{}`\n", path));
    }
    out.push_str(&format!(
        "- Hashes: {} → {}\n",
        result.input_hash, result.output_hash
    ));
    out.push_str(&format!(
        "- Applied: {}\n- Skipped: {}\n",
        result.applied_count,
        result.skipped.len()
    ));
    if result.overridden {
        out.push_str("- **Integrity override**: document changed since planning\n");
    }
    if let Some(seq) = result.ledger_seq {
        out.push_str(&format!("- Ledger entry: {}\n", seq));
    }

    if !result.skipped.is_empty() {
        out.push_str("\n## Skipped\n\n");
        for s in &result.skipped {
            out.push_str(&format!(
                "- `{}` {} ({})\n",
                s.reason_token,
                s.action.label(),
                s.reason
            ));
        }
    }

    out
}

pub fn render_verify_md(report: &VerifyReport) -> String {
    let mut out = String::new();
    out.push_str("# redline ledger\n\n");
    out.push_str(&format!(
        "- Status: {}\n",
        if report.ok { "intact" } else { "BROKEN" }
    ));
    out.push_str(&format!("- Entries checked: {}\n", report.entries_checked));
    if let Some(expected) = report.expected {
        out.push_str(&format!("- Anchor count: {}\n", expected));
    }
    if let (Some(index), Some(kind)) = (report.break_index, report.break_kind) {
        out.push_str(&format!("- Break: entry {} ({})\n", index, kind.as_str()));
    }
    if let Some(detail) = &report.detail {
        out.push_str(&format!("- Detail: {}\n", detail));
    }
    out
}

fn page_cell(a: &Action) -> String {
    a.page
        .map(|p| p.to_string())
        .unwrap_or_else(|| "*".to_string())
}

fn span_cell(a: &Action) -> String {
    match (a.start, a.end) {
        (Some(s), Some(e)) => format!("[{}, {})", s, e),
        _ => "-".to_string(),
    }
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}
