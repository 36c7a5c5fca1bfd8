use crate::canonical::{canonicalize, compute_plan_id};
use crate::error::MalformedPlanError;
use crate::ports::{DocumentView, FsDocumentView};
use camino::Utf8Path;
use redline_hash::ContentAddresser;
use redline_types::action::{Action, ActionKind};
use redline_types::plan::Plan;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Builds canonical, content-identified plans.
///
/// Stateless apart from its document port: the same inputs always produce the
/// same plan, regardless of the order actions arrive in.
pub struct PlanBuilder {
    view: Box<dyn DocumentView + Send + Sync>,
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            view: Box::new(FsDocumentView),
        }
    }

    pub fn with_view(view: Box<dyn DocumentView + Send + Sync>) -> Self {
        Self { view }
    }

    /// The port this builder reads documents through.
    pub fn view(&self) -> &dyn DocumentView {
        self.view.as_ref()
    }

    pub fn build_plan(
        &self,
        document_path: &Utf8Path,
        document_hash: &str,
        raw_actions: &[Action],
        annotations: BTreeMap<String, Value>,
    ) -> Result<Plan, MalformedPlanError> {
        let bytes = self.view.read(document_path).map_err(|e| {
            MalformedPlanError::UnreadableDocument {
                path: document_path.to_string(),
                message: format!("{e:#}"),
            }
        })?;

        let snapshot = ContentAddresser.snapshot_bytes(document_path, &bytes);
        if snapshot.content_hash != document_hash {
            return Err(MalformedPlanError::StaleSnapshot {
                path: document_path.to_string(),
                expected: document_hash.to_string(),
                actual: snapshot.content_hash,
            });
        }

        // Opaque documents carry no page count; bounds are then checked at apply time.
        let actions = canonicalize(raw_actions);
        for action in &actions {
            validate_action(action, snapshot.page_count)?;
        }

        let plan_id = compute_plan_id(document_hash, &actions, &annotations)?;
        debug!(
            plan_id = %plan_id,
            document = %document_path,
            raw = raw_actions.len(),
            actions = actions.len(),
            "plan built"
        );

        Ok(Plan {
            schema_version: redline_types::schema::REDLINE_PLAN_V1.to_string(),
            plan_id,
            document_path: document_path.to_path_buf(),
            document_hash: document_hash.to_string(),
            actions,
            annotations,
        })
    }
}

/// Structural checks for a single action against an optional page count.
pub fn validate_action(action: &Action, page_count: Option<u32>) -> Result<(), MalformedPlanError> {
    let invalid = |message: &str| MalformedPlanError::InvalidAction {
        action: action.label(),
        message: message.to_string(),
    };

    if !action.confidence.is_finite() || !(0.0..=1.0).contains(&action.confidence) {
        return Err(invalid(&format!(
            "confidence {} is not in [0, 1]",
            action.confidence
        )));
    }

    match (action.start, action.end) {
        (Some(start), Some(end)) if start > end => {
            return Err(invalid(&format!("start {start} is after end {end}")));
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(invalid("start and end must be given together"));
        }
        _ => {}
    }

    match action.kind {
        ActionKind::Stamp => {
            if action.page.is_none() {
                return Err(invalid("stamp has no page"));
            }
            if action.payload.is_empty() {
                return Err(invalid("stamp has an empty payload"));
            }
        }
        ActionKind::Redact => {
            let has_span = action.start.is_some();
            let has_text = action.text.as_deref().is_some_and(|t| !t.is_empty());
            if !has_span && !has_text {
                return Err(invalid("redaction has neither offsets nor text"));
            }
        }
    }

    if let (Some(page), Some(page_count)) = (action.page, page_count)
        && page >= page_count
    {
        return Err(MalformedPlanError::PageOutOfRange {
            action: action.label(),
            page,
            page_count,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::InMemoryDocumentView;
    use pretty_assertions::assert_eq;
    use redline_types::layout::{LayoutDocument, Page, Rect, TextRun};

    fn doc_bytes(pages: usize) -> Vec<u8> {
        let pages = (0..pages)
            .map(|_| {
                Page::new(
                    612.0,
                    792.0,
                    vec![TextRun::new(
                        "SSN: 123-45-6789",
                        Rect::new(72.0, 700.0, 232.0, 712.0),
                    )],
                )
            })
            .collect();
        LayoutDocument::new(pages).to_bytes().unwrap()
    }

    fn builder(bytes: &[u8]) -> (PlanBuilder, String) {
        let view = InMemoryDocumentView::new().with("doc.json", bytes.to_vec());
        (
            PlanBuilder::with_view(Box::new(view)),
            ContentAddresser.hash_bytes(bytes),
        )
    }

    #[test]
    fn builds_canonical_plan() {
        let bytes = doc_bytes(2);
        let (b, hash) = builder(&bytes);
        let plan = b
            .build_plan(
                Utf8Path::new("doc.json"),
                &hash,
                &[
                    Action::stamp(1, "ABC000002"),
                    Action::redact_span(0, 5, 16, "123-45-6789", "[SSN]"),
                    Action::stamp(0, "ABC000001"),
                ],
                BTreeMap::new(),
            )
            .unwrap();

        assert_eq!(plan.schema_version, "redline.plan.v1");
        assert_eq!(plan.document_hash, hash);
        assert_eq!(plan.actions[0], Action::stamp(0, "ABC000001"));
        assert_eq!(plan.actions.len(), 3);
        assert!(redline_hash::is_hex64(&plan.plan_id));
        crate::canonical::verify_plan(&plan).unwrap();
    }

    #[test]
    fn page_beyond_count_is_rejected() {
        let bytes = doc_bytes(1);
        let (b, hash) = builder(&bytes);
        let err = b
            .build_plan(
                Utf8Path::new("doc.json"),
                &hash,
                &[Action::stamp(1, "X")],
                BTreeMap::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            MalformedPlanError::PageOutOfRange { page: 1, page_count: 1, .. }
        ));
    }

    #[test]
    fn unreadable_document_is_malformed() {
        let (b, _) = builder(b"");
        let err = b
            .build_plan(Utf8Path::new("other.json"), "00", &[], BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, MalformedPlanError::UnreadableDocument { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn stale_hash_is_rejected() {
        let bytes = doc_bytes(1);
        let (b, _) = builder(&bytes);
        let err = b
            .build_plan(Utf8Path::new("doc.json"), &"0".repeat(64), &[], BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, MalformedPlanError::StaleSnapshot { .. }));
    }

    #[test]
    fn action_checks() {
        let bad = [
            Action::redact_span(0, 9, 3, "x", "[R]"),
            Action::redact_span(0, 0, 1, "x", "[R]").with_confidence(1.5),
            Action::redact_span(0, 0, 1, "x", "[R]").with_confidence(f64::NAN),
            Action::redact_text(Some(0), "", "[R]"),
            Action {
                page: None,
                ..Action::stamp(0, "B")
            },
            Action {
                end: None,
                ..Action::redact_span(0, 0, 1, "x", "[R]")
            },
        ];
        for action in &bad {
            assert!(
                validate_action(action, Some(3)).is_err(),
                "{} should be rejected",
                action.label()
            );
        }
        assert!(validate_action(&Action::redact_text(None, "x", "[R]"), Some(3)).is_ok());
        assert!(validate_action(&Action::stamp(7, "B"), None).is_ok());
    }

    #[test]
    fn opaque_documents_skip_page_bounds() {
        let (b, hash) = builder(b"not a layout document");
        let plan = b
            .build_plan(
                Utf8Path::new("doc.json"),
                &hash,
                &[Action::stamp(40, "B")],
                BTreeMap::new(),
            )
            .unwrap();
        assert_eq!(plan.actions.len(), 1);
    }
}
