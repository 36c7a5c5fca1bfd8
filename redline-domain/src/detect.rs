//! Detector capability and the confidence-gated escalation wrapper.
//!
//! Detection heuristics live outside this crate. What lives here is the seam
//! (`Detector`), a literal term detector, and `EscalatingDetector`, which only
//! pays for an expensive fallback when the cheap primary is unsure.

use redline_types::action::{Action, ActionKind};
use redline_types::layout::{LayoutDocument, find_char_spans};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use tracing::debug;

/// A detected span in one page's rendered text. Offsets count chars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub label: String,
    pub confidence: f64,
}

impl Finding {
    pub fn overlaps(&self, other: &Finding) -> bool {
        self.start < other.end && other.start < self.end
    }
}

pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    fn analyze(&self, text: &str) -> Vec<Finding>;
}

/// Finds literal terms, every occurrence, overlapping ones included.
#[derive(Debug, Clone)]
pub struct TermDetector {
    terms: Vec<String>,
    label: String,
    confidence: f64,
}

impl TermDetector {
    pub fn new(terms: Vec<String>, label: impl Into<String>) -> Self {
        Self {
            terms: terms.into_iter().filter(|t| !t.is_empty()).collect(),
            label: label.into(),
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Detector for TermDetector {
    fn name(&self) -> &str {
        "terms"
    }

    fn analyze(&self, text: &str) -> Vec<Finding> {
        let mut out = Vec::new();
        for term in &self.terms {
            for (start, end) in find_char_spans(text, term) {
                out.push(Finding {
                    start,
                    end,
                    text: term.clone(),
                    label: self.label.clone(),
                    confidence: self.confidence,
                });
            }
        }
        out.sort_by(|a, b| (a.start, a.end, &a.text).cmp(&(b.start, b.end, &b.text)));
        out
    }
}

/// Primary detector backed by a fallback consulted only for low-confidence findings.
///
/// - Findings at or above `threshold` are kept as-is.
/// - A finding below `threshold` that overlaps a fallback finding is replaced
///   by it (span and confidence from the fallback, label from the primary).
/// - An unconfirmed low finding survives only at or above `floor`.
///
/// The fallback runs at most once per `analyze` call, and not at all when the
/// primary is confident throughout.
pub struct EscalatingDetector {
    name: String,
    primary: Box<dyn Detector>,
    fallback: Box<dyn Detector>,
    threshold: f64,
    floor: f64,
}

impl EscalatingDetector {
    pub fn new(
        primary: Box<dyn Detector>,
        fallback: Box<dyn Detector>,
        threshold: f64,
        floor: f64,
    ) -> Self {
        let name = format!("{}+{}", primary.name(), fallback.name());
        Self {
            name,
            primary,
            fallback,
            threshold,
            floor,
        }
    }
}

impl Detector for EscalatingDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn analyze(&self, text: &str) -> Vec<Finding> {
        let fallback: OnceCell<Vec<Finding>> = OnceCell::new();
        let mut out = Vec::new();

        for finding in self.primary.analyze(text) {
            if finding.confidence >= self.threshold {
                out.push(finding);
                continue;
            }

            let confirmations = fallback.get_or_init(|| {
                debug!(detector = self.fallback.name(), "escalating to fallback");
                self.fallback.analyze(text)
            });
            match confirmations.iter().find(|f| f.overlaps(&finding)) {
                Some(confirmed) => out.push(Finding {
                    label: finding.label,
                    ..confirmed.clone()
                }),
                None if finding.confidence >= self.floor => out.push(finding),
                None => debug!(
                    start = finding.start,
                    end = finding.end,
                    confidence = finding.confidence,
                    "dropping unconfirmed low-confidence finding"
                ),
            }
        }

        out.sort_by(|a, b| {
            (a.start, a.end, &a.label)
                .cmp(&(b.start, b.end, &b.label))
                .then(b.confidence.total_cmp(&a.confidence))
        });
        out.dedup_by(|b, a| a.start == b.start && a.end == b.end && a.label == b.label);
        out
    }
}

/// Run `detector` over every page and turn its findings into redact actions.
///
/// `payload` overrides each finding's label as the redaction payload.
pub fn detect_actions(
    doc: &LayoutDocument,
    detector: &dyn Detector,
    payload: Option<&str>,
) -> Vec<Action> {
    let mut out = Vec::new();
    for (index, page) in doc.pages.iter().enumerate() {
        for f in detector.analyze(&page.text()) {
            out.push(Action {
                kind: ActionKind::Redact,
                page: Some(index as u32),
                start: Some(f.start),
                end: Some(f.end),
                text: Some(f.text),
                payload: payload.map(str::to_string).unwrap_or(f.label),
                confidence: f.confidence.clamp(0.0, 1.0),
            });
        }
    }
    debug!(detector = detector.name(), actions = out.len(), "detection finished");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use redline_types::layout::{Page, Rect, TextRun};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        name: &'static str,
        findings: Vec<Finding>,
        calls: Arc<AtomicUsize>,
    }

    impl Detector for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn analyze(&self, _text: &str) -> Vec<Finding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.findings.clone()
        }
    }

    fn finding(start: usize, end: usize, confidence: f64) -> Finding {
        Finding {
            start,
            end,
            text: "t".to_string(),
            label: "pii".to_string(),
            confidence,
        }
    }

    fn escalating(
        primary: Vec<Finding>,
        fallback: Vec<Finding>,
    ) -> (EscalatingDetector, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let det = EscalatingDetector::new(
            Box::new(Fixed {
                name: "regex",
                findings: primary,
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(Fixed {
                name: "model",
                findings: fallback,
                calls: Arc::clone(&calls),
            }),
            0.8,
            0.5,
        );
        (det, calls)
    }

    #[test]
    fn confident_primary_never_escalates() {
        let (det, calls) = escalating(vec![finding(0, 3, 0.9)], vec![finding(0, 3, 1.0)]);
        assert_eq!(det.analyze("abc"), vec![finding(0, 3, 0.9)]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(det.name(), "regex+model");
    }

    #[test]
    fn low_findings_are_confirmed_or_filtered_with_one_fallback_call() {
        let (det, calls) = escalating(
            vec![finding(0, 3, 0.6), finding(10, 12, 0.3), finding(20, 22, 0.55)],
            vec![finding(1, 4, 0.95)],
        );
        let out = det.analyze("ignored");
        assert_eq!(out, vec![finding(1, 4, 0.95), finding(20, 22, 0.55)]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn term_detector_finds_every_occurrence() {
        let det = TermDetector::new(vec!["ab".into(), "".into()], "term");
        let out = det.analyze("ab xab");
        assert_eq!(
            out.iter().map(|f| (f.start, f.end)).collect::<Vec<_>>(),
            vec![(0, 2), (4, 6)]
        );
    }

    #[test]
    fn detect_actions_scopes_to_pages() {
        let page = |t: &str| Page::new(100.0, 100.0, vec![TextRun::new(t, Rect::new(0.0, 0.0, 50.0, 10.0))]);
        let doc = LayoutDocument::new(vec![page("nothing"), page("SSN: 123-45-6789")]);
        let det = TermDetector::new(vec!["123-45-6789".into()], "ssn");
        let actions = detect_actions(&doc, &det, Some("[REDACTED]"));
        assert_eq!(
            actions,
            vec![Action::redact_span(1, 5, 16, "123-45-6789", "[REDACTED]")]
        );
    }
}
