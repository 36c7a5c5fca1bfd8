use crate::action::{Action, ActionKind};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A reviewable, content-addressed set of actions against one document snapshot.
///
/// `plan_id` is derived from `document_hash`, the canonically sorted actions and
/// the annotations; nothing else feeds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub schema_version: String,
    pub plan_id: String,

    #[serde(rename = "document")]
    pub document_path: Utf8PathBuf,

    pub document_hash: String,

    #[serde(default)]
    pub actions: Vec<Action>,

    #[serde(default)]
    pub annotations: BTreeMap<String, serde_json::Value>,
}

impl Plan {
    pub fn count_kind(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    /// Distinct pages referenced by page-scoped actions.
    pub fn pages_touched(&self) -> usize {
        self.actions
            .iter()
            .filter_map(|a| a.page)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn has_whole_document_actions(&self) -> bool {
        self.actions.iter().any(|a| a.page.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_path_uses_wire_name() {
        let plan = Plan {
            schema_version: crate::schema::REDLINE_PLAN_V1.to_string(),
            plan_id: "00".repeat(32),
            document_path: Utf8PathBuf::from("docs/a.json"),
            document_hash: "11".repeat(32),
            actions: vec![Action::stamp(0, "ABC000001")],
            annotations: BTreeMap::new(),
        };
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["document"], "docs/a.json");
        assert!(json.get("document_path").is_none());
    }

    #[test]
    fn pages_touched_counts_distinct_pages() {
        let plan = Plan {
            schema_version: crate::schema::REDLINE_PLAN_V1.to_string(),
            plan_id: String::new(),
            document_path: Utf8PathBuf::from("a"),
            document_hash: String::new(),
            actions: vec![
                Action::redact_span(0, 0, 1, "a", "x"),
                Action::stamp(0, "s"),
                Action::stamp(1, "s"),
                Action::redact_text(None, "q", "x"),
            ],
            annotations: BTreeMap::new(),
        };
        assert_eq!(plan.pages_touched(), 2);
        assert!(plan.has_whole_document_actions());
        assert_eq!(plan.count_kind(ActionKind::Stamp), 2);
    }
}
