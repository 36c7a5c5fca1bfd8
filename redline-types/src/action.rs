use serde::{Deserialize, Serialize};

/// What an action does to a page.
///
/// Variant order is significant: it is the `kind` component of the canonical
/// action ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Redact,
    Stamp,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Redact => "redact",
            ActionKind::Stamp => "stamp",
        }
    }
}

/// A single proposed mutation.
///
/// `page: None` means "somewhere in the document"; the resolver searches every
/// page in order. `start`/`end` are character offsets into the page's rendered
/// text, `text` is the literal used by the search fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,

    #[serde(default)]
    pub page: Option<u32>,

    #[serde(default)]
    pub start: Option<usize>,

    #[serde(default)]
    pub end: Option<usize>,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub payload: String,

    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

impl Action {
    /// Redaction of a known offset span, with the matched literal kept for the search fallback.
    pub fn redact_span(
        page: u32,
        start: usize,
        end: usize,
        text: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            kind: ActionKind::Redact,
            page: Some(page),
            start: Some(start),
            end: Some(end),
            text: Some(text.into()),
            payload: payload.into(),
            confidence: 1.0,
        }
    }

    /// Redaction located only by literal text.
    pub fn redact_text(page: Option<u32>, text: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Redact,
            page,
            start: None,
            end: None,
            text: Some(text.into()),
            payload: payload.into(),
            confidence: 1.0,
        }
    }

    pub fn stamp(page: u32, payload: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Stamp,
            page: Some(page),
            start: None,
            end: None,
            text: None,
            payload: payload.into(),
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Identity used for deduplication: two actions with equal keys do the same thing.
    ///
    /// `text` only takes part when there are no offsets, since it is then the
    /// sole locator.
    pub fn dedup_key(&self) -> ActionKey<'_> {
        ActionKey {
            kind: self.kind,
            page: self.page,
            start: self.start,
            end: self.end,
            payload: self.payload.as_str(),
            locator: match self.start {
                Some(_) => None,
                None => self.text.as_deref(),
            },
        }
    }

    /// Short human label, e.g. `redact p0 [5,16)`.
    pub fn label(&self) -> String {
        let page = self
            .page
            .map(|p| format!("p{p}"))
            .unwrap_or_else(|| "p*".to_string());
        match (self.start, self.end) {
            (Some(s), Some(e)) => format!("{} {} [{},{})", self.kind.as_str(), page, s, e),
            _ => match &self.text {
                Some(t) => format!("{} {} {:?}", self.kind.as_str(), page, t),
                None => format!("{} {}", self.kind.as_str(), page),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionKey<'a> {
    pub kind: ActionKind,
    pub page: Option<u32>,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub payload: &'a str,
    pub locator: Option<&'a str>,
}
