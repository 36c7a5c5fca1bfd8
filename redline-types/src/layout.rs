//! Page layout documents: the rendered-text structure redaction and stamping operate on.
//!
//! A page's rendered text is the concatenation of its runs. Offsets count
//! `char`s, not bytes. Inside a run every glyph gets an equal share of the
//! run's width.

use serde::{Deserialize, Serialize};

/// Replacement written over every burned glyph.
pub const BURN_CHAR: char = '\u{2588}';

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Inclusive containment.
    pub fn contains_point(&self, (x, y): (f64, f64)) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutDocument {
    pub schema: String,

    #[serde(default)]
    pub pages: Vec<Page>,
}

impl LayoutDocument {
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            schema: crate::schema::REDLINE_LAYOUT_V1.to_string(),
            pages,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Deterministic serialization: same document, same bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = serde_json::to_vec_pretty(self)?;
        out.push(b'\n');
        Ok(out)
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn page(&self, index: u32) -> Option<&Page> {
        self.pages.get(index as usize)
    }

    /// All rendered text, pages separated by form feeds.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(Page::text)
            .collect::<Vec<_>>()
            .join("\u{c}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub width: f64,
    pub height: f64,

    /// Declared rotation in degrees. Never corrected for.
    #[serde(default)]
    pub rotation: i32,

    #[serde(default)]
    pub runs: Vec<TextRun>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redactions: Vec<RedactionBox>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stamps: Vec<Stamp>,
}

impl Page {
    pub fn new(width: f64, height: f64, runs: Vec<TextRun>) -> Self {
        Self {
            width,
            height,
            rotation: 0,
            runs,
            redactions: vec![],
            stamps: vec![],
        }
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn char_len(&self) -> usize {
        self.runs.iter().map(TextRun::char_len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub bbox: Rect,
}

impl TextRun {
    pub fn new(text: impl Into<String>, bbox: Rect) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Rectangle covering glyphs `[from, to)` of this run.
    pub fn span_rect(&self, from: usize, to: usize) -> Rect {
        let n = self.char_len();
        if n == 0 {
            return self.bbox;
        }
        let advance = self.bbox.width() / n as f64;
        Rect {
            x0: self.bbox.x0 + advance * from as f64,
            y0: self.bbox.y0,
            x1: self.bbox.x0 + advance * to as f64,
            y1: self.bbox.y1,
        }
    }

    pub fn glyph_rect(&self, index: usize) -> Rect {
        self.span_rect(index, index + 1)
    }
}

/// Char-offset spans of every occurrence of `needle` in `haystack`, overlapping ones included.
pub fn find_char_spans(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    let hay: Vec<char> = haystack.chars().collect();
    let pat: Vec<char> = needle.chars().collect();
    if pat.is_empty() || pat.len() > hay.len() {
        return vec![];
    }
    hay.windows(pat.len())
        .enumerate()
        .filter(|(_, w)| *w == pat.as_slice())
        .map(|(i, _)| (i, i + pat.len()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionBox {
    pub rect: Rect,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamp {
    pub text: String,
    pub rect: Rect,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn span_rect_splits_run_evenly() {
        let run = TextRun::new("abcd", Rect::new(10.0, 0.0, 50.0, 12.0));
        assert_eq!(run.span_rect(1, 3), Rect::new(20.0, 0.0, 40.0, 12.0));
        assert_eq!(run.glyph_rect(3), Rect::new(40.0, 0.0, 50.0, 12.0));
    }

    #[test]
    fn find_char_spans_reports_overlaps_in_chars() {
        assert_eq!(find_char_spans("aaa", "aa"), vec![(0, 2), (1, 3)]);
        assert_eq!(find_char_spans("né né", "né"), vec![(0, 2), (3, 5)]);
        assert!(find_char_spans("abc", "").is_empty());
        assert!(find_char_spans("ab", "abc").is_empty());
    }

    #[test]
    fn char_len_counts_scalars_not_bytes() {
        let run = TextRun::new("né", Rect::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(run.char_len(), 2);
    }

    #[test]
    fn serialization_is_stable_and_omits_empty_marks() {
        let doc = LayoutDocument::new(vec![Page::new(
            612.0,
            792.0,
            vec![TextRun::new("hi", Rect::new(0.0, 0.0, 10.0, 10.0))],
        )]);
        let a = doc.to_bytes().unwrap();
        let b = LayoutDocument::from_slice(&a).unwrap().to_bytes().unwrap();
        assert_eq!(a, b);
        let text = String::from_utf8(a).unwrap();
        assert!(!text.contains("redactions"));
        assert!(text.ends_with('\n'));
    }
}
