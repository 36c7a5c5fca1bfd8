//! Geometric resolution: logical text locations to page rectangles.
//!
//! Resolution never fails. An empty result means the action could not be
//! located and is reported as a skip by the caller. Rotation is never
//! corrected; rectangles stay in the page's declared coordinate space.

use redline_types::action::Action;
use redline_types::layout::{LayoutDocument, Page, Rect, find_char_spans};
use tracing::{debug, warn};

/// Rectangles for `action` on one page: offsets first, then literal search.
pub fn resolve(page: &Page, action: &Action) -> Vec<Rect> {
    if let (Some(start), Some(end)) = (action.start, action.end) {
        let rects = by_offsets(page, start, end);
        if !rects.is_empty() {
            return rects;
        }
    }
    match action.text.as_deref() {
        Some(text) if !text.is_empty() => by_text(page, text),
        _ => vec![],
    }
}

/// Bounding boxes of every run intersecting `[start, end)`.
fn by_offsets(page: &Page, start: usize, end: usize) -> Vec<Rect> {
    let len = page.char_len();
    if len < end {
        debug!(len, end, "offsets beyond page text; extraction drift");
        return vec![];
    }

    let mut out = Vec::new();
    let mut pos = 0usize;
    for run in &page.runs {
        let n = run.char_len();
        if n > 0 && pos < end && start < pos + n {
            out.push(run.bbox);
        }
        pos += n;
    }
    out
}

/// Glyph-span rectangles of every occurrence of `text`, overlapping ones included.
fn by_text(page: &Page, text: &str) -> Vec<Rect> {
    let mut out = Vec::new();
    for (start, end) in find_char_spans(&page.text(), text) {
        let mut pos = 0usize;
        for run in &page.runs {
            let n = run.char_len();
            let from = start.max(pos);
            let to = end.min(pos + n);
            if from < to {
                out.push(run.span_rect(from - pos, to - pos));
            }
            pos += n;
        }
    }
    out
}

/// Where an action landed.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub page: u32,
    pub rects: Vec<Rect>,
}

/// Resolve against a whole document.
///
/// A page-scoped action resolves on that page only. A whole-document action
/// is tried on each page in order and pinned to the first page that yields
/// rectangles. Returns `None` on a miss or a missing page.
pub fn resolve_in_document(doc: &LayoutDocument, action: &Action) -> Option<Resolution> {
    match action.page {
        Some(index) => {
            let page = doc.page(index)?;
            warn_rotation(index, page);
            let rects = resolve(page, action);
            (!rects.is_empty()).then_some(Resolution { page: index, rects })
        }
        None => {
            for (index, page) in doc.pages.iter().enumerate() {
                let index = index as u32;
                let rects = resolve(page, action);
                if rects.is_empty() {
                    continue;
                }
                warn_rotation(index, page);
                warn!(
                    action = %action.label(),
                    page = index,
                    "whole-document action resolved on first matching page; later pages not searched"
                );
                return Some(Resolution { page: index, rects });
            }
            None
        }
    }
}

fn warn_rotation(index: u32, page: &Page) {
    if page.rotation.rem_euclid(360) != 0 {
        warn!(
            page = index,
            rotation = page.rotation,
            "page is rotated; resolving in declared coordinates without correction"
        );
    }
}
