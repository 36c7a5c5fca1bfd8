//! In-memory page mutation: burn glyphs under redaction rectangles and place stamps.

use redline_types::layout::{BURN_CHAR, Page, RedactionBox, Rect, Stamp};

/// Nominal stamp glyph advance and line height, in page units.
const STAMP_ADVANCE: f64 = 6.0;
const STAMP_HEIGHT: f64 = 10.0;

/// Replace every glyph whose cell centre lies inside any of `rects` and record
/// the rectangles. Returns the number of glyphs burned.
pub fn burn(page: &mut Page, rects: &[Rect], label: &str) -> usize {
    let mut burned = 0usize;
    for run in &mut page.runs {
        let text: String = run
            .text
            .chars()
            .enumerate()
            .map(|(i, c)| {
                let centre = run.glyph_rect(i).center();
                if c != BURN_CHAR && rects.iter().any(|r| r.contains_point(centre)) {
                    burned += 1;
                    BURN_CHAR
                } else {
                    c
                }
            })
            .collect();
        run.text = text;
    }

    page.redactions.extend(rects.iter().map(|rect| RedactionBox {
        rect: *rect,
        label: label.to_string(),
    }));
    burned
}

/// Anchor `text` at the page's bottom-right corner, `margin` units in from each edge.
///
/// Coordinates have their origin at the bottom-left of the page. Stamps
/// already on the page push the new one upwards so they never overlap.
pub fn stamp(page: &mut Page, text: &str, margin: f64) -> Rect {
    let width = STAMP_ADVANCE * text.chars().count() as f64;
    let y0 = margin + STAMP_HEIGHT * page.stamps.len() as f64;
    let rect = Rect::new(
        page.width - margin - width,
        y0,
        page.width - margin,
        y0 + STAMP_HEIGHT,
    );
    page.stamps.push(Stamp {
        text: text.to_string(),
        rect,
    });
    rect
}
