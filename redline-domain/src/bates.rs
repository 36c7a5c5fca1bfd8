//! Bates numbering: one sequential stamp per page.

use redline_types::action::Action;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatesConfig {
    pub prefix: String,
    pub start: u64,
    pub width: usize,
}

impl Default for BatesConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            start: 1,
            width: 6,
        }
    }
}

impl BatesConfig {
    /// Label for zero-based `page`, e.g. `ABC000007`.
    pub fn label(&self, page: u32) -> String {
        format!(
            "{}{:0width$}",
            self.prefix,
            self.start + u64::from(page),
            width = self.width
        )
    }
}

/// One stamp action per page, in page order.
pub fn assign(page_count: u32, config: &BatesConfig) -> Vec<Action> {
    (0..page_count)
        .map(|page| Action::stamp(page, config.label(page)))
        .collect()
}
