use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::classify::{CategoryCode, UNCLASSIFIED};

/// One page as handed over by the text extraction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePage {
    pub page_number: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub layout: Option<PositionHints>,
}

/// Vertical position of each text line, 0.0 at the top of the page and 1.0 at the bottom.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionHints {
    #[serde(default)]
    pub line_offsets: Vec<f32>,
}

/// A whole extracted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    #[serde(default)]
    pub source: String,
    pub pages: Vec<SourcePage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupId(pub u32);

/// Best-effort metadata read off a single page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub header: String,
    /// Header carried a "(continued)" style marker.
    pub continued: bool,
    pub dos: Option<NaiveDate>,
    pub provider: String,
}

impl PageMetadata {
    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.dos.is_none() && self.provider.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub number: u32,
    pub text: String,
    pub meta: PageMetadata,
    pub category: CategoryCode,
    /// Set once by the grouper.
    pub group: Option<GroupId>,
}

impl Page {
    pub fn new(number: u32, text: impl Into<String>, meta: PageMetadata) -> Self {
        Self {
            number,
            text: text.into(),
            meta,
            category: UNCLASSIFIED,
            group: None,
        }
    }

    pub fn with_category(mut self, category: CategoryCode) -> Self {
        self.category = category;
        self
    }
}

pub fn format_dos(dos: Option<NaiveDate>) -> String {
    dos.map(|d| d.format("%m/%d/%Y").to_string())
        .unwrap_or_default()
}
