//! Section splitting for numbered reports.
//!
//! A report is expected to contain [`EXPECTED_SECTIONS`] sections, each
//! opened by a numeric marker such as `3)`. The marker number is only used to
//! check completeness; downstream comparison aligns sections by position.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Number of numbered sections a complete report carries.
pub const EXPECTED_SECTIONS: u32 = 7;

/// Marker at the start of a line, optionally behind any mix of blanks and
/// markdown emphasis or heading characters (`**3) Title**`, `### **3) Title**`).
static LINE_START_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t*#]*(\d{1,2})\)").expect("LINE_START_MARKER regex should compile")
});

/// Single-digit marker anywhere in the text.
static ANY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)\)").expect("ANY_MARKER regex should compile"));

/// Where a section marker is allowed to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerAnchor {
    /// Only at the start of a line. `see note 2) below` does not split.
    #[default]
    LineStart,
    /// Anywhere in the text, including inside body sentences.
    Anywhere,
}

impl std::fmt::Display for MarkerAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LineStart => write!(f, "line_start"),
            Self::Anywhere => write!(f, "anywhere"),
        }
    }
}

impl std::str::FromStr for MarkerAnchor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "line_start" => Ok(Self::LineStart),
            "anywhere" => Ok(Self::Anywhere),
            other => Err(format!(
                "unknown marker anchor '{}', expected 'line_start' or 'anywhere'",
                other
            )),
        }
    }
}

impl MarkerAnchor {
    fn pattern(&self) -> &'static Regex {
        match self {
            Self::LineStart => &LINE_START_MARKER,
            Self::Anywhere => &ANY_MARKER,
        }
    }
}

/// One numbered subdivision of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Position in the report (0-based)
    pub index: usize,
    /// First line: marker and title
    pub header: String,
    /// Remaining lines, possibly empty
    pub body: String,
}

impl Section {
    fn from_fragment(index: usize, fragment: &str) -> Self {
        let (header, body) = match fragment.split_once('\n') {
            Some((header, body)) => (header.to_string(), body.to_string()),
            None => (fragment.to_string(), String::new()),
        };
        Self {
            index,
            header,
            body,
        }
    }

    /// The section as it appeared in the report (trimmed).
    pub fn text(&self) -> String {
        if self.body.is_empty() {
            self.header.clone()
        } else {
            format!("{}\n{}", self.header, self.body)
        }
    }
}

/// Split a report on line-start markers.
pub fn split(report: &str) -> Vec<Section> {
    split_with(report, MarkerAnchor::LineStart)
}

/// Split a report on markers matched with the given anchoring.
///
/// Text is cut immediately before each marker. Whitespace-only fragments are
/// dropped and every kept fragment is trimmed, so text without markers yields
/// one section and blank text yields none.
pub fn split_with(report: &str, anchor: MarkerAnchor) -> Vec<Section> {
    let mut cuts: Vec<usize> = anchor
        .pattern()
        .find_iter(report)
        .map(|m| m.start())
        .collect();
    cuts.push(report.len());

    let mut sections = Vec::new();
    let mut start = 0;
    for cut in cuts {
        let fragment = report[start..cut].trim();
        if !fragment.is_empty() {
            sections.push(Section::from_fragment(sections.len(), fragment));
        }
        start = cut;
    }
    sections
}

/// Marker numbers in `1..=expected` that never open a line of `report`.
pub fn missing_markers(report: &str, expected: u32) -> Vec<u32> {
    missing_markers_with(report, expected, MarkerAnchor::LineStart)
}

/// Marker numbers in `1..=expected` that `anchor` does not find in `report`.
pub fn missing_markers_with(report: &str, expected: u32, anchor: MarkerAnchor) -> Vec<u32> {
    let present: BTreeSet<u32> = anchor
        .pattern()
        .captures_iter(report)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect();

    (1..=expected).filter(|n| !present.contains(n)).collect()
}
