//! Reduced-report construction.
//!
//! Sections of the new and previous report are aligned by position. Sections
//! that did not change enough are replaced with [`NO_UPDATE_PLACEHOLDER`] so
//! the delivered message keeps the report's shape without repeating content
//! the reader already received.
//!
//! ```text
//! position  new          old          block
//! 0         "1) A ..."   "1) A ..."   Unchanged  → "1) A\n<placeholder>"
//! 1         "2) B new"   "2) B old"   Changed    → "2) B new"
//! 2         -            "3) C ..."   Missing    → "<placeholder>"
//! ```

use serde::{Deserialize, Serialize};

use crate::sections::{split_with, MarkerAnchor, Section};
use crate::similarity::SimilarityComparer;

/// Line emitted in place of a section with nothing new.
pub const NO_UPDATE_PLACEHOLDER: &str = "There is no new update in this category today.";

/// Separator between rendered blocks.
const BLOCK_SEPARATOR: &str = "\n\n";

/// How a cycle decides what changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDetection {
    /// Positional per-section comparison with placeholders
    #[default]
    Sections,
    /// Line-level diff; only added lines are delivered
    AddedLines,
}

impl std::fmt::Display for ChangeDetection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sections => write!(f, "sections"),
            Self::AddedLines => write!(f, "added_lines"),
        }
    }
}

impl std::str::FromStr for ChangeDetection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sections" => Ok(Self::Sections),
            "added_lines" | "lines" => Ok(Self::AddedLines),
            other => Err(format!(
                "unknown change detection '{}', expected 'sections' or 'added_lines'",
                other
            )),
        }
    }
}

/// Outcome for one aligned position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffBlock {
    /// The new report has no section at this position
    Missing { index: usize },
    /// New section is similar to the old one at the same position
    Unchanged { index: usize, header: String },
    /// New section, or one that differs from its predecessor
    Changed { index: usize, text: String },
}

impl DiffBlock {
    pub fn index(&self) -> usize {
        match self {
            Self::Missing { index }
            | Self::Unchanged { index, .. }
            | Self::Changed { index, .. } => *index,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }

    /// Text this block contributes to the reduced report.
    pub fn render(&self) -> String {
        match self {
            Self::Missing { .. } => NO_UPDATE_PLACEHOLDER.to_string(),
            Self::Unchanged { header, .. } => format!("{}\n{}", header, NO_UPDATE_PLACEHOLDER),
            Self::Changed { text, .. } => text.clone(),
        }
    }
}

/// Builds reduced reports from a new report and the previous snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportDiffer {
    comparer: SimilarityComparer,
    anchor: MarkerAnchor,
}

impl ReportDiffer {
    pub fn new(comparer: SimilarityComparer, anchor: MarkerAnchor) -> Self {
        Self { comparer, anchor }
    }

    pub fn comparer(&self) -> &SimilarityComparer {
        &self.comparer
    }

    pub fn anchor(&self) -> MarkerAnchor {
        self.anchor
    }

    /// One block per position in `0..max(len(new), len(old))`.
    pub fn diff_sections(&self, new_report: &str, old_report: &str) -> Vec<DiffBlock> {
        let new_sections = split_with(new_report, self.anchor);
        let old_sections = split_with(old_report, self.anchor);
        let positions = new_sections.len().max(old_sections.len());

        (0..positions)
            .map(|index| {
                self.compare_at(index, new_sections.get(index), old_sections.get(index))
            })
            .collect()
    }

    fn compare_at(&self, index: usize, new: Option<&Section>, old: Option<&Section>) -> DiffBlock {
        let Some(new) = new else {
            return DiffBlock::Missing { index };
        };

        let new_text = new.text();
        match old {
            Some(old) if self.comparer.is_similar(&new_text, &old.text()) => {
                DiffBlock::Unchanged {
                    index,
                    header: new.header.clone(),
                }
            }
            _ => DiffBlock::Changed {
                index,
                text: new_text,
            },
        }
    }

    /// Reduced report: every block rendered, blank line between blocks.
    pub fn diff(&self, new_report: &str, old_report: &str) -> String {
        render_blocks(self.diff_sections(new_report, old_report).iter())
    }

    /// Only the changed sections; empty when every section is unchanged.
    pub fn diff_changed_only(&self, new_report: &str, old_report: &str) -> String {
        render_blocks(
            self.diff_sections(new_report, old_report)
                .iter()
                .filter(|block| block.is_changed()),
        )
    }
}

fn render_blocks<'a>(blocks: impl Iterator<Item = &'a DiffBlock>) -> String {
    blocks
        .map(DiffBlock::render)
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
