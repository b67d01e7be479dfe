//! Line-level change detection.
//!
//! Unlike the section differ this mode has no notion of report structure: it
//! delivers whatever lines were inserted since the snapshot, so a message can
//! end up without any section header when only body lines changed.

use chrono::NaiveDate;
use similar::{ChangeTag, TextDiff};

/// Non-blank lines present in `new_report` but inserted relative to `old_report`.
pub fn added_lines(new_report: &str, old_report: &str) -> Vec<String> {
    TextDiff::from_lines(old_report, new_report)
        .iter_all_changes()
        .filter(|change| change.tag() == ChangeTag::Insert)
        .map(|change| change.value().trim_end_matches(['\r', '\n']).to_string())
        .filter(|line| !line.trim().is_empty())
        .collect()
}

/// Date-stamped message built from added lines, `None` when there are none.
pub fn added_lines_message(lines: &[String], date: NaiveDate) -> Option<String> {
    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "New updates ({})\n\n{}",
        date.format("%Y-%m-%d"),
        lines.join("\n")
    ))
}
