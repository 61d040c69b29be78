//! Dry-run previews
//!
//! Renders the rule list before and after a merge as a line diff, one rule
//! per line, so the user can check where the block lands before anything is
//! written.

use similar::{ChangeTag, TextDiff};
use std::fmt::Write;

/// Line-by-line diff of two rule summary lists.
///
/// Returns `None` when the lists are identical.
pub fn render_diff(before: &[String], after: &[String]) -> Option<String> {
    let old_text = join_lines(before);
    let new_text = join_lines(after);

    let diff = TextDiff::from_lines(&old_text, &new_text);
    let mut result = String::new();
    let mut changed = false;

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "- ",
            ChangeTag::Insert => "+ ",
            ChangeTag::Equal => "  ",
        };
        changed |= change.tag() != ChangeTag::Equal;
        let _ = write!(result, "{sign}{change}");
    }

    changed.then_some(result)
}

fn join_lines(lines: &[String]) -> String {
    let mut text = String::new();
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text
}
