use std::fmt::Write;

use serde_json::Value;

use super::{Category, Change, ChangeKind, Conflict, DiffResult};

/// Render a diff as a markdown report
pub fn to_markdown(diff: &DiffResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# Context diff (v{} → v{})\n",
        diff.source_version, diff.target_version
    );

    if diff.is_empty() {
        out.push_str("No changes\n");
        return out;
    }

    let _ = writeln!(
        out,
        "**{}** change(s): {} added, {} removed, {} modified. Causality: {}.\n",
        diff.summary.total,
        diff.summary.added,
        diff.summary.removed,
        diff.summary.modified,
        diff.causality.as_str()
    );

    for category in Category::ALL {
        let changes = diff.changes(category);
        if changes.is_empty() {
            continue;
        }
        let _ = writeln!(out, "## {}\n", category.title());
        for change in changes {
            write_change(&mut out, category, change);
        }
        out.push('\n');
    }

    out
}

/// Render merge conflicts as a markdown report
pub fn conflicts_to_markdown(conflicts: &[Conflict]) -> String {
    let mut out = String::new();
    if conflicts.is_empty() {
        out.push_str("No conflicts\n");
        return out;
    }

    let _ = writeln!(out, "# Merge conflicts ({})\n", conflicts.len());
    for conflict in conflicts {
        let _ = writeln!(out, "## `{}`\n", conflict.path);
        let _ = writeln!(out, "- source: {}", label(&conflict.source));
        let _ = writeln!(out, "- target: {}", label(&conflict.target));
        for field in &conflict.fields {
            let _ = writeln!(
                out,
                "  - `{}`: {} ≠ {}",
                field.field,
                inline(&field.old),
                inline(&field.new)
            );
        }
        out.push('\n');
    }
    out
}

fn write_change(out: &mut String, category: Category, change: &Change) {
    let marker = match change.kind {
        ChangeKind::Added => "+",
        ChangeKind::Removed => "-",
        ChangeKind::Modified => "~",
    };

    if category == Category::Metadata {
        let old = change.old.as_ref().map(inline).unwrap_or_default();
        let new = change.new.as_ref().map(inline).unwrap_or_default();
        let _ = writeln!(out, "- {} `{}`: {} → {}", marker, change.key, old, new);
        return;
    }

    let shown = change.new.as_ref().or(change.old.as_ref());
    let text = shown.map(label).unwrap_or_else(|| change.key.clone());
    let _ = writeln!(out, "- {} {}", marker, text);
    for field in &change.fields {
        let _ = writeln!(
            out,
            "  - `{}`: {} → {}",
            field.field,
            inline(&field.old),
            inline(&field.new)
        );
    }
}

/// Human label of a serialized entry
fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(Value::String(d)) = map.get("description") {
                return d.clone();
            }
            if let (Some(Value::String(from)), Some(Value::String(to))) =
                (map.get("from_agent"), map.get("to_agent"))
            {
                let summary = map.get("summary").and_then(Value::as_str).unwrap_or("");
                return format!("{} → {}: {}", from, to, summary);
            }
            value.to_string()
        }
        other => other.to_string(),
    }
}

fn inline(value: &Value) -> String {
    match value {
        Value::Null => "_none_".to_string(),
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{compare, merge, MergeOptions};
    use crate::types::{Decision, SharedContext};

    #[test]
    fn test_empty_diff_says_no_changes() {
        let ctx = SharedContext::new("/repo", "A");
        let md = to_markdown(&compare(&ctx, &ctx));
        assert!(md.contains("No changes"));
    }

    #[test]
    fn test_markdown_lists_sections() {
        let source = SharedContext::new("/repo", "A");
        let mut target = source.clone();
        target.current_work.goal = "B".into();
        target.conversation.decisions.push(Decision::new("use tokio", None, None));
        target.code_changes.modified_files.push("src/lib.rs".into());

        let md = to_markdown(&compare(&source, &target));
        assert!(md.contains("## Metadata"));
        assert!(md.contains("`current_work.goal`: \"A\" → \"B\""));
        assert!(md.contains("## Decisions"));
        assert!(md.contains("+ use tokio"));
        assert!(md.contains("## Modified files"));
        assert!(md.contains("+ src/lib.rs"));
        assert!(!md.contains("## Blockers"));
    }

    #[test]
    fn test_conflicts_markdown() {
        let mut base = SharedContext::new("/repo", "A");
        base.conversation.decisions.push(Decision::new("x", None, None));
        let mut left = base.clone();
        let mut right = base.clone();
        left.conversation.decisions[0].description = "left".into();
        left.touch("a");
        right.conversation.decisions[0].description = "right".into();
        right.touch("b");

        let result = merge(&left, &right, &MergeOptions::default());
        let md = conflicts_to_markdown(&result.conflicts);
        assert!(md.contains("# Merge conflicts (1)"));
        assert!(md.contains("conversation.decisions["));
        assert!(md.contains("`description`: \"left\" ≠ \"right\""));

        assert_eq!(conflicts_to_markdown(&[]), "No conflicts\n");
    }
}
