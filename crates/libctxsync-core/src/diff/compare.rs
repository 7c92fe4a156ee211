use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::types::{Handoff, NextStep, SharedContext};
use super::{field_changes, to_value, Change, ChangeKind, DiffResult, DiffSummary, Identified};

/// Compare `source` against `target`.
///
/// Entries present only in `target` are `added`, entries present only in
/// `source` are `removed`, and matched entries with differing content are
/// `modified`.
pub fn compare(source: &SharedContext, target: &SharedContext) -> DiffResult {
    let metadata = compare_metadata(source, target);
    let decisions = compare_by_id(&source.conversation.decisions, &target.conversation.decisions);
    let approaches = compare_by_id(&source.conversation.approaches, &target.conversation.approaches);
    let blockers = compare_by_id(&source.conversation.blockers, &target.conversation.blockers);
    let next_steps = compare_by_key(
        &source.conversation.next_steps,
        &target.conversation.next_steps,
        next_step_key,
    );
    let handoffs = compare_by_key(&source.handoffs, &target.handoffs, handoff_key);
    let modified_files = compare_by_key(
        &source.code_changes.modified_files,
        &target.code_changes.modified_files,
        |f| f.clone(),
    );

    let mut summary = DiffSummary::default();
    for change in metadata
        .iter()
        .chain(&decisions)
        .chain(&approaches)
        .chain(&blockers)
        .chain(&next_steps)
        .chain(&handoffs)
        .chain(&modified_files)
    {
        match change.kind {
            ChangeKind::Added => summary.added += 1,
            ChangeKind::Removed => summary.removed += 1,
            ChangeKind::Modified => summary.modified += 1,
        }
    }
    summary.total = summary.added + summary.removed + summary.modified;

    DiffResult {
        source_version: source.version,
        target_version: target.version,
        causality: source.clock.compare(&target.clock),
        metadata,
        decisions,
        approaches,
        blockers,
        next_steps,
        handoffs,
        modified_files,
        summary,
    }
}

/// Match key for next steps: the step text
pub(crate) fn next_step_key(step: &NextStep) -> String {
    step.description.trim().to_string()
}

/// Match key for hand-offs: who handed to whom, and when
pub(crate) fn handoff_key(handoff: &Handoff) -> String {
    format!(
        "{}->{}@{}",
        handoff.from_agent,
        handoff.to_agent,
        handoff.at.timestamp_millis()
    )
}

fn compare_by_id<T: Identified>(source: &[T], target: &[T]) -> Vec<Change> {
    compare_by_key(source, target, |e| e.entity_id().to_string())
}

fn compare_by_key<T, F>(source: &[T], target: &[T], key: F) -> Vec<Change>
where
    T: Serialize + PartialEq,
    F: Fn(&T) -> String,
{
    let mut source_index: HashMap<String, &T> = HashMap::new();
    for item in source {
        source_index.entry(key(item)).or_insert(item);
    }
    let mut target_keys = std::collections::HashSet::new();

    let mut changes = Vec::new();
    for item in target {
        let k = key(item);
        if !target_keys.insert(k.clone()) {
            continue;
        }
        match source_index.get(&k) {
            None => changes.push(Change {
                kind: ChangeKind::Added,
                key: k,
                old: None,
                new: Some(to_value(item)),
                fields: Vec::new(),
            }),
            Some(old) if *old != item => {
                let (old_value, new_value) = (to_value(*old), to_value(item));
                changes.push(Change {
                    kind: ChangeKind::Modified,
                    key: k,
                    fields: field_changes(&old_value, &new_value),
                    old: Some(old_value),
                    new: Some(new_value),
                });
            }
            Some(_) => {}
        }
    }

    let mut seen_removed = std::collections::HashSet::new();
    for item in source {
        let k = key(item);
        if !target_keys.contains(&k) && seen_removed.insert(k.clone()) {
            changes.push(Change {
                kind: ChangeKind::Removed,
                key: k,
                old: Some(to_value(item)),
                new: None,
                fields: Vec::new(),
            });
        }
    }

    changes
}

fn compare_metadata(source: &SharedContext, target: &SharedContext) -> Vec<Change> {
    let pairs: [(&str, Value, Value); 6] = [
        (
            "project_path",
            to_value(&source.project_path),
            to_value(&target.project_path),
        ),
        (
            "current_work.goal",
            to_value(&source.current_work.goal),
            to_value(&target.current_work.goal),
        ),
        (
            "current_work.status",
            to_value(&source.current_work.status),
            to_value(&target.current_work.status),
        ),
        (
            "current_work.active_files",
            to_value(&source.current_work.active_files),
            to_value(&target.current_work.active_files),
        ),
        (
            "code_changes.summary",
            to_value(&source.code_changes.summary),
            to_value(&target.code_changes.summary),
        ),
        (
            "code_changes.uncommitted",
            to_value(&source.code_changes.uncommitted),
            to_value(&target.code_changes.uncommitted),
        ),
    ];

    pairs
        .into_iter()
        .filter(|(_, old, new)| old != new)
        .map(|(path, old, new)| Change {
            kind: ChangeKind::Modified,
            key: path.to_string(),
            old: Some(old),
            new: Some(new),
            fields: Vec::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockOrdering;
    use crate::types::{Blocker, Decision};

    fn base() -> SharedContext {
        let mut ctx = SharedContext::new("/repo", "A");
        ctx.conversation.decisions.push(Decision::new("use tokio", None, None));
        ctx.conversation.next_steps.push(NextStep::new("write tests", 1));
        ctx.code_changes.modified_files.push("src/lib.rs".into());
        ctx
    }

    #[test]
    fn test_compare_identical_is_empty() {
        let ctx = base();
        let diff = compare(&ctx, &ctx);
        assert!(diff.is_empty());
        assert_eq!(diff.summary.total, 0);
        assert_eq!(diff.causality, ClockOrdering::Equal);
    }

    #[test]
    fn test_compare_detects_each_kind() {
        let source = base();
        let mut target = source.clone();
        target.current_work.goal = "B".into();
        target.conversation.decisions[0].rationale = Some("async io".into());
        target.conversation.blockers.push(Blocker::new("flaky CI"));
        target.code_changes.modified_files.clear();
        target.code_changes.modified_files.push("src/main.rs".into());
        target.touch("cursor");

        let diff = compare(&source, &target);

        assert_eq!(diff.metadata.len(), 1);
        assert_eq!(diff.metadata[0].key, "current_work.goal");
        assert_eq!(diff.metadata[0].old, Some(Value::from("A")));

        assert_eq!(diff.decisions.len(), 1);
        assert_eq!(diff.decisions[0].kind, ChangeKind::Modified);
        assert_eq!(diff.decisions[0].fields[0].field, "rationale");

        assert_eq!(diff.blockers[0].kind, ChangeKind::Added);

        let kinds: Vec<_> = diff.modified_files.iter().map(|c| (c.kind, c.key.as_str())).collect();
        assert_eq!(
            kinds,
            vec![(ChangeKind::Added, "src/main.rs"), (ChangeKind::Removed, "src/lib.rs")]
        );

        assert_eq!(diff.summary.added, 2);
        assert_eq!(diff.summary.removed, 1);
        assert_eq!(diff.summary.modified, 2);
        assert_eq!(diff.summary.total, 5);
        assert_eq!(diff.causality, ClockOrdering::Before);
    }

    #[test]
    fn test_compare_is_mirrored() {
        let source = base();
        let mut target = source.clone();
        target.conversation.decisions.push(Decision::new("use serde", None, None));

        let forward = compare(&source, &target);
        let backward = compare(&target, &source);
        assert_eq!(forward.summary.added, backward.summary.removed);
        assert_eq!(forward.summary.removed, backward.summary.added);
    }

    #[test]
    fn test_next_steps_matched_by_text() {
        let source = base();
        let mut target = source.clone();
        target.conversation.next_steps[0].done = true;
        let diff = compare(&source, &target);
        assert_eq!(diff.next_steps.len(), 1);
        assert_eq!(diff.next_steps[0].kind, ChangeKind::Modified);
        assert_eq!(diff.next_steps[0].key, "write tests");
    }
}
