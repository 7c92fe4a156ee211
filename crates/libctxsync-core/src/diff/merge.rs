use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::clock::ClockOrdering;
use crate::types::{CodeChanges, ConversationSummary, CurrentWork, SharedContext};
use super::compare::{handoff_key, next_step_key};
use super::{
    field_changes, to_value, Category, Conflict, Identified, ListStrategy, MergeOptions,
    MergeResult, ScalarStrategy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Source,
    Target,
}

/// Merge `source` into `target`.
///
/// On success the merged context's version is one greater than the
/// larger input version and its clock is the pointwise maximum of both
/// clocks. Id-matched entities that differ under the `union` strategy are
/// reported as conflicts and no merged value is produced, unless causal
/// resolution is enabled and one side's clock strictly dominates.
pub fn merge(source: &SharedContext, target: &SharedContext, options: &MergeOptions) -> MergeResult {
    let causality = source.clock.compare(&target.clock);
    let superseding = if options.causal {
        match causality {
            ClockOrdering::After => Some(Side::Source),
            ClockOrdering::Before => Some(Side::Target),
            ClockOrdering::Equal | ClockOrdering::Concurrent => None,
        }
    } else {
        None
    };

    let mut conflicts = Vec::new();

    let decisions = merge_by_id(
        Category::Decisions,
        &source.conversation.decisions,
        &target.conversation.decisions,
        options.decisions,
        superseding,
        &mut conflicts,
    );
    let approaches = merge_by_id(
        Category::Approaches,
        &source.conversation.approaches,
        &target.conversation.approaches,
        options.approaches,
        superseding,
        &mut conflicts,
    );
    let blockers = merge_by_id(
        Category::Blockers,
        &source.conversation.blockers,
        &target.conversation.blockers,
        options.blockers,
        superseding,
        &mut conflicts,
    );

    if !conflicts.is_empty() {
        debug!(
            conflicts = conflicts.len(),
            causality = causality.as_str(),
            "merge produced conflicts"
        );
        return MergeResult {
            success: false,
            merged: None,
            conflicts,
            causality,
        };
    }

    let next_steps = merge_by_key(
        &source.conversation.next_steps,
        &target.conversation.next_steps,
        next_step_key,
        options.next_steps,
        superseding,
    );
    let handoffs = merge_by_key(
        &source.handoffs,
        &target.handoffs,
        handoff_key,
        options.handoffs,
        superseding,
    );
    let modified_files = merge_by_key(
        &source.code_changes.modified_files,
        &target.code_changes.modified_files,
        |f: &String| f.clone(),
        options.modified_files,
        superseding,
    );

    let scalar_side = match options.metadata {
        ScalarStrategy::TargetWins => Side::Target,
        ScalarStrategy::SourceWins => Side::Source,
        ScalarStrategy::Newest => {
            if source.updated_at > target.updated_at {
                Side::Source
            } else {
                Side::Target
            }
        }
    };
    let scalars = match scalar_side {
        Side::Source => source,
        Side::Target => target,
    };

    let mut clock = source.clock.merge(&target.clock);
    if let Some(agent) = &options.merging_agent {
        clock = clock.increment(agent);
    }

    let now = Utc::now();
    let merged = SharedContext {
        id: target.id.clone(),
        project_path: scalars.project_path.clone(),
        current_work: CurrentWork {
            goal: scalars.current_work.goal.clone(),
            status: scalars.current_work.status,
            started_at: source.current_work.started_at.min(target.current_work.started_at),
            last_activity_at: source
                .current_work
                .last_activity_at
                .max(target.current_work.last_activity_at),
            active_files: scalars.current_work.active_files.clone(),
        },
        conversation: ConversationSummary {
            decisions,
            approaches,
            blockers,
            next_steps,
        },
        code_changes: CodeChanges {
            modified_files,
            summary: scalars.code_changes.summary.clone(),
            uncommitted: scalars.code_changes.uncommitted,
            updated_at: source.code_changes.updated_at.max(target.code_changes.updated_at),
        },
        handoffs,
        version: source.version.max(target.version) + 1,
        clock,
        created_at: source.created_at.min(target.created_at),
        updated_at: now,
    };

    MergeResult {
        success: true,
        merged: Some(merged),
        conflicts: Vec::new(),
        causality,
    }
}

fn merge_by_id<T: Identified>(
    category: Category,
    source: &[T],
    target: &[T],
    strategy: ListStrategy,
    superseding: Option<Side>,
    conflicts: &mut Vec<Conflict>,
) -> Vec<T> {
    let source_index: HashMap<&str, &T> = source.iter().map(|e| (e.entity_id(), e)).collect();
    let target_ids: HashSet<&str> = target.iter().map(|e| e.entity_id()).collect();

    let mut merged: Vec<T> = Vec::with_capacity(source.len().max(target.len()));
    let mut emitted = HashSet::new();

    for t in target {
        if !emitted.insert(t.entity_id()) {
            continue;
        }
        let chosen = match source_index.get(t.entity_id()) {
            Some(s) if *s != t => {
                let winner = match strategy {
                    ListStrategy::SourceWins => Some(Side::Source),
                    ListStrategy::TargetWins => Some(Side::Target),
                    ListStrategy::Union => superseding,
                };
                match winner {
                    Some(Side::Source) => (*s).clone(),
                    Some(Side::Target) => t.clone(),
                    None => {
                        let (sv, tv) = (to_value(*s), to_value(t));
                        conflicts.push(Conflict {
                            category,
                            key: t.entity_id().to_string(),
                            path: format!("{}[{}]", category.path(), t.entity_id()),
                            fields: field_changes(&sv, &tv),
                            source: sv,
                            target: tv,
                        });
                        t.clone()
                    }
                }
            }
            _ => t.clone(),
        };
        merged.push(chosen);
    }

    for s in source {
        if !target_ids.contains(s.entity_id()) && emitted.insert(s.entity_id()) {
            merged.push(s.clone());
        }
    }

    // Interleave both sides chronologically; stable for equal timestamps
    merged.sort_by_key(|e| e.created_at());
    merged
}

fn merge_by_key<T, F>(
    source: &[T],
    target: &[T],
    key: F,
    strategy: ListStrategy,
    superseding: Option<Side>,
) -> Vec<T>
where
    T: Serialize + Clone + PartialEq,
    F: Fn(&T) -> String,
{
    let source_index: HashMap<String, &T> = source.iter().map(|e| (key(e), e)).collect();
    let prefer_source = match strategy {
        ListStrategy::SourceWins => true,
        ListStrategy::TargetWins => false,
        ListStrategy::Union => superseding == Some(Side::Source),
    };

    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(source.len().max(target.len()));
    for t in target {
        let k = key(t);
        if !seen.insert(k.clone()) {
            continue;
        }
        match source_index.get(&k) {
            Some(s) if prefer_source => merged.push((*s).clone()),
            _ => merged.push(t.clone()),
        }
    }
    for s in source {
        if seen.insert(key(s)) {
            merged.push(s.clone());
        }
    }
    merged
}
