//! C4 — Plan Builder.
//!
//! Computes, for every group, the exact tree hash the stack must reach at
//! that group's position: "N parallel simulated indices with
//! ancestor-closed propagation" (§4.4). Each group gets one scratch *tree*
//! oid threaded through [`GitRepo::edit_tree`], reusing the same
//! upsert/remove primitive the teacher's N-way merge BUILD step uses,
//! rather than a literal in-memory path map. Ancestor-closed propagation —
//! applying a change to a group's scratch tree and every one of its DAG
//! ancestors' scratch trees — is computed once via BFS and then replayed
//! as a plain loop.

use std::collections::{HashMap, HashSet};

use newpr_git::{EntryMode, GitOid, GitRepo, TreeEdit};

use crate::cancel::CancellationToken;
use crate::error::EngineError;
use crate::model::{ChangeStatus, ConstraintEdge, Delta, GroupId, GroupKind, GroupStats, Ownership, StackGroup};

/// The output of plan building: everything C5 needs to re-simulate,
/// validate against, and then materialise for real.
pub struct StackPlan {
    pub base: GitOid,
    pub head: GitOid,
    /// One entry per group, in deterministic topological order, with
    /// `stats` left at its zero default (populated later by the verifier).
    pub groups: Vec<StackGroup>,
    /// Expected tree hash per group, the authoritative planning output.
    pub expected_trees: HashMap<GroupId, GitOid>,
    /// DAG-ancestor set per group (transitive, includes only other groups,
    /// never the group itself).
    pub ancestor_sets: HashMap<GroupId, HashSet<GroupId>>,
}

/// Build a [`StackPlan`].
///
/// `ordered_group_ids` and `dependency_edges` come from the Feasibility
/// Analyzer (C3). A group with no incoming edge in `dependency_edges`
/// defaults to depending on its immediate linear predecessor in
/// `ordered_group_ids` (§4.4) — the first group in order has no parent at
/// all, i.e. its ancestor set is empty and it plans directly off `base`.
///
/// # Errors
/// Propagates any [`newpr_git::GitError`] as [`EngineError::ObjectStoreError`],
/// and [`EngineError::Canceled`] if `cancel` is observed mid-replay.
pub fn build_plan(
    repo: &dyn GitRepo,
    base: GitOid,
    head: GitOid,
    deltas: &[Delta],
    ownership: &Ownership,
    ordered_group_ids: &[GroupId],
    dependency_edges: &[ConstraintEdge],
    group_kinds: &HashMap<GroupId, (GroupKind, String, Vec<String>)>,
    cancel: &CancellationToken,
) -> Result<StackPlan, EngineError> {
    let dag_parents = resolve_dag_parents(ordered_group_ids, dependency_edges);
    let ancestor_sets = compute_ancestor_sets(ordered_group_ids, &dag_parents);

    let mut scratch: HashMap<GroupId, GitOid> = ordered_group_ids
        .iter()
        .map(|g| (g.clone(), base))
        .collect();

    for delta in deltas {
        cancel.check()?;
        for change in &delta.changes {
            let Some(owner) = ownership.get(&change.path) else {
                continue;
            };
            let edits = edits_for_change(change);
            if edits.is_empty() {
                continue;
            }
            let targets = propagation_targets(owner, &ancestor_sets);
            for target in targets {
                let current = *scratch
                    .get(&target)
                    .expect("every group in ordered_group_ids has a scratch entry");
                let next = repo.edit_tree(current, &edits)?;
                scratch.insert(target, next);
            }
        }
    }

    let mut groups = Vec::with_capacity(ordered_group_ids.len());
    let mut expected_trees = HashMap::new();
    for (order, id) in ordered_group_ids.iter().enumerate() {
        let tree = scratch[id];
        expected_trees.insert(id.clone(), tree);
        let (kind, description, files) = group_kinds
            .get(id)
            .cloned()
            .unwrap_or((GroupKind::Chore, String::new(), Vec::new()));
        groups.push(StackGroup {
            id: id.clone(),
            kind,
            description,
            files,
            deps: dag_parents.get(id).cloned().unwrap_or_default(),
            order,
            expected_tree: tree,
            stats: GroupStats::default(),
        });
    }

    Ok(StackPlan {
        base,
        head,
        groups,
        expected_trees,
        ancestor_sets,
    })
}

/// One group's DAG parents: every group with a `Dependency` or `PathOrder`
/// edge pointing at it, or — if it has none — its immediate linear
/// predecessor in `ordered_group_ids` (§4.4's default).
fn resolve_dag_parents(
    ordered_group_ids: &[GroupId],
    dependency_edges: &[ConstraintEdge],
) -> HashMap<GroupId, Vec<GroupId>> {
    let mut parents: HashMap<GroupId, Vec<GroupId>> = HashMap::new();
    for edge in dependency_edges {
        parents
            .entry(edge.to().clone())
            .or_default()
            .push(edge.from().clone());
    }
    for entry in parents.values_mut() {
        entry.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        entry.dedup();
    }

    for (i, id) in ordered_group_ids.iter().enumerate() {
        if !parents.contains_key(id) && i > 0 {
            parents.insert(id.clone(), vec![ordered_group_ids[i - 1].clone()]);
        } else {
            parents.entry(id.clone()).or_default();
        }
    }
    parents
}

/// BFS the DAG-parent edges to the transitive ancestor set of every group.
fn compute_ancestor_sets(
    ordered_group_ids: &[GroupId],
    dag_parents: &HashMap<GroupId, Vec<GroupId>>,
) -> HashMap<GroupId, HashSet<GroupId>> {
    let mut sets = HashMap::new();
    for id in ordered_group_ids {
        let mut visited = HashSet::new();
        let mut queue: std::collections::VecDeque<GroupId> =
            dag_parents.get(id).cloned().unwrap_or_default().into();
        while let Some(parent) = queue.pop_front() {
            if visited.insert(parent.clone()) {
                for grandparent in dag_parents.get(&parent).cloned().unwrap_or_default() {
                    queue.push_back(grandparent);
                }
            }
        }
        sets.insert(id.clone(), visited);
    }
    sets
}

/// Every group whose scratch tree must receive this change: the owning
/// group itself, plus every group that has it as a DAG ancestor.
fn propagation_targets(
    owner: &GroupId,
    ancestor_sets: &HashMap<GroupId, HashSet<GroupId>>,
) -> Vec<GroupId> {
    let mut targets = vec![owner.clone()];
    for (group, ancestors) in ancestor_sets {
        if ancestors.contains(owner) {
            targets.push(group.clone());
        }
    }
    targets
}

/// Translate one [`crate::model::FileChange`] into the tree edits that
/// reproduce it (§4.4's apply semantics).
fn edits_for_change(change: &crate::model::FileChange) -> Vec<TreeEdit> {
    match &change.status {
        ChangeStatus::Added | ChangeStatus::Modified => vec![upsert(change)],
        ChangeStatus::Deleted => vec![TreeEdit::Remove {
            path: change.path.clone(),
        }],
        ChangeStatus::Renamed { old_path } => vec![
            TreeEdit::Remove {
                path: old_path.clone(),
            },
            upsert(change),
        ],
    }
}

fn upsert(change: &crate::model::FileChange) -> TreeEdit {
    TreeEdit::Upsert {
        path: change.path.clone(),
        mode: change.new_mode.unwrap_or(EntryMode::Blob),
        oid: change.new_blob,
    }
}
