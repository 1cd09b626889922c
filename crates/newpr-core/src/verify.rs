//! C6 — Verifier.
//!
//! Three independent checks over the executed [`crate::model::StackResult`],
//! each producing a typed violation — modeled on the teacher's
//! `maw-assurance::oracle` invariant checker shape (`check_g1`..`check_g6`),
//! adapted from a DST harness oracle into this pipeline's terminal
//! verification stage. Scope-leak and union-completeness violations are
//! warnings; only final-tree mismatch blocks publication (spec.md §7).

use std::collections::BTreeSet;

use newpr_git::{GitOid, GitRepo};

use crate::model::{Ownership, StackResult};

/// A warning-level violation: reported, never blocks publication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyWarning {
    /// A path changed in a group commit (relative to its DAG parents) that
    /// the ownership map does not assign to that group.
    ScopeLeak {
        group: String,
        path: String,
    },
    /// The union of per-group changed paths differs from the original
    /// `base -> head` diff.
    UnionMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
    },
}

/// An error-level violation: sets `verified = false`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// The last group commit's tree does not match the original head tree.
    FinalTreeMismatch { expected: GitOid, actual: GitOid },
}

/// The verifier's output.
pub struct VerifyReport {
    pub verified: bool,
    pub errors: Vec<VerifyError>,
    pub warnings: Vec<VerifyWarning>,
}

/// Run all three checks.
///
/// # Errors
/// Propagates [`newpr_git::GitError`] as [`crate::error::EngineError::ObjectStoreError`]
/// if a commit or diff read fails; this is distinct from a verification
/// *failure*, which is reported inside [`VerifyReport`] rather than as an
/// `Err`.
pub fn verify(
    repo: &dyn GitRepo,
    base: GitOid,
    head: GitOid,
    result: &StackResult,
    ownership: &Ownership,
) -> Result<VerifyReport, crate::error::EngineError> {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    let mut commit_of_group = std::collections::HashMap::new();
    for gc in &result.group_commits {
        commit_of_group.insert(gc.group_id.clone(), gc.commit_hash);
    }

    let mut union_changed: BTreeSet<String> = BTreeSet::new();

    for gc in &result.group_commits {
        let info = repo.read_commit(gc.commit_hash)?;
        let parent_trees: Vec<GitOid> = if info.parents.is_empty() {
            vec![]
        } else {
            info.parents
                .iter()
                .map(|p| repo.read_commit(*p).map(|c| c.tree_oid))
                .collect::<Result<_, _>>()?
        };

        // Diff against each DAG parent in turn; a path is "this group's
        // change" if it appears against at least one parent diff.
        let mut group_changed: BTreeSet<String> = BTreeSet::new();
        if parent_trees.is_empty() {
            for entry in repo.diff_trees(None, gc.tree_hash)? {
                group_changed.insert(entry.path);
            }
        } else {
            for parent_tree in parent_trees {
                for entry in repo.diff_trees(Some(parent_tree), gc.tree_hash)? {
                    group_changed.insert(entry.path);
                }
            }
        }

        for path in &group_changed {
            match ownership.get(path) {
                Some(owner) if owner == &gc.group_id => {}
                _ => warnings.push(VerifyWarning::ScopeLeak {
                    group: gc.group_id.as_str().to_owned(),
                    path: path.clone(),
                }),
            }
        }

        union_changed.extend(group_changed);
    }

    let base_tree = repo.read_commit(base)?.tree_oid;
    let head_tree_for_diff = repo.read_commit(head)?.tree_oid;
    let original_changed: BTreeSet<String> = repo
        .diff_trees(Some(base_tree), head_tree_for_diff)?
        .into_iter()
        .map(|e| e.path)
        .collect();

    let missing: Vec<String> = original_changed.difference(&union_changed).cloned().collect();
    let extra: Vec<String> = union_changed.difference(&original_changed).cloned().collect();
    if !missing.is_empty() || !extra.is_empty() {
        warnings.push(VerifyWarning::UnionMismatch { missing, extra });
    }

    let head_tree = repo.read_commit(head)?.tree_oid;
    if result.final_tree_hash != head_tree {
        errors.push(VerifyError::FinalTreeMismatch {
            expected: head_tree,
            actual: result.final_tree_hash,
        });
    }

    Ok(VerifyReport {
        verified: errors.is_empty(),
        errors,
        warnings,
    })
}
