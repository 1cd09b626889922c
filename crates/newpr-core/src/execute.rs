//! C5 — Stack Executor.
//!
//! Materialises the [`crate::plan::StackPlan`] into real commits and branch
//! refs. The run is a linear state machine — `PARTITIONING -> PLANNING ->
//! EXECUTING -> DONE`, with an absorbing `ERROR` and a cooperative
//! `CANCELED` reachable from any non-terminal state — modeled directly on
//! the teacher's `MergePhase` (`Prepare -> Build -> Validate -> Commit ->
//! Cleanup -> Complete`, absorbing `Aborted`).

use std::collections::HashMap;

use newpr_git::{GitOid, GitRepo, RefEdit, RefName};
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::EngineError;
use crate::model::{Delta, GroupId, Ownership, RunId};
use crate::plan::StackPlan;

/// The executor's run state. Persisted inside a session snapshot via the
/// same atomic write-temp-fsync-rename pattern the teacher's
/// `MergeStateFile` uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    /// Re-simulating the plan and preparing the source-copy ref.
    Partitioning,
    /// Computing tree hashes (kept distinct from `Partitioning` to mirror
    /// the plan/execute split even though both run inside this stage).
    Planning,
    /// Building commits, refs, and branches for each group.
    Executing,
    /// Every group committed and verified; terminal success.
    Done,
    /// A step failed and rollback has been attempted; terminal failure.
    Error,
    /// Cancellation was observed; terminal, not a failure for telemetry.
    Canceled,
}

impl RunPhase {
    /// `true` for `Done`, `Error`, and `Canceled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Canceled)
    }

    /// The set of phases reachable directly from this one.
    #[must_use]
    pub const fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Partitioning => &[Self::Planning, Self::Error, Self::Canceled],
            Self::Planning => &[Self::Executing, Self::Error, Self::Canceled],
            Self::Executing => &[Self::Done, Self::Error, Self::Canceled],
            Self::Done | Self::Error | Self::Canceled => &[],
        }
    }

    /// Check whether transitioning to `next` is valid.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Author/committer identity threaded through every group commit.
#[derive(Clone, Debug)]
pub struct Identity {
    pub author: String,
    pub committer: String,
}

/// Inputs the executor needs beyond the plan itself.
pub struct ExecuteInput<'a> {
    pub plan: &'a StackPlan,
    pub deltas: &'a [Delta],
    pub ownership: &'a Ownership,
    pub identity: &'a Identity,
    pub pr_number: u64,
    pub source_slug: String,
}

/// Run the Stack Executor to completion.
///
/// # Errors
/// Returns [`EngineError::PlanMismatch`] if the re-simulated tree for a
/// group diverges from the plan's expected tree. Returns
/// [`EngineError::ObjectStoreError`] on any backend failure, and
/// [`EngineError::Canceled`] if cancellation is observed; in both cases
/// every ref created so far is deleted on a best-effort basis before the
/// error is returned.
pub fn execute(
    repo: &dyn GitRepo,
    input: &ExecuteInput<'_>,
    cancel: &CancellationToken,
) -> Result<crate::model::StackResult, EngineError> {
    let run_id = RunId::generate();
    let mut created_refs: Vec<RefName> = Vec::new();

    let result = run_phases(repo, input, &run_id, &mut created_refs, cancel);

    match result {
        Ok(stack_result) => Ok(stack_result),
        Err(err) => {
            rollback(repo, &created_refs);
            Err(err)
        }
    }
}

fn run_phases(
    repo: &dyn GitRepo,
    input: &ExecuteInput<'_>,
    run_id: &RunId,
    created_refs: &mut Vec<RefName>,
    cancel: &CancellationToken,
) -> Result<crate::model::StackResult, EngineError> {
    let mut phase = RunPhase::Partitioning;
    cancel.check()?;

    let source_copy_ref = make_source_copy_ref(repo, input.plan.head, created_refs)?;

    phase = advance(phase, RunPhase::Planning);
    cancel.check()?;

    // Re-run the same simulation C4 ran, and fail fast on any divergence
    // (step 2 of §4.5).
    let resim = crate::plan::build_plan(
        repo,
        input.plan.base,
        input.plan.head,
        input.deltas,
        input.ownership,
        &input.plan.groups.iter().map(|g| g.id.clone()).collect::<Vec<_>>(),
        &dependency_edges_from_plan(input.plan),
        &group_metadata_from_plan(input.plan),
        cancel,
    )?;
    for group in &input.plan.groups {
        let expected = input.plan.expected_trees[&group.id];
        let actual = resim.expected_trees[&group.id];
        if expected != actual {
            return Err(EngineError::PlanMismatch {
                group: group.id.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }

    phase = advance(phase, RunPhase::Executing);
    cancel.check()?;

    let mut commit_of: HashMap<GroupId, GitOid> = HashMap::new();
    let mut group_commits = Vec::with_capacity(input.plan.groups.len());

    for group in &input.plan.groups {
        cancel.check()?;

        let parents: Vec<GitOid> = if group.deps.is_empty() {
            vec![input.plan.base]
        } else {
            group
                .deps
                .iter()
                .map(|dep| {
                    commit_of
                        .get(dep)
                        .copied()
                        .expect("groups are executed in topological order, so deps already have commits")
                })
                .collect()
        };

        let message = format!("{}({}): {}", group.kind.slug(), group.id.as_str(), group.description);
        let commit_hash = repo.create_commit(
            group.expected_tree,
            &parents,
            &input.identity.author,
            &input.identity.committer,
            &message,
        )?;
        commit_of.insert(group.id.clone(), commit_hash);

        let branch_ref = branch_ref_name(
            input.pr_number,
            &input.source_slug,
            group.order,
            group.kind.slug(),
            group.id.as_str(),
            run_id,
        )?;

        repo.atomic_ref_update(&[RefEdit {
            name: branch_ref.clone(),
            new_oid: commit_hash,
            expected_old_oid: GitOid::ZERO,
        }])?;
        created_refs.push(branch_ref.clone());

        group_commits.push(crate::model::GroupCommit {
            group_id: group.id.clone(),
            commit_hash,
            tree_hash: group.expected_tree,
            branch_ref,
        });
    }

    let final_tree_hash = input
        .plan
        .groups
        .last()
        .map_or(input.plan.base, |g| g.expected_tree);

    phase = advance(phase, RunPhase::Done);
    debug_assert_eq!(phase, RunPhase::Done);

    Ok(crate::model::StackResult {
        run_id: run_id.clone(),
        source_copy_ref,
        group_commits,
        final_tree_hash,
        verified: false,
    })
}

fn advance(current: RunPhase, next: RunPhase) -> RunPhase {
    debug_assert!(
        current.can_transition_to(next),
        "invalid transition {current:?} -> {next:?}"
    );
    next
}

fn make_source_copy_ref(
    repo: &dyn GitRepo,
    head: GitOid,
    created_refs: &mut Vec<RefName>,
) -> Result<RefName, EngineError> {
    let name = RefName::new(&format!("refs/newpr-stack/source-copy/{head}"))
        .map_err(|e| EngineError::ObjectStoreError(newpr_git::GitError::BackendError {
            message: e.to_string(),
        }))?;
    repo.atomic_ref_update(&[RefEdit {
        name: name.clone(),
        new_oid: head,
        expected_old_oid: GitOid::ZERO,
    }])?;
    created_refs.push(name.clone());
    Ok(name)
}

/// `newpr-stack/pr-<N>/<sourceSlug>/<NN-orderedIndex>-<kindSlug>-<topicSlug>-<random6>`
/// (§4.5 step 4).
fn branch_ref_name(
    pr_number: u64,
    source_slug: &str,
    order: usize,
    kind_slug: &str,
    topic_slug: &str,
    run_id: &RunId,
) -> Result<RefName, EngineError> {
    let suffix = random_suffix(RunId::LEN);
    let _ = run_id; // the run id identifies the session; the branch name carries its own suffix
    let name = format!(
        "refs/heads/newpr-stack/pr-{pr_number}/{source_slug}/{order:02}-{kind_slug}-{topic_slug}-{suffix}"
    );
    RefName::new(&name).map_err(|e| {
        EngineError::ObjectStoreError(newpr_git::GitError::BackendError {
            message: e.to_string(),
        })
    })
}

/// Best-effort rollback: delete every ref created so far, ignoring
/// individual failures (§4.5 step 5) — same shape as the teacher's
/// worktree/merge rollback teardown.
fn rollback(repo: &dyn GitRepo, created_refs: &[RefName]) {
    for name in created_refs.iter().rev() {
        if let Err(err) = repo.delete_ref(name) {
            tracing::warn!(ref_name = %name.as_str(), error = %err, "rollback failed to delete ref");
        }
    }
}

/// Roll back every ref a completed [`crate::model::StackResult`] created:
/// each group's branch ref, then the source-copy ref. Used by the
/// orchestrator when the Verifier rejects an otherwise-successful run.
pub(crate) fn rollback_result(repo: &dyn GitRepo, result: &crate::model::StackResult) {
    let mut created_refs: Vec<RefName> = result
        .group_commits
        .iter()
        .map(|gc| gc.branch_ref.clone())
        .collect();
    created_refs.push(result.source_copy_ref.clone());
    rollback(repo, &created_refs);
}

fn dependency_edges_from_plan(plan: &StackPlan) -> Vec<crate::model::ConstraintEdge> {
    plan.groups
        .iter()
        .flat_map(|g| {
            g.deps.iter().map(move |dep| crate::model::ConstraintEdge::Dependency {
                from: dep.clone(),
                to: g.id.clone(),
            })
        })
        .collect()
}

fn group_metadata_from_plan(
    plan: &StackPlan,
) -> HashMap<GroupId, (crate::model::GroupKind, String, Vec<String>)> {
    plan.groups
        .iter()
        .map(|g| (g.id.clone(), (g.kind, g.description.clone(), g.files.clone())))
        .collect()
}

/// A random lowercase-alphanumeric suffix drawn from the same
/// visually-unambiguous alphabet [`RunId`](crate::model::RunId) uses
/// (excludes `0`, `1`, `l`, `o`), shared between run ids and branch names.
pub(crate) fn random_suffix(len: usize) -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..crate::model::SUFFIX_ALPHABET.len());
            crate::model::SUFFIX_ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_transitions_follow_the_linear_path() {
        assert!(RunPhase::Partitioning.can_transition_to(RunPhase::Planning));
        assert!(RunPhase::Planning.can_transition_to(RunPhase::Executing));
        assert!(RunPhase::Executing.can_transition_to(RunPhase::Done));
        assert!(!RunPhase::Done.can_transition_to(RunPhase::Partitioning));
    }

    #[test]
    fn error_and_canceled_reachable_from_every_non_terminal_phase() {
        for phase in [RunPhase::Partitioning, RunPhase::Planning, RunPhase::Executing] {
            assert!(phase.can_transition_to(RunPhase::Error));
            assert!(phase.can_transition_to(RunPhase::Canceled));
        }
    }

    #[test]
    fn terminal_phases_have_no_transitions() {
        assert!(RunPhase::Done.valid_transitions().is_empty());
        assert!(RunPhase::Error.valid_transitions().is_empty());
        assert!(RunPhase::Canceled.valid_transitions().is_empty());
    }

    #[test]
    fn random_suffix_has_requested_length_and_alphabet() {
        let s = random_suffix(6);
        assert_eq!(s.len(), 6);
        assert!(s.bytes().all(|b| crate::model::SUFFIX_ALPHABET.contains(&b)));
    }

    #[test]
    fn branch_ref_name_has_expected_shape() {
        let run_id = RunId::generate();
        let name = branch_ref_name(42, "main", 3, "feature", "auth", &run_id).unwrap();
        let s = name.as_str();
        assert!(s.starts_with("refs/heads/newpr-stack/pr-42/main/03-feature-auth-"));
    }
}
