//! Top-level orchestration: `(ownership, base, head) -> C1 -> C2 -> C3 ->
//! C4 -> C5 -> C6 -> StackResult` (spec.md §2's data flow).
//!
//! This is the one place that threads a [`CancellationToken`] across every
//! stage boundary and assembles the final [`PipelineOutcome`]; individual
//! stages stay independently testable in their own modules.

use newpr_git::{GitOid, GitRepo};

use crate::cancel::CancellationToken;
use crate::coupling::{self, CouplingRule};
use crate::error::EngineError;
use crate::execute::{self, ExecuteInput, Identity};
use crate::feasibility;
use crate::model::{Group, GroupId, Ownership, StackResult};
use crate::plan;
use crate::verify::{self, VerifyReport};

/// Everything the pipeline needs that isn't already implied by `base`/
/// `head`: the candidate groups, the classifier's (or caller's) initial
/// ownership assignment, coupling rules, author identity, and the branch
/// naming inputs the executor needs.
pub struct PipelineInput<'a> {
    pub base: GitOid,
    pub head: GitOid,
    pub initial_ownership: Ownership,
    pub groups: &'a [Group],
    pub coupling_rules: &'a [CouplingRule],
    pub identity: &'a Identity,
    pub pr_number: u64,
    pub source_slug: String,
}

/// The full result of one run: the executor's [`StackResult`] plus the
/// verifier's report, since a caller needs both to decide whether the
/// stack is publishable.
pub struct PipelineOutcome {
    pub result: StackResult,
    pub verification: VerifyReport,
}

/// Run the full pipeline to completion.
///
/// # Errors
/// Returns whatever [`EngineError`] the first failing stage produces.
/// [`EngineError::CycleDetected`] if C3 cannot find a feasible order,
/// [`EngineError::PlanMismatch`] if C5's re-simulation diverges from C4,
/// [`EngineError::Canceled`] if cancellation is observed between stages.
pub fn run(
    repo: &dyn GitRepo,
    input: PipelineInput<'_>,
    cancel: &CancellationToken,
) -> Result<PipelineOutcome, EngineError> {
    // C1 — Delta Extractor
    let deltas = crate::delta::extract_deltas(repo, input.base, input.head, cancel)?;
    cancel.check()?;

    // C2 — Coupling Enforcer
    let changed_paths: Vec<String> = deltas
        .iter()
        .flat_map(|d| d.changes.iter().map(|c| c.path.clone()))
        .collect();
    let group_order: Vec<GroupId> = input.groups.iter().map(|g| g.id.clone()).collect();
    let coupling_result = coupling::enforce(
        &input.initial_ownership,
        &changed_paths,
        &group_order,
        input.coupling_rules,
    );
    cancel.check()?;

    // C3 — Feasibility Analyzer
    let feasible = feasibility::analyze(&deltas, &coupling_result.ownership, input.groups)
        .map_err(|cycle| EngineError::CycleDetected { cycle: cycle.nodes })?;
    cancel.check()?;

    // C4 — Plan Builder
    let group_metadata: std::collections::HashMap<GroupId, (crate::model::GroupKind, String, Vec<String>)> =
        input
            .groups
            .iter()
            .map(|g| (g.id.clone(), (g.kind, g.description.clone(), g.files.clone())))
            .collect();
    let stack_plan = plan::build_plan(
        repo,
        input.base,
        input.head,
        &deltas,
        &coupling_result.ownership,
        &feasible.ordered_group_ids,
        &feasible.dependency_edges,
        &group_metadata,
        cancel,
    )?;
    cancel.check()?;

    // C5 — Stack Executor
    let execute_input = ExecuteInput {
        plan: &stack_plan,
        deltas: &deltas,
        ownership: &coupling_result.ownership,
        identity: input.identity,
        pr_number: input.pr_number,
        source_slug: input.source_slug,
    };
    let mut result = execute::execute(repo, &execute_input, cancel)?;

    // C6 — Verifier
    let report = verify::verify(repo, input.base, input.head, &result, &coupling_result.ownership)?;
    result.verified = report.verified;

    // A final-tree mismatch is fatal: roll back every ref this run created
    // rather than leave a stack the verifier rejected in place.
    if let Some(mismatch) = report.errors.iter().find_map(|e| match e {
        verify::VerifyError::FinalTreeMismatch { expected, actual } => Some((*expected, *actual)),
    }) {
        execute::rollback_result(repo, &result);
        let (expected, actual) = mismatch;
        return Err(EngineError::VerificationFailed {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    Ok(PipelineOutcome {
        result,
        verification: report,
    })
}
