//! Core data-model types shared across every pipeline stage.
//!
//! These are plain data: stages build them, hand them off by value, and
//! never share a mutable reference to one across a stage boundary.

use std::collections::BTreeMap;
use std::fmt;

use newpr_git::{GitOid, RefName};
use serde::{Deserialize, Serialize};

use super::GroupId;

// ---------------------------------------------------------------------------
// FileChange / Delta
// ---------------------------------------------------------------------------

/// The kind of change a [`FileChange`] represents.
///
/// A tagged variant per status rather than nullable fields — `Renamed` is
/// the only variant that carries an `old_path`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChangeStatus {
    /// The path did not exist on the parent side.
    Added,
    /// The path exists on both sides with different content or mode.
    Modified,
    /// The path existed on the parent side only.
    Deleted,
    /// The path was renamed from `old_path`, and may also carry content or
    /// mode changes.
    Renamed {
        /// The path before the rename.
        old_path: String,
    },
}

impl ChangeStatus {
    /// The original path before this change, if this is a rename.
    #[must_use]
    pub fn old_path(&self) -> Option<&str> {
        match self {
            Self::Renamed { old_path } => Some(old_path.as_str()),
            Self::Added | Self::Modified | Self::Deleted => None,
        }
    }
}

/// One record per `(commit, path)` change produced by [`crate::delta`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// What happened to this path.
    pub status: ChangeStatus,
    /// The path after the change (or the only path, for non-renames).
    pub path: String,
    /// Blob OID on the parent side. [`GitOid::ZERO`] if the path did not
    /// exist there.
    pub old_blob: GitOid,
    /// Blob OID on this commit's side. [`GitOid::ZERO`] if the path was
    /// deleted.
    pub new_blob: GitOid,
    /// File mode on the parent side. `None` if the path did not exist
    /// there.
    pub old_mode: Option<newpr_git::EntryMode>,
    /// File mode on this commit's side. `None` if the path was deleted.
    pub new_mode: Option<newpr_git::EntryMode>,
}

/// A commit's worth of changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// The commit this delta was extracted from.
    pub commit_id: GitOid,
    /// The commit's first parent (the diff base).
    pub parent_id: GitOid,
    /// Author display name (`"Unknown"` if unset upstream).
    pub author: String,
    /// ISO-8601 author date.
    pub date: String,
    /// The commit message subject line.
    pub message: String,
    /// The file-level changes in this commit, relative to `parent_id`.
    pub changes: Vec<FileChange>,
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// The declared category of a [`Group`], used to build PR titles and branch
/// name slugs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// A new capability.
    Feature,
    /// A behavior-preserving restructuring.
    Refactor,
    /// A defect fix.
    Bugfix,
    /// Maintenance work with no user-visible behavior change.
    Chore,
    /// Documentation-only changes.
    Docs,
    /// Test-only changes.
    Test,
    /// Build, tooling, or dependency configuration.
    Config,
}

impl GroupKind {
    /// The short slug used in generated branch names and fallback titles
    /// (e.g. `"feat"`, `"fix"`).
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Feature => "feat",
            Self::Refactor => "refactor",
            Self::Bugfix => "fix",
            Self::Chore => "chore",
            Self::Docs => "docs",
            Self::Test => "test",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// A named bucket of changed paths, declared by the classifier or the
/// caller. Group IDs are stable across the whole pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique, stable identifier.
    pub id: GroupId,
    /// The group's category.
    pub kind: GroupKind,
    /// Short human-readable description, used in generated commit messages.
    pub description: String,
    /// Paths this group owns at declaration time. The authoritative
    /// assignment after coupling enforcement lives in [`Ownership`], not
    /// here — this list is the classifier's (or caller's) initial input.
    pub files: Vec<String>,
    /// IDs of groups this group depends on (its content must be present
    /// first).
    pub explicit_deps: Vec<GroupId>,
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

/// A total function `path -> group_id`, defined over every path appearing
/// in any [`Delta`] (after rename propagation).
///
/// Built once per pipeline run and handed to downstream stages as a
/// read-only view; no stage mutates another stage's copy in place — the
/// Coupling Enforcer returns a revised [`Ownership`] rather than editing
/// this one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    assignments: BTreeMap<String, GroupId>,
}

impl Ownership {
    /// An empty ownership map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the group owning `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&GroupId> {
        self.assignments.get(path)
    }

    /// Returns `true` if `path` has an owner.
    #[must_use]
    pub fn is_owned(&self, path: &str) -> bool {
        self.assignments.contains_key(path)
    }

    /// Assign `path` to `group`, overwriting any previous assignment.
    pub fn assign(&mut self, path: impl Into<String>, group: GroupId) {
        self.assignments.insert(path.into(), group);
    }

    /// Iterate over all `(path, group_id)` assignments in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &GroupId)> {
        self.assignments.iter().map(|(p, g)| (p.as_str(), g))
    }

    /// Number of owned paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// `true` if no path is owned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ConstraintEdge
// ---------------------------------------------------------------------------

/// Supporting evidence for a [`ConstraintEdge`] of kind `PathOrder`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathOrderEvidence {
    /// The path whose touch sequence produced this edge.
    pub path: String,
    /// The commit that last touched `from`'s side.
    pub from_commit: GitOid,
    /// The commit that first touched `to`'s side.
    pub to_commit: GitOid,
}

/// A directed edge in the inter-group constraint graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintEdge {
    /// Synthesized from the commit-order sequence of groups touching a
    /// shared path.
    PathOrder {
        /// Source group.
        from: GroupId,
        /// Destination group (must come after `from`).
        to: GroupId,
        /// The path and commits that produced this edge.
        evidence: PathOrderEvidence,
    },
    /// Declared by a [`Group::explicit_deps`] entry.
    Dependency {
        /// Source group (the dependency).
        from: GroupId,
        /// Destination group (the dependent).
        to: GroupId,
    },
}

impl ConstraintEdge {
    /// The source group of this edge.
    #[must_use]
    pub const fn from(&self) -> &GroupId {
        match self {
            Self::PathOrder { from, .. } | Self::Dependency { from, .. } => from,
        }
    }

    /// The destination group of this edge.
    #[must_use]
    pub const fn to(&self) -> &GroupId {
        match self {
            Self::PathOrder { to, .. } | Self::Dependency { to, .. } => to,
        }
    }
}

// ---------------------------------------------------------------------------
// StackGroup / StackResult
// ---------------------------------------------------------------------------

/// Per-group line-level statistics, filled in after execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    /// Lines added across all files in this group's commit.
    pub additions: u64,
    /// Lines deleted across all files in this group's commit.
    pub deletions: u64,
    /// Number of files added.
    pub files_added: u64,
    /// Number of files modified (including renames with content changes).
    pub files_modified: u64,
    /// Number of files deleted.
    pub files_deleted: u64,
}

/// Post-plan entity: a group together with its position in the stack and
/// its expected tree hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackGroup {
    /// The group's stable id.
    pub id: GroupId,
    /// The group's category.
    pub kind: GroupKind,
    /// Human-readable description.
    pub description: String,
    /// Paths owned by this group.
    pub files: Vec<String>,
    /// IDs of this group's DAG parents (dependencies).
    pub deps: Vec<GroupId>,
    /// Zero-based position in the deterministic topological order.
    pub order: usize,
    /// The tree hash this group's commit must produce.
    pub expected_tree: GitOid,
    /// Line/file statistics, populated by the Verifier.
    pub stats: GroupStats,
}

/// One materialised group commit in the final stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCommit {
    /// The group this commit belongs to.
    pub group_id: GroupId,
    /// The synthesized commit's OID.
    pub commit_hash: GitOid,
    /// The commit's tree OID (matches the group's `expected_tree` on
    /// success).
    pub tree_hash: GitOid,
    /// The branch reference created for this group.
    pub branch_ref: RefName,
}

/// The terminal output of a pipeline run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackResult {
    /// This run's identifier.
    pub run_id: super::RunId,
    /// Reference created at the start of execution, pointing at the
    /// original head, kept for auditing and rollback.
    pub source_copy_ref: RefName,
    /// One entry per group, in stack order.
    pub group_commits: Vec<GroupCommit>,
    /// Tree hash of the last group commit in the stack.
    pub final_tree_hash: GitOid,
    /// `true` iff the Verifier found no error-level violations.
    pub verified: bool,
}
