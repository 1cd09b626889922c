//! Error taxonomy for the stacking pipeline.
//!
//! [`EngineError`] is the single error type returned by every pipeline
//! stage. Callers discriminate by variant, never by message — every
//! message is freeform and may change between releases.

use thiserror::Error;

use crate::model::GroupId;

/// Errors returned by the stacking pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The commit range contains a merge commit, a submodule entry
    /// (`160000`), or a symlink entry (`120000`). Fatal, non-retryable —
    /// the caller must narrow the range or resolve the unsupported entry
    /// before trying again.
    #[error("unsupported history at {commit}: {detail}")]
    UnsupportedHistory {
        /// The commit (hex OID) where the unsupported shape was found.
        commit: String,
        /// What was unsupported (e.g. "merge commit", "submodule entry at path").
        detail: String,
    },

    /// A read or write against the content store failed. The whole
    /// pipeline may be retried once the underlying cause is fixed.
    #[error("object store error: {0}")]
    ObjectStoreError(#[from] newpr_git::GitError),

    /// The classifier produced unparseable output, or left paths
    /// unclassifiable even after the deterministic fallback ran. This is
    /// surfaced to callers as a hard error only when no fallback
    /// assignment could be produced at all; ordinary fallback use is a
    /// warning, not this variant.
    #[error("classification failed: {detail}")]
    ClassificationFailure {
        /// What went wrong (e.g. "classifier returned invalid JSON and no schema repair succeeded").
        detail: String,
    },

    /// The Feasibility Analyzer found a dependency cycle that path-order
    /// evidence does not resolve.
    #[error("dependency cycle detected: {}", cycle.iter().map(GroupId::as_str).collect::<Vec<_>>().join(" -> "))]
    CycleDetected {
        /// The groups in the cycle, in traversal order.
        cycle: Vec<GroupId>,
    },

    /// The Stack Executor produced a tree for a group that differs from
    /// the tree planned by the Plan Builder. Indicates a bug in either
    /// stage — the two must simulate identically.
    #[error("plan mismatch for group `{group}`: expected tree {expected}, got {actual}")]
    PlanMismatch {
        /// The group whose executed tree diverged.
        group: GroupId,
        /// The tree hash the Plan Builder predicted.
        expected: String,
        /// The tree hash the Stack Executor actually produced.
        actual: String,
    },

    /// The final group commit's tree hash does not equal the tree hash of
    /// the original head commit. Fatal: every ref created during execution
    /// is rolled back before this is returned.
    #[error("verification failed: final tree {actual} does not match head tree {expected}")]
    VerificationFailed {
        /// The tree hash of the original head commit.
        expected: String,
        /// The tree hash actually produced by the last group commit.
        actual: String,
    },

    /// Cooperative cancellation was observed between pipeline stages.
    /// Terminal, not a failure for telemetry purposes, but distinguishable
    /// so callers don't report it as an error.
    #[error("run canceled")]
    Canceled,

    /// The engine configuration file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    /// An identifier failed validation.
    #[error("validation error: {0}")]
    ValidationError(#[from] crate::model::ValidationError),

    /// An I/O error outside the object store (e.g. session snapshot
    /// persistence).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// `true` for [`EngineError::Canceled`], the one terminal variant that
    /// is not a failure.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}
