//! Data model shared by every pipeline stage.

mod ids;
mod types;

pub use ids::{ErrorKind, GroupId, RunId, ValidationError};
pub(crate) use ids::SUFFIX_ALPHABET;
pub use types::{
    ChangeStatus, ConstraintEdge, Delta, FileChange, Group, GroupCommit, GroupKind, GroupStats,
    Ownership, PathOrderEvidence, StackGroup, StackResult,
};
