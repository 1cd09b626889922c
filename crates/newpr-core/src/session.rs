//! Session-store interface.
//!
//! `StackStateSnapshot` is the persisted shape of one pipeline run: it
//! survives a process restart so a caller can resume reporting on (or
//! resuming from) a previous run. Atomic persistence — serialize,
//! write-to-temp, fsync, rename-over — follows the teacher's
//! `MergeStateFile::write_atomic`/`read` exactly (`merge_state.rs`); the
//! `SessionStore` trait is the pluggable-backend seam, with a filesystem
//! implementation as the default.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierOutput;
use crate::execute::RunPhase;
use crate::model::{ConstraintEdge, GroupId, Ownership, StackResult};
use crate::verify::{VerifyError, VerifyWarning};

/// Coarse run status, independent of the fine-grained [`RunPhase`] — a run
/// can be `Running` in any non-terminal phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Canceled,
}

/// The persisted state of one pipeline run, keyed externally by the
/// originating analysis session ID.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StackStateSnapshot {
    pub status: RunStatus,
    pub phase: RunPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feasibility: Option<FeasibilitySnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_expected_trees: Option<std::collections::BTreeMap<GroupId, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_result: Option<StackResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_result: Option<VerifyResultSnapshot>,
    pub started_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
}

/// The coupling/ownership decisions made before C3, persisted for audit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartitionSnapshot {
    pub ownership: Ownership,
    pub classifier_output: Option<ClassifierOutput>,
}

/// C3's output, persisted for audit and resumption.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeasibilitySnapshot {
    pub ordered_group_ids: Vec<GroupId>,
    pub dependency_edges: Vec<ConstraintEdge>,
}

/// C6's output, persisted in a serializable shape ([`VerifyError`]/
/// [`VerifyWarning`] are plain enums with no `std::error::Error` impl, so
/// this just mirrors their fields rather than deriving `Serialize` on the
/// verifier's own types).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyResultSnapshot {
    pub verified: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl VerifyResultSnapshot {
    #[must_use]
    pub fn from_report(verified: bool, errors: &[VerifyError], warnings: &[VerifyWarning]) -> Self {
        Self {
            verified,
            errors: errors.iter().map(describe_error).collect(),
            warnings: warnings.iter().map(describe_warning).collect(),
        }
    }
}

fn describe_error(err: &VerifyError) -> String {
    match err {
        VerifyError::FinalTreeMismatch { expected, actual } => {
            format!("final tree mismatch: expected {expected}, got {actual}")
        }
    }
}

fn describe_warning(warning: &VerifyWarning) -> String {
    match warning {
        VerifyWarning::ScopeLeak { group, path } => {
            format!("scope leak: group '{group}' touched unowned path '{path}'")
        }
        VerifyWarning::UnionMismatch { missing, extra } => {
            format!("union mismatch: missing {missing:?}, extra {extra:?}")
        }
    }
}

/// Errors from session persistence.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no snapshot found at {0}")]
    NotFound(PathBuf),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("serialize error: {0}")]
    Serialize(String),
    #[error("deserialize error: {0}")]
    Deserialize(String),
}

/// The pluggable persistence seam. The filesystem implementation
/// ([`FileSessionStore`]) is the default; an external caller may implement
/// this against a database instead.
pub trait SessionStore {
    /// # Errors
    /// Returns [`SessionError`] on any backend failure.
    fn save(&self, session_id: &str, snapshot: &StackStateSnapshot) -> Result<(), SessionError>;

    /// # Errors
    /// Returns [`SessionError::NotFound`] if no snapshot exists for
    /// `session_id`, or another [`SessionError`] variant on backend
    /// failure.
    fn load(&self, session_id: &str) -> Result<StackStateSnapshot, SessionError>;
}

/// Atomic write-temp-fsync-rename persistence under a root directory, one
/// `<session_id>.json` file per session — the teacher's
/// `MergeStateFile::write_atomic`/`read` pattern, generalized to an
/// arbitrary session id instead of a fixed `.manifold/merge-state.json`
/// path.
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{session_id}.json"))
    }
}

impl SessionStore for FileSessionStore {
    fn save(&self, session_id: &str, snapshot: &StackStateSnapshot) -> Result<(), SessionError> {
        fs::create_dir_all(&self.root).map_err(|e| SessionError::Io(e.to_string()))?;
        let path = self.path_for(session_id);
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| SessionError::Serialize(e.to_string()))?;

        let tmp_path = self.root.join(format!(".{session_id}.tmp"));
        let mut file = fs::File::create(&tmp_path).map_err(|e| SessionError::Io(e.to_string()))?;
        file.write_all(json.as_bytes())
            .map_err(|e| SessionError::Io(e.to_string()))?;
        file.sync_all().map_err(|e| SessionError::Io(e.to_string()))?;
        drop(file);

        fs::rename(&tmp_path, &path).map_err(|e| SessionError::Io(e.to_string()))?;
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<StackStateSnapshot, SessionError> {
        let path = self.path_for(session_id);
        let contents = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SessionError::NotFound(path.clone())
            } else {
                SessionError::Io(e.to_string())
            }
        })?;
        serde_json::from_str(&contents).map_err(|e| SessionError::Deserialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> StackStateSnapshot {
        StackStateSnapshot {
            status: RunStatus::Running,
            phase: RunPhase::Partitioning,
            error: None,
            context: Vec::new(),
            partition: None,
            feasibility: None,
            plan_expected_trees: None,
            exec_result: None,
            verify_result: None,
            started_at: 1_700_000_000,
            finished_at: None,
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let snap = snapshot();
        store.save("sess-1", &snap).unwrap();
        let loaded = store.load("sess-1").unwrap();
        assert_eq!(loaded.status, RunStatus::Running);
        assert_eq!(loaded.started_at, snap.started_at);
    }

    #[test]
    fn load_missing_session_errors_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let err = store.load("missing").unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let mut snap = snapshot();
        store.save("sess-1", &snap).unwrap();
        snap.status = RunStatus::Succeeded;
        snap.finished_at = Some(1_700_000_100);
        store.save("sess-1", &snap).unwrap();
        let loaded = store.load("sess-1").unwrap();
        assert_eq!(loaded.status, RunStatus::Succeeded);
        assert_eq!(loaded.finished_at, Some(1_700_000_100));
    }
}
