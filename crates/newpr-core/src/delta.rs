//! C1 — Delta Extractor.
//!
//! Walks the linear commit range `(base, head]` and emits a typed,
//! oldest-first list of per-commit file-level changes. Built on top of
//! [`newpr_git::GitRepo`]: first-parent linearisation comes from
//! [`GitRepo::commit_range_first_parent`], per-commit tree diffs from
//! [`GitRepo::diff_trees`] with rename detection baked into the trait
//! contract.
//!
//! Rejects immediately (§4.1): any commit with more than one parent
//! (merge), or any changed entry with mode `160000` (submodule) or
//! `120000` (symlink). Both are [`EngineError::UnsupportedHistory`] and
//! abort extraction — partial results are discarded, matching the "any
//! I/O or parse error aborts extraction" failure semantics in spec.md.

use newpr_git::{ChangeType, EntryMode, GitOid, GitRepo};

use crate::cancel::CancellationToken;
use crate::error::EngineError;
use crate::model::{ChangeStatus, Delta, FileChange};

/// Extract the ordered, oldest-first list of [`Delta`]s for the half-open
/// range `(base, head]`.
///
/// # Errors
/// Returns [`EngineError::UnsupportedHistory`] if any commit in the range
/// is a merge, or touches a submodule (`160000`) or symlink (`120000`)
/// entry. Returns [`EngineError::ObjectStoreError`] on any backend I/O
/// failure. Returns [`EngineError::Canceled`] if `cancel` is observed
/// between commits.
pub fn extract_deltas(
    repo: &dyn GitRepo,
    base: GitOid,
    head: GitOid,
    cancel: &CancellationToken,
) -> Result<Vec<Delta>, EngineError> {
    let commit_ids = repo.commit_range_first_parent(base, head)?;
    let mut deltas = Vec::with_capacity(commit_ids.len());

    for commit_id in commit_ids {
        cancel.check()?;

        let info = repo
            .read_commit(commit_id)?
            .with_fallback_metadata(&now_iso8601());

        if info.parents.len() > 1 {
            return Err(EngineError::UnsupportedHistory {
                commit: commit_id.to_string(),
                detail: format!("merge commit with {} parents", info.parents.len()),
            });
        }

        let parent_id = info.parents.first().copied().unwrap_or(GitOid::ZERO);
        let parent_tree = if parent_id.is_zero() {
            None
        } else {
            Some(repo.read_commit(parent_id)?.tree_oid)
        };

        let diff_entries = repo.diff_trees(parent_tree, info.tree_oid)?;
        let changes = diff_entries
            .into_iter()
            .map(|entry| to_file_change(commit_id, entry))
            .collect::<Result<Vec<_>, _>>()?;

        let message = info
            .message
            .lines()
            .next()
            .unwrap_or_default()
            .to_owned();

        tracing::debug!(commit = %commit_id, changes = changes.len(), "extracted delta");

        deltas.push(Delta {
            commit_id,
            parent_id,
            author: info.author_name,
            date: info.author_date,
            message,
            changes,
        });
    }

    Ok(deltas)
}

/// Convert a raw [`newpr_git::DiffEntry`] into a [`FileChange`], rejecting
/// submodule and symlink modes.
fn to_file_change(
    commit_id: GitOid,
    entry: newpr_git::DiffEntry,
) -> Result<FileChange, EngineError> {
    reject_unsupported_mode(commit_id, &entry.path, entry.old_mode)?;
    reject_unsupported_mode(commit_id, &entry.path, entry.new_mode)?;

    let status = match entry.change_type {
        ChangeType::Added => ChangeStatus::Added,
        ChangeType::Modified => ChangeStatus::Modified,
        ChangeType::Deleted => ChangeStatus::Deleted,
        ChangeType::Renamed { from } => ChangeStatus::Renamed { old_path: from },
    };

    Ok(FileChange {
        status,
        path: entry.path,
        old_blob: entry.old_oid,
        new_blob: entry.new_oid,
        old_mode: entry.old_mode,
        new_mode: entry.new_mode,
    })
}

fn reject_unsupported_mode(
    commit_id: GitOid,
    path: &str,
    mode: Option<EntryMode>,
) -> Result<(), EngineError> {
    match mode {
        Some(EntryMode::Commit) => Err(EngineError::UnsupportedHistory {
            commit: commit_id.to_string(),
            detail: format!("submodule entry (160000) at '{path}'"),
        }),
        Some(EntryMode::Link) => Err(EngineError::UnsupportedHistory {
            commit: commit_id.to_string(),
            detail: format!("symlink entry (120000) at '{path}'"),
        }),
        _ => Ok(()),
    }
}

/// Derive the [`RenameMap`]: `old_path -> new_path` for every rename
/// recorded across a set of deltas, in encounter order. A path renamed
/// more than once composes to its terminal name (P7): `a -> b -> c`
/// collapses to `a -> c` only when both renames actually occurred, not
/// speculatively for every path that merely shares a prefix.
#[must_use]
pub fn rename_map(deltas: &[Delta]) -> RenameMap {
    let mut map = RenameMap::default();
    for delta in deltas {
        for change in &delta.changes {
            if let ChangeStatus::Renamed { old_path } = &change.status {
                map.record(old_path.clone(), change.path.clone());
            }
        }
    }
    map
}

/// `old_path -> new_path`, composing transitive renames.
#[derive(Debug, Default, Clone)]
pub struct RenameMap {
    forward: std::collections::HashMap<String, String>,
}

impl RenameMap {
    /// Record a single rename, composing with any prior rename that ended
    /// at `old`.
    fn record(&mut self, old: String, new: String) {
        // If some earlier path X renamed into `old`, retarget it to `new`
        // directly so the map always reflects the terminal path.
        if let Some(source) = self
            .forward
            .iter()
            .find(|(_, v)| **v == old)
            .map(|(k, _)| k.clone())
        {
            self.forward.insert(source, new.clone());
        }
        self.forward.insert(old, new);
    }

    /// Look up where `path` ultimately ended up, if it was ever the source
    /// of a rename.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&str> {
        self.forward.get(path).map(String::as_str)
    }

    /// Iterate all `(old_path, new_path)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.forward.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn now_iso8601() -> String {
    // `CommitInfo::with_fallback_metadata` only consults this when the
    // backend reported an empty author date; the pipeline has no other use
    // for wall-clock time, so this is the one place it is read.
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(status: ChangeStatus, path: &str) -> FileChange {
        FileChange {
            status,
            path: path.to_owned(),
            old_blob: GitOid::ZERO,
            new_blob: GitOid::ZERO,
            old_mode: None,
            new_mode: None,
        }
    }

    fn delta(changes: Vec<FileChange>) -> Delta {
        Delta {
            commit_id: GitOid::ZERO,
            parent_id: GitOid::ZERO,
            author: "Unknown".to_owned(),
            date: "2024-01-01T00:00:00Z".to_owned(),
            message: "m".to_owned(),
            changes,
        }
    }

    #[test]
    fn rename_map_single_hop() {
        let deltas = vec![delta(vec![change(
            ChangeStatus::Renamed {
                old_path: "a.ts".to_owned(),
            },
            "b.ts",
        )])];
        let map = rename_map(&deltas);
        assert_eq!(map.resolve("a.ts"), Some("b.ts"));
    }

    #[test]
    fn rename_map_composes_transitively() {
        // P7: a -> b, then b -> c. Looking up `a` must return `c`.
        let deltas = vec![
            delta(vec![change(
                ChangeStatus::Renamed {
                    old_path: "a.ts".to_owned(),
                },
                "b.ts",
            )]),
            delta(vec![change(
                ChangeStatus::Renamed {
                    old_path: "b.ts".to_owned(),
                },
                "c.ts",
            )]),
        ];
        let map = rename_map(&deltas);
        assert_eq!(map.resolve("a.ts"), Some("c.ts"));
        assert_eq!(map.resolve("b.ts"), Some("c.ts"));
    }

    #[test]
    fn rename_map_single_rename_stops_at_terminal() {
        // P7: without a second rename, `a -> b` stays `a -> b`.
        let deltas = vec![delta(vec![change(
            ChangeStatus::Renamed {
                old_path: "a.ts".to_owned(),
            },
            "b.ts",
        )])];
        let map = rename_map(&deltas);
        assert_eq!(map.resolve("a.ts"), Some("b.ts"));
        assert_eq!(map.resolve("b.ts"), None);
    }

    #[test]
    fn now_iso8601_has_trailing_z() {
        assert!(now_iso8601().ends_with('Z'));
    }

    #[test]
    fn reject_unsupported_mode_rejects_submodule() {
        let err = reject_unsupported_mode(GitOid::ZERO, "lib", Some(EntryMode::Commit));
        assert!(matches!(err, Err(EngineError::UnsupportedHistory { .. })));
    }

    #[test]
    fn reject_unsupported_mode_rejects_symlink() {
        let err = reject_unsupported_mode(GitOid::ZERO, "link", Some(EntryMode::Link));
        assert!(matches!(err, Err(EngineError::UnsupportedHistory { .. })));
    }

    #[test]
    fn reject_unsupported_mode_allows_blob() {
        assert!(reject_unsupported_mode(GitOid::ZERO, "f.rs", Some(EntryMode::Blob)).is_ok());
        assert!(reject_unsupported_mode(GitOid::ZERO, "f.rs", None).is_ok());
    }
}
