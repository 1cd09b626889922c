//! gix-backed tree-to-tree diff with rename detection.

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::types::*;

fn to_gix_oid(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

fn from_gix_oid(oid: impl AsRef<[u8]>) -> GitOid {
    let bytes: [u8; 20] = oid.as_ref().try_into().expect("SHA1 is 20 bytes");
    GitOid::from_bytes(bytes)
}

fn from_gix_entry_mode(mode: gix::objs::tree::EntryMode) -> EntryMode {
    match mode.kind() {
        gix::objs::tree::EntryKind::Tree => EntryMode::Tree,
        gix::objs::tree::EntryKind::Blob => EntryMode::Blob,
        gix::objs::tree::EntryKind::BlobExecutable => EntryMode::BlobExecutable,
        gix::objs::tree::EntryKind::Link => EntryMode::Link,
        gix::objs::tree::EntryKind::Commit => EntryMode::Commit,
    }
}

pub fn diff_trees(
    repo: &GixRepo,
    old: Option<GitOid>,
    new: GitOid,
) -> Result<Vec<DiffEntry>, GitError> {
    let new_tree = repo
        .repo
        .find_tree(to_gix_oid(new))
        .map_err(|e| GitError::NotFound {
            message: format!("tree {new}: {e}"),
        })?;

    let old_tree = match old {
        Some(oid) => repo
            .repo
            .find_tree(to_gix_oid(oid))
            .map_err(|e| GitError::NotFound {
                message: format!("tree {oid}: {e}"),
            })?,
        None => repo.repo.empty_tree(),
    };

    let mut entries = Vec::new();

    let mut platform = old_tree.changes().map_err(|e| GitError::BackendError {
        message: format!("failed to prepare tree diff: {e}"),
    })?;

    platform
        .track_rewrites(Some(gix::diff::Rewrites::default()))
        .for_each_to_obtain_tree(&new_tree, |change| {
            use gix::object::tree::diff::Change;

            match change {
                Change::Addition {
                    location,
                    entry_mode,
                    id,
                    ..
                } => {
                    entries.push(DiffEntry {
                        path: location.to_string(),
                        change_type: ChangeType::Added,
                        old_oid: GitOid::ZERO,
                        new_oid: from_gix_oid(id.as_bytes()),
                        old_mode: None,
                        new_mode: Some(from_gix_entry_mode(entry_mode)),
                    });
                }
                Change::Deletion {
                    location,
                    entry_mode,
                    id,
                    ..
                } => {
                    entries.push(DiffEntry {
                        path: location.to_string(),
                        change_type: ChangeType::Deleted,
                        old_oid: from_gix_oid(id.as_bytes()),
                        new_oid: GitOid::ZERO,
                        old_mode: Some(from_gix_entry_mode(entry_mode)),
                        new_mode: None,
                    });
                }
                Change::Modification {
                    location,
                    previous_entry_mode,
                    previous_id,
                    entry_mode,
                    id,
                    ..
                } => {
                    entries.push(DiffEntry {
                        path: location.to_string(),
                        change_type: ChangeType::Modified,
                        old_oid: from_gix_oid(previous_id.as_bytes()),
                        new_oid: from_gix_oid(id.as_bytes()),
                        old_mode: Some(from_gix_entry_mode(previous_entry_mode)),
                        new_mode: Some(from_gix_entry_mode(entry_mode)),
                    });
                }
                Change::Rewrite {
                    source_location,
                    location,
                    source_entry_mode,
                    source_id,
                    entry_mode,
                    id,
                    copy,
                    ..
                } => {
                    if !copy {
                        entries.push(DiffEntry {
                            path: location.to_string(),
                            change_type: ChangeType::Renamed {
                                from: source_location.to_string(),
                            },
                            old_oid: from_gix_oid(source_id.as_bytes()),
                            new_oid: from_gix_oid(id.as_bytes()),
                            old_mode: Some(from_gix_entry_mode(source_entry_mode)),
                            new_mode: Some(from_gix_entry_mode(entry_mode)),
                        });
                    }
                }
            }
            Ok::<_, std::convert::Infallible>(gix::object::tree::diff::Action::Continue)
        })
        .map_err(|e| GitError::BackendError {
            message: format!("tree diff failed: {e}"),
        })?;

    Ok(entries)
}
