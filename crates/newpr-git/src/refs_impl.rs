//! gix-backed ref read, delete, and atomic batch update.

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

pub fn read_ref(repo: &GixRepo, name: &RefName) -> Result<Option<GitOid>, GitError> {
    let mut reference = match repo.repo.try_find_reference(name.as_str()) {
        Ok(Some(r)) => r,
        Ok(None) => return Ok(None),
        Err(e) => {
            return Err(GitError::BackendError {
                message: format!("failed to look up ref '{name}': {e}"),
            })
        }
    };

    let id = reference
        .peel_to_id_in_place()
        .map_err(|e| GitError::BackendError {
            message: format!("failed to peel ref '{name}': {e}"),
        })?;

    Ok(Some(from_gix_oid(id.as_bytes())))
}

pub fn delete_ref(repo: &GixRepo, name: &RefName) -> Result<(), GitError> {
    match repo.repo.try_find_reference(name.as_str()) {
        Ok(Some(reference)) => {
            reference
                .delete()
                .map_err(|e| GitError::BackendError {
                    message: format!("failed to delete ref '{name}': {e}"),
                })?;
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => Err(GitError::BackendError {
            message: format!("failed to look up ref '{name}' for deletion: {e}"),
        }),
    }
}

/// Apply a batch of ref updates with compare-and-swap semantics, all or
/// nothing. [`GitOid::ZERO`] as the expected old value asserts the ref must
/// not already exist.
pub fn atomic_ref_update(repo: &GixRepo, edits: &[RefEdit]) -> Result<(), GitError> {
    use gix::refs::transaction::{Change, LogChange, PreviousValue, RefEdit as GixRefEdit};
    use gix::refs::Target;

    let gix_edits: Vec<GixRefEdit> = edits
        .iter()
        .map(|edit| {
            let expected = if edit.expected_old_oid.is_zero() {
                PreviousValue::MustNotExist
            } else {
                PreviousValue::MustExistAndMatch(Target::Object(to_gix_oid(edit.expected_old_oid)))
            };
            GixRefEdit {
                change: Change::Update {
                    log: LogChange {
                        message: "newpr: stack branch update".into(),
                        ..Default::default()
                    },
                    expected,
                    new: Target::Object(to_gix_oid(edit.new_oid)),
                },
                name: edit
                    .name
                    .as_str()
                    .try_into()
                    .map_err(|e| GitError::InvalidOid {
                        value: edit.name.as_str().to_owned(),
                        reason: format!("not a valid full ref name: {e}"),
                    })?,
                deref: false,
            }
        })
        .collect::<Result<Vec<_>, GitError>>()?;

    repo.repo
        .edit_references(gix_edits)
        .map_err(|e| match e {
            gix::reference::edit::Error::RejectedDueToPreconditions { .. } => GitError::RefConflict {
                ref_name: edits
                    .first()
                    .map(|e| e.name.as_str().to_owned())
                    .unwrap_or_default(),
                message: e.to_string(),
            },
            other => GitError::BackendError {
                message: format!("atomic ref update failed: {other}"),
            },
        })?;

    Ok(())
}
