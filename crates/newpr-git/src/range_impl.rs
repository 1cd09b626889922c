//! First-parent commit-range enumeration.
//!
//! Unlike [`crate::objects_impl`]'s single-object reads, this walks the
//! graph: repeatedly decode a commit, take its first parent, stop at
//! `base`. A plain loop over `find_commit`/`decode` rather than gix's
//! `rev_walk` — the pipeline only ever needs first-parent linearisation
//! (§4.1), and gix's general-purpose rev-walk brings in traversal order
//! and multi-tip machinery this abstraction has no use for.

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::types::GitOid;

fn to_gix_oid(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

fn from_gix_oid(oid: impl AsRef<[u8]>) -> GitOid {
    let bytes: [u8; 20] = oid.as_ref().try_into().expect("SHA1 is 20 bytes");
    GitOid::from_bytes(bytes)
}

pub fn commit_range_first_parent(
    repo: &GixRepo,
    base: GitOid,
    head: GitOid,
) -> Result<Vec<GitOid>, GitError> {
    let mut commits = Vec::new();
    let mut current = head;

    loop {
        if current == base {
            break;
        }

        let commit = repo
            .repo
            .find_commit(to_gix_oid(current))
            .map_err(|e| GitError::NotFound {
                message: format!("commit {current}: {e}"),
            })?;
        let decoded = commit.decode().map_err(|e| GitError::BackendError {
            message: format!("failed to decode commit {current}: {e}"),
        })?;

        commits.push(current);

        match decoded.parents().next() {
            Some(parent) => current = from_gix_oid(parent.as_bytes()),
            None => {
                return Err(GitError::NotFound {
                    message: format!(
                        "base {base} is not a first-parent ancestor of head {head}"
                    ),
                });
            }
        }
    }

    commits.reverse();
    Ok(commits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::GitRepo;
    use crate::types::{EntryMode, RefEdit, RefName, TreeEntry};
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, GixRepo) {
        let dir = TempDir::new().unwrap();
        std::process::Command::new("git")
            .args(["init", dir.path().to_str().unwrap()])
            .output()
            .unwrap();
        let repo = GixRepo::open(dir.path()).unwrap();
        (dir, repo)
    }

    fn commit_on(repo: &GixRepo, parent: Option<GitOid>, name: &str, content: &[u8]) -> GitOid {
        let blob = repo.write_blob(content).unwrap();
        let mut entries = match parent {
            Some(p) => {
                let tree = repo.read_commit(p).unwrap().tree_oid;
                repo.read_tree(tree).unwrap()
            }
            None => Vec::new(),
        };
        entries.retain(|e: &TreeEntry| e.name != name);
        entries.push(TreeEntry {
            name: name.to_owned(),
            mode: EntryMode::Blob,
            oid: blob,
        });
        let tree = repo.write_tree(&entries).unwrap();
        let parents: Vec<GitOid> = parent.into_iter().collect();
        repo.create_commit(
            tree,
            &parents,
            "Test User <test@test.com>",
            "Test User <test@test.com>",
            &format!("commit {name}"),
        )
        .unwrap()
    }

    #[test]
    fn range_excludes_base_includes_head() {
        let (_dir, repo) = setup_repo();
        let c1 = commit_on(&repo, None, "a.txt", b"a");
        let c2 = commit_on(&repo, Some(c1), "b.txt", b"b");
        let c3 = commit_on(&repo, Some(c2), "c.txt", b"c");
        let range = repo.commit_range_first_parent(c1, c3).unwrap();
        assert_eq!(range, vec![c2, c3]);
    }

    #[test]
    fn range_empty_when_base_equals_head() {
        let (_dir, repo) = setup_repo();
        let c1 = commit_on(&repo, None, "a.txt", b"a");
        let range = repo.commit_range_first_parent(c1, c1).unwrap();
        assert!(range.is_empty());
    }

    #[test]
    fn range_single_commit() {
        let (_dir, repo) = setup_repo();
        let c1 = commit_on(&repo, None, "a.txt", b"a");
        let c2 = commit_on(&repo, Some(c1), "b.txt", b"b");
        let range = repo.commit_range_first_parent(c1, c2).unwrap();
        assert_eq!(range, vec![c2]);
    }

    #[test]
    fn range_errors_when_base_unreachable() {
        let (_dir, repo) = setup_repo();
        let c1 = commit_on(&repo, None, "a.txt", b"a");
        let unrelated = commit_on(&repo, None, "z.txt", b"z");
        let c2 = commit_on(&repo, Some(c1), "b.txt", b"b");
        let result = repo.commit_range_first_parent(unrelated, c2);
        assert!(result.is_err());
    }

    #[test]
    fn range_preserves_refs() {
        let (_dir, repo) = setup_repo();
        let c1 = commit_on(&repo, None, "a.txt", b"a");
        let refname = RefName::new("refs/heads/main").unwrap();
        repo.atomic_ref_update(&[RefEdit {
            name: refname,
            new_oid: c1,
            expected_old_oid: GitOid::ZERO,
        }])
        .unwrap();
        assert_eq!(repo.commit_range_first_parent(c1, c1).unwrap(), Vec::new());
    }
}
