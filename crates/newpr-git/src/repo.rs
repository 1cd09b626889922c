//! The [`GitRepo`] trait — the single abstraction boundary between the
//! stacking pipeline and the underlying content-addressed object store.
//!
//! The pipeline (`newpr-core`) never imports gix directly; it programs
//! against this trait so the backend (gix today, conceivably a CLI shim or
//! test double tomorrow) stays an implementation detail. The trait is
//! trimmed to exactly the operations the pipeline needs — object read/
//! write, tree editing, rename-aware diffing, and branch-ref lifecycle.
//! Working-tree concerns (checkout, status, stash, index, push, config)
//! belong to other tools and are not part of this abstraction.
//!
//! # Object safety
//!
//! No generic methods, no `Self` in return position outside `Result`.
//! Callers may use `&dyn GitRepo` or `Box<dyn GitRepo>`.

use crate::error::GitError;
use crate::types::{CommitInfo, DiffEntry, GitOid, RefEdit, RefName, TreeEdit, TreeEntry};

pub trait GitRepo {
    // -----------------------------------------------------------------------
    // Object read
    // -----------------------------------------------------------------------

    /// Read the contents of a blob object.
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError>;

    /// Read the entries of a tree object, one level deep (not recursive).
    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError>;

    /// Read a commit object's metadata: tree, parents, message, author,
    /// committer. Does not apply the `"Unknown"`/now fallback — callers
    /// decide when to apply
    /// [`CommitInfo::with_fallback_metadata`](crate::types::CommitInfo::with_fallback_metadata).
    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError>;

    // -----------------------------------------------------------------------
    // Object write
    // -----------------------------------------------------------------------

    /// Write a blob to the object store and return its OID.
    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError>;

    /// Write a tree object from a flat list of entries and return its OID.
    fn write_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, GitError>;

    /// Create a commit object with explicit author/committer identity and
    /// an explicit parent list. Never touches a ref — ref updates go
    /// through [`atomic_ref_update`](Self::atomic_ref_update) so tree,
    /// commit, and ref writes stay in the order the executor requires.
    fn create_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        author: &str,
        committer: &str,
        message: &str,
    ) -> Result<GitOid, GitError>;

    // -----------------------------------------------------------------------
    // Tree editing
    // -----------------------------------------------------------------------

    /// Apply a set of edits to an existing tree and return the OID of the
    /// new tree. Intermediate trees are created or updated as needed.
    fn edit_tree(&self, base: GitOid, edits: &[TreeEdit]) -> Result<GitOid, GitError>;

    // -----------------------------------------------------------------------
    // Diff
    // -----------------------------------------------------------------------

    /// Diff two trees and return the list of changed files, with rename
    /// detection enabled. If `old` is `None`, the diff is against an empty
    /// tree (every path in `new` appears as an addition).
    fn diff_trees(&self, old: Option<GitOid>, new: GitOid) -> Result<Vec<DiffEntry>, GitError>;

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Resolve the first-parent linear commit sequence in the half-open
    /// range `(base, head]` — `base` excluded, `head` included — oldest
    /// first.
    ///
    /// Walks `head`'s first-parent chain until `base` is reached. Does not
    /// itself reject merge commits or inspect tree entry modes; callers
    /// that must reject unsupported history (merges, submodules, symlinks)
    /// do so after reading each commit's full [`CommitInfo`].
    ///
    /// # Errors
    /// Returns [`GitError::NotFound`] if `base` is not an ancestor of
    /// `head` reachable via first-parent links (the walk hits a root
    /// commit without ever encountering `base`).
    fn commit_range_first_parent(
        &self,
        base: GitOid,
        head: GitOid,
    ) -> Result<Vec<GitOid>, GitError>;

    // -----------------------------------------------------------------------
    // Refs
    // -----------------------------------------------------------------------

    /// Resolve a ref to its OID, returning `None` if the ref does not exist.
    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, GitError>;

    /// Delete a ref. No-op if the ref does not exist.
    fn delete_ref(&self, name: &RefName) -> Result<(), GitError>;

    /// Atomically apply a batch of ref updates with compare-and-swap
    /// semantics. All updates succeed or all fail. Each [`RefEdit`] carries
    /// an expected old OID; [`GitOid::ZERO`] asserts the ref must not
    /// already exist (the shape used when creating a stack group's branch).
    fn atomic_ref_update(&self, edits: &[RefEdit]) -> Result<(), GitError>;
}
