//! Git abstraction layer for the newpr stacking engine.
//!
//! This crate defines the [`GitRepo`] trait — the single interface through
//! which the pipeline (`newpr-core`) interacts with git. `newpr-core` never
//! imports gix directly; it depends on this crate and programs against the
//! trait.
//!
//! # Crate layout
//!
//! - [`repo`] — the [`GitRepo`] trait definition.
//! - [`types`] — value types used in trait signatures ([`GitOid`], [`RefName`],
//!   [`TreeEntry`], [`DiffEntry`], etc.).
//! - [`error`] — the [`GitError`] enum returned by all trait methods.
//! - [`gix_repo`] — the gix-backed [`GixRepo`] implementation of [`GitRepo`].

pub mod error;
pub mod gix_repo;
pub mod repo;
pub mod types;

mod diff_impl;
mod objects_impl;
mod range_impl;
mod refs_impl;

// Re-export the main trait and commonly used types at the crate root for
// ergonomic imports: `use newpr_git::{GitRepo, GitOid, GitError};`
pub use error::GitError;
pub use gix_repo::GixRepo;
pub use repo::GitRepo;
pub use types::{
    ChangeType, CommitInfo, DiffEntry, EntryMode, GitOid, OidParseError, RefEdit, RefName,
    RefNameError, TreeEdit, TreeEntry,
};
