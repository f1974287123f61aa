//! Version control boundary.
//!
//! [`VersionControl`] is the only interface through which history is read or
//! written. It deals in store-relative paths and raw bytes and never interprets
//! entry semantics. [`git::GitCli`] drives the `git` binary; [`memory::MemoryVcs`]
//! is an in-memory implementation with a shared fake remote.

pub mod git;
pub mod memory;
pub mod merge;

use std::collections::BTreeSet;

use thiserror::Error;

/// Opaque commit identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitRef(pub String);

impl CommitRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for logs and notes.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        self.0.get(..end).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for CommitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a three-way text merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMerge {
    Clean(String),
    Conflicted,
}

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("no remote configured")]
    NoRemote,

    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    RemoteRejected(String),

    #[error("unknown revision: {0}")]
    UnknownRevision(String),

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("version control I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type VcsResult<T> = std::result::Result<T, VcsError>;

/// History operations needed by the sync engine.
///
/// Working-tree paths are relative to the store root and use `/` separators.
pub trait VersionControl: Send + Sync {
    /// Current local head, `None` before the first commit.
    fn head(&self) -> VcsResult<Option<CommitRef>>;

    /// Commit the current working-tree state of `paths` (files or directories,
    /// including deletions). Returns `None` when there was nothing to commit.
    fn commit(&self, paths: &[String], message: &str) -> VcsResult<Option<CommitRef>>;

    /// Best common ancestor of two commits.
    fn merge_base(&self, a: &CommitRef, b: &CommitRef) -> VcsResult<Option<CommitRef>>;

    /// Paths that differ between two commits. `from = None` is the empty tree.
    fn diff_paths(&self, from: Option<&CommitRef>, to: &CommitRef) -> VcsResult<BTreeSet<String>>;

    /// File contents at a commit, `None` if the path does not exist there.
    fn read_at(&self, rev: &CommitRef, path: &str) -> VcsResult<Option<Vec<u8>>>;

    /// Line-based three-way merge.
    fn merge_text(&self, base: &str, ours: &str, theirs: &str) -> VcsResult<TextMerge>;

    /// Move the local head (and working tree) forward to `to`.
    fn fast_forward(&self, to: &CommitRef) -> VcsResult<()>;

    /// Commit the working-tree state of `paths` with a second parent.
    fn commit_merge(
        &self,
        paths: &[String],
        message: &str,
        other_parent: &CommitRef,
    ) -> VcsResult<CommitRef>;

    /// Fetch the remote context branch. `None` if the remote has no such branch yet.
    fn pull(&self) -> VcsResult<Option<CommitRef>>;

    /// Publish the local head to the remote context branch.
    fn push(&self) -> VcsResult<()>;
}
