//! Typed error taxonomy shared by the store, manifest, index, and sync engine.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::store::types::EntryKind;
use crate::vcs::VcsError;

/// One conflicted entry, with the locations of both variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub kind: EntryKind,
    pub id: String,
    /// Store-relative path of the local variant (left in place).
    pub local_path: String,
    /// Store-relative path of the conflict copy holding the remote variant.
    pub remote_copy_path: String,
}

/// Errors from context store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid {kind} payload: {message}")]
    Validation { kind: EntryKind, message: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntryKind, id: String },

    #[error("{kind} already exists: {id}")]
    DuplicateId { kind: EntryKind, id: String },

    #[error("unknown agent adapter: {0}")]
    UnknownAdapter(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("manifest at {path} is unusable: {reason}")]
    CorruptManifest { path: PathBuf, reason: String },

    #[error("sync state at {path} is unusable: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("remote rejected push: {0}")]
    RemoteRejected(String),

    #[error("sync stopped with {} unresolved conflict(s)", conflicts.len())]
    ConflictUnresolved { conflicts: Vec<ConflictReport> },

    #[error("store is busy: lock held by pid {holder_pid} since {since}")]
    StoreBusy { holder_pid: u32, since: String },

    #[error("operation cancelled before {0}")]
    Cancelled(&'static str),

    #[error("no context store at {0} (run `ctxvault init`)")]
    NotInitialized(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("search index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("version control error: {0}")]
    Vcs(VcsError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn validation(kind: EntryKind, message: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(kind: EntryKind, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether the caller can simply retry: nothing was lost and no manual
    /// resolution is needed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RemoteRejected(_) | Self::StoreBusy { .. } | Self::Cancelled(_)
        )
    }
}

impl From<VcsError> for StoreError {
    fn from(err: VcsError) -> Self {
        match err {
            VcsError::Network(msg) => Self::Network(msg),
            VcsError::RemoteRejected(msg) => Self::RemoteRejected(msg),
            other => Self::Vcs(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
