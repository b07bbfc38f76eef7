//! Structured errors for the repository-surgery layer, following the same
//! per-subsystem-enum shape as `fast_export::error`.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("mark {0} is already in use")]
    DuplicateMark(u64),
    #[error("commit parent mark :{0} does not resolve to an earlier commit")]
    UnresolvedParent(u64),
    #[error("file-operation blob reference :{0} does not resolve to an earlier blob")]
    UnresolvedBlobRef(u64),
    #[error("tag {0:?} committish does not resolve to any commit")]
    UnresolvedTagTarget(String),
    #[error("invalid ref name {0:?}: {1}")]
    InvalidRefname(String, fast_export::refs::RefnameError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Stream(#[from] fast_export::StreamError),
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("operation was cancelled")]
    Cancelled,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
