//! Error taxonomy shared by every driver operation.

use std::path::PathBuf;

use thiserror::Error;

use crate::perm::PermError;

/// Everything a driver operation can fail with.
///
/// `Commit` is the one to watch: it means the working tree was already
/// mutated and only the recording of it failed, so the tree sits ahead of
/// HEAD until a later successful commit absorbs the stranded change.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The working tree could not locate or access a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Repository-level failure (open, lookup).
    #[error("git: {0}")]
    Git(#[from] git2::Error),

    /// Staging or committing failed after the working tree was mutated.
    #[error("commit failed, working tree is ahead of HEAD: {0}")]
    Commit(#[source] git2::Error),

    /// The permission collaborator could not answer a lookup.
    #[error(transparent)]
    Perm(#[from] PermError),

    /// The operation requires a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The operation requires a non-directory.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// A directory already occupies the target name.
    #[error("a directory has the same name: {0}")]
    DirectoryCollision(String),

    /// `..` segments would climb above the repository root.
    #[error("path escapes the repository root: {0}")]
    PathEscape(String),

    /// The path names the repository's own metadata directory.
    #[error("path is reserved: {0}")]
    ReservedPath(String),

    /// The repository is bare — there is no working tree to serve.
    #[error("repository has no working tree: {}", .0.display())]
    NoWorktree(PathBuf),
}

impl DriverError {
    /// True when the underlying cause is a missing path.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriverError::Io(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}
