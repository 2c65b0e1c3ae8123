//! kiroku-driver (記録): the git-commit-backed filesystem driver.
//!
//! Maps a fixed set of file-server operations — stat, list, read, write,
//! delete, rename, mkdir, rmdir — onto one git repository's working tree.
//! Every successful mutation stages the affected paths and commits, so the
//! served tree's entire history is preserved as ordinary git history that
//! any git tool can inspect.
//!
//! The pieces:
//!
//! - [`Driver`]: the operation contract a protocol front drives
//! - [`GitDriver`] / [`GitDriverFactory`]: the git-backed implementation
//! - [`Perm`] / [`SimplePerm`]: per-path owner/group/mode lookups
//! - [`DriverError`]: the error taxonomy shared by every operation

pub mod driver;
pub mod error;
pub mod git;
pub mod perm;

pub use driver::{Driver, FileMeta, SessionInfo};
pub use error::DriverError;
pub use git::{CommitPolicy, GitDriver, GitDriverFactory};
pub use perm::{Perm, PermError, SimplePerm};
