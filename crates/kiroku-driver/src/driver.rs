//! The file-server driver contract and its metadata types.

use std::fs::File;
use std::io;
use std::time::SystemTime;

use crate::error::DriverError;

/// Directory bit carried in [`FileMeta::mode`].
pub(crate) const MODE_DIR: u32 = 0o040000;

/// Synthesized file metadata — the record every metadata query reports.
///
/// Size and mtime come from the working tree. Mode, owner, and group are not
/// intrinsic to the backend: `stat` takes them from the permission
/// collaborator, directory listings take the mode bits from the backend stat.
/// Either way the directory bit in `mode` follows the backend's verdict, not
/// the permission lookup's.
#[derive(Debug, Clone)]
pub struct FileMeta {
    /// Entry name (not the full path); `/` for the root itself.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, if the backend provides one.
    pub modified: Option<SystemTime>,
    /// Unix-style mode bits. Directories always carry the directory bit.
    pub mode: u32,
    /// Owning user, as reported by the permission collaborator.
    pub owner: String,
    /// Owning group, as reported by the permission collaborator.
    pub group: String,
}

impl FileMeta {
    /// True when the directory bit is set.
    pub fn is_dir(&self) -> bool {
        self.mode & MODE_DIR != 0
    }

    /// True for anything without the directory bit.
    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }
}

/// What the protocol front knows about a client session when it binds a
/// driver to it.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    /// Authenticated username, when the protocol server has one.
    pub user: Option<String>,
}

/// The contract between a protocol server and a storage driver.
///
/// All paths are virtual: slash-separated and resolved relative to the
/// driver's root, with or without a leading slash. One driver instance
/// serves one client session; instances are cheap and share whatever they
/// must through their factory.
///
/// Mutating methods commit on success and commit nothing on failure. The
/// backend mutation and the commit are two phases, not one transaction: a
/// failure between them leaves the working tree changed but unrecorded (see
/// [`GitDriver`](crate::GitDriver) for how the git implementation handles
/// that window).
pub trait Driver: Send + Sync {
    /// Called once when a client session binds to this driver.
    fn init(&mut self, session: &SessionInfo) {
        let _ = session;
    }

    /// Succeeds iff `path` exists and is a directory.
    fn change_dir(&self, path: &str) -> Result<(), DriverError>;

    /// Merged metadata for one path.
    fn stat(&self, path: &str) -> Result<FileMeta, DriverError>;

    /// Enumerate the immediate children of a directory, invoking `visit`
    /// once per entry in the backend's enumeration order (name order here).
    ///
    /// Stops at the first error from the backend or from `visit` and
    /// propagates it; entries after the failure are never visited. Callers
    /// with failure conditions of their own can wrap them in
    /// [`io::Error::other`]. Single pass, not restartable.
    fn list_dir(
        &self,
        path: &str,
        visit: &mut dyn FnMut(FileMeta) -> Result<(), DriverError>,
    ) -> Result<(), DriverError>;

    /// Remove a directory and commit the removal.
    fn delete_dir(&self, path: &str) -> Result<(), DriverError>;

    /// Remove a file and commit the removal.
    fn delete_file(&self, path: &str) -> Result<(), DriverError>;

    /// Move `from` to `to` and commit both ends of the move.
    fn rename(&self, from: &str, to: &str) -> Result<(), DriverError>;

    /// Create a directory, and any missing ancestors, and commit it.
    fn make_dir(&self, path: &str) -> Result<(), DriverError>;

    /// Open `path` for reading. Returns the file's total size and a handle
    /// positioned at `offset`. Read-only: no commit.
    fn get_file(&self, path: &str, offset: u64) -> Result<(u64, File), DriverError>;

    /// Write `data` to `path` and commit the result.
    ///
    /// With `append` the input lands at the end of the existing file;
    /// without it any existing file is replaced. Appending to a path that
    /// does not exist degrades to a plain create. Returns the number of
    /// bytes copied out of `data`.
    fn put_file(
        &self,
        path: &str,
        data: &mut dyn io::Read,
        append: bool,
    ) -> Result<u64, DriverError>;
}
