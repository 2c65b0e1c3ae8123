//! Adapter from the driver contract to libunftp's storage interface.
//!
//! One [`GitStorage`] is built per FTP connection; all of them share the
//! factory's root, permission collaborator, and write lock. The driver is
//! blocking end-to-end, so every call runs under `spawn_blocking`, and
//! uploads are fed to it through a [`SyncIoBridge`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use libunftp::auth::DefaultUser;
use libunftp::storage::{
    Error, ErrorKind, Fileinfo, Metadata, Permissions, Result as StorageResult, StorageBackend,
    FEATURE_RESTART,
};
use tokio::io::AsyncRead;
use tokio::task;
use tokio_util::io::SyncIoBridge;
use tracing::debug;

use kiroku_driver::{Driver, DriverError, FileMeta, GitDriver, GitDriverFactory};

/// [`FileMeta`] dressed up for the FTP listing machinery.
///
/// The wire protocol carries numeric uid/gid, not names, so the driver's
/// owner/group strings stop here and 0/0 goes out instead.
#[derive(Debug, Clone)]
pub struct MetaInfo(FileMeta);

impl Metadata for MetaInfo {
    fn len(&self) -> u64 {
        self.0.size
    }

    fn is_dir(&self) -> bool {
        self.0.is_dir()
    }

    fn is_file(&self) -> bool {
        self.0.is_file()
    }

    fn is_symlink(&self) -> bool {
        false
    }

    fn modified(&self) -> StorageResult<SystemTime> {
        self.0
            .modified
            .ok_or_else(|| Error::from(ErrorKind::LocalError))
    }

    fn uid(&self) -> u32 {
        0
    }

    fn gid(&self) -> u32 {
        0
    }

    fn permissions(&self) -> Permissions {
        Permissions(self.0.mode & 0o7777)
    }
}

/// Storage backend serving one git working tree through [`GitDriver`].
pub struct GitStorage {
    driver: Arc<GitDriver>,
    root: PathBuf,
}

impl GitStorage {
    /// One backend per connection, drivers from a shared factory.
    pub fn new(factory: &GitDriverFactory) -> Self {
        Self {
            driver: Arc::new(factory.new_driver()),
            root: factory.root().to_path_buf(),
        }
    }

    /// Run one blocking driver call on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&GitDriver) -> Result<T, DriverError> + Send + 'static,
    {
        let driver = Arc::clone(&self.driver);
        task::spawn_blocking(move || op(&driver))
            .await
            .map_err(|err| Error::new(ErrorKind::LocalError, err))?
            .map_err(map_file_error)
    }
}

impl fmt::Debug for GitStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitStorage")
            .field("root", &self.root)
            .finish()
    }
}

#[async_trait]
impl StorageBackend<DefaultUser> for GitStorage {
    type Metadata = MetaInfo;

    fn supported_features(&self) -> u32 {
        // REST: restarting a transfer past zero is what append maps onto.
        FEATURE_RESTART
    }

    async fn metadata<P: AsRef<Path> + Send + fmt::Debug>(
        &self,
        _user: &DefaultUser,
        path: P,
    ) -> StorageResult<Self::Metadata> {
        let path = virtual_path(path);
        self.blocking(move |driver| driver.stat(&path).map(MetaInfo))
            .await
    }

    async fn list<P: AsRef<Path> + Send + fmt::Debug>(
        &self,
        _user: &DefaultUser,
        path: P,
    ) -> StorageResult<Vec<Fileinfo<PathBuf, Self::Metadata>>>
    where
        <Self as StorageBackend<DefaultUser>>::Metadata: Metadata,
    {
        let path = virtual_path(path);
        self.blocking(move |driver| {
            let base = PathBuf::from(&path);
            let mut entries = Vec::new();
            driver.list_dir(&path, &mut |meta| {
                entries.push(Fileinfo {
                    path: base.join(&meta.name),
                    metadata: MetaInfo(meta),
                });
                Ok(())
            })?;
            Ok(entries)
        })
        .await
        .map_err(|err| err.with_kind(ErrorKind::PermanentDirectoryNotAvailable))
    }

    async fn get<P: AsRef<Path> + Send + fmt::Debug>(
        &self,
        _user: &DefaultUser,
        path: P,
        start_pos: u64,
    ) -> StorageResult<Box<dyn AsyncRead + Send + Sync + Unpin>> {
        let path = virtual_path(path);
        let (size, file) = self
            .blocking(move |driver| driver.get_file(&path, start_pos))
            .await?;
        debug!(size, start_pos, "serving download");
        Ok(Box::new(tokio::fs::File::from_std(file)))
    }

    async fn put<
        P: AsRef<Path> + Send + fmt::Debug,
        R: AsyncRead + Send + Sync + Unpin + 'static,
    >(
        &self,
        _user: &DefaultUser,
        input: R,
        path: P,
        start_pos: u64,
    ) -> StorageResult<u64> {
        let path = virtual_path(path);
        // Bridge must be created on the runtime, then moved to the pool.
        let mut reader = SyncIoBridge::new(input);
        self.blocking(move |driver| driver.put_file(&path, &mut reader, start_pos > 0))
            .await
    }

    async fn del<P: AsRef<Path> + Send + fmt::Debug>(
        &self,
        _user: &DefaultUser,
        path: P,
    ) -> StorageResult<()> {
        let path = virtual_path(path);
        self.blocking(move |driver| driver.delete_file(&path)).await
    }

    async fn rmd<P: AsRef<Path> + Send + fmt::Debug>(
        &self,
        _user: &DefaultUser,
        path: P,
    ) -> StorageResult<()> {
        let path = virtual_path(path);
        self.blocking(move |driver| driver.delete_dir(&path))
            .await
            .map_err(|err| err.with_kind(ErrorKind::PermanentDirectoryNotAvailable))
    }

    async fn mkd<P: AsRef<Path> + Send + fmt::Debug>(
        &self,
        _user: &DefaultUser,
        path: P,
    ) -> StorageResult<()> {
        let path = virtual_path(path);
        self.blocking(move |driver| driver.make_dir(&path))
            .await
            .map_err(|err| err.with_kind(ErrorKind::PermanentDirectoryNotAvailable))
    }

    async fn rename<P: AsRef<Path> + Send + fmt::Debug>(
        &self,
        _user: &DefaultUser,
        from: P,
        to: P,
    ) -> StorageResult<()> {
        let from = virtual_path(from);
        let to = virtual_path(to);
        self.blocking(move |driver| driver.rename(&from, &to))
            .await
    }

    async fn cwd<P: AsRef<Path> + Send + fmt::Debug>(
        &self,
        _user: &DefaultUser,
        path: P,
    ) -> StorageResult<()> {
        let path = virtual_path(path);
        self.blocking(move |driver| driver.change_dir(&path))
            .await
            .map_err(|err| err.with_kind(ErrorKind::PermanentDirectoryNotAvailable))
    }
}

/// The driver speaks slash strings; libunftp hands over `Path`s.
fn virtual_path<P: AsRef<Path>>(path: P) -> String {
    path.as_ref().to_string_lossy().into_owned()
}

/// Map driver failures onto FTP reply classes, assuming a file context.
/// Directory-flavored operations re-kind not-found afterwards.
fn map_file_error(err: DriverError) -> Error {
    let kind = match &err {
        _ if err.is_not_found() => ErrorKind::PermanentFileNotAvailable,
        DriverError::NotADirectory(_) => ErrorKind::PermanentDirectoryNotAvailable,
        DriverError::NotAFile(_) | DriverError::DirectoryCollision(_) => {
            ErrorKind::PermanentFileNotAvailable
        }
        DriverError::PathEscape(_) | DriverError::ReservedPath(_) => ErrorKind::PermissionDenied,
        _ => ErrorKind::LocalError,
    };
    Error::new(kind, err)
}

/// Re-kinding helper for directory-flavored operations.
trait WithKind {
    fn with_kind(self, kind: ErrorKind) -> Error;
}

impl WithKind for Error {
    /// Not-found answers from a directory operation should say "directory
    /// unavailable", not "file unavailable". Everything else passes through.
    fn with_kind(self, kind: ErrorKind) -> Error {
        if self.kind() == ErrorKind::PermanentFileNotAvailable {
            Error::from(kind)
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;
    use kiroku_driver::SimplePerm;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn setup_storage() -> (TempDir, GitStorage) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Test User").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
        }
        drop(repo);
        let factory =
            GitDriverFactory::new(dir.path(), Arc::new(SimplePerm::new("user", "group")));
        let storage = GitStorage::new(&factory);
        (dir, storage)
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let (_dir, storage) = setup_storage();
        let user = DefaultUser;

        let bytes = storage
            .put(&user, "hello ftp".as_bytes(), "/f.txt", 0)
            .await
            .unwrap();
        assert_eq!(bytes, 9);

        let mut reader = storage.get(&user, "/f.txt", 0).await.unwrap();
        let mut content = String::new();
        reader.read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "hello ftp");
    }

    #[tokio::test]
    async fn test_put_with_restart_appends() {
        let (_dir, storage) = setup_storage();
        let user = DefaultUser;

        storage.put(&user, "ab".as_bytes(), "/x", 0).await.unwrap();
        storage.put(&user, "cd".as_bytes(), "/x", 2).await.unwrap();

        let meta = storage.metadata(&user, "/x").await.unwrap();
        assert_eq!(meta.len(), 4);
    }

    #[tokio::test]
    async fn test_list_reports_entries_with_paths() {
        let (_dir, storage) = setup_storage();
        let user = DefaultUser;

        storage.mkd(&user, "/d").await.unwrap();
        storage.put(&user, "x".as_bytes(), "/d/f", 0).await.unwrap();

        let entries = storage.list(&user, "/d").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, PathBuf::from("/d/f"));
        assert!(entries[0].metadata.is_file());
        assert_eq!(entries[0].metadata.len(), 1);
    }

    #[tokio::test]
    async fn test_cwd_missing_is_directory_unavailable() {
        let (_dir, storage) = setup_storage();
        let err = storage.cwd(&DefaultUser, "/nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermanentDirectoryNotAvailable);
    }

    #[tokio::test]
    async fn test_get_missing_is_file_unavailable() {
        let (_dir, storage) = setup_storage();
        let err = storage
            .get(&DefaultUser, "/nope", 0)
            .await
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermanentFileNotAvailable);
    }

    #[tokio::test]
    async fn test_del_and_rmd_enforce_kind() {
        let (_dir, storage) = setup_storage();
        let user = DefaultUser;

        storage.mkd(&user, "/d").await.unwrap();
        storage.put(&user, "x".as_bytes(), "/f", 0).await.unwrap();

        let err = storage.del(&user, "/d").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermanentFileNotAvailable);
        let err = storage.rmd(&user, "/f").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermanentDirectoryNotAvailable);
    }

    #[test]
    fn test_traversal_maps_to_permission_denied() {
        let err = map_file_error(DriverError::PathEscape("../etc".to_string()));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        let err = map_file_error(DriverError::ReservedPath("/.git".to_string()));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_metadata_masks_type_bits_from_permissions() {
        let meta = MetaInfo(FileMeta {
            name: "d".to_string(),
            size: 0,
            modified: Some(SystemTime::UNIX_EPOCH),
            mode: 0o040755,
            owner: "user".to_string(),
            group: "group".to_string(),
        });
        assert!(meta.is_dir());
        assert_eq!(meta.permissions().0, 0o755);
        assert_eq!(meta.uid(), 0);
        assert_eq!(meta.gid(), 0);
    }
}
