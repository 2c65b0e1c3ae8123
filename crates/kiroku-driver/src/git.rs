//! Git-backed driver: every mutation becomes a commit.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{Commit, IndexAddOption, Oid, Repository, Signature};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::driver::{Driver, FileMeta, MODE_DIR};
use crate::error::DriverError;
use crate::perm::Perm;

/// Author identity and message applied to every commit the driver makes.
///
/// The message is deliberately not derived from the operation; consumers
/// that need per-operation detail can diff adjacent commits.
#[derive(Debug, Clone)]
pub struct CommitPolicy {
    pub author_name: String,
    pub author_email: String,
    pub message: String,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            author_name: "kiroku".to_string(),
            author_email: "kiroku@localhost".to_string(),
            message: "kiroku: record filesystem change".to_string(),
        }
    }
}

/// Builds one [`GitDriver`] per client session.
///
/// Drivers from one factory share the repository root, the permission
/// collaborator, the commit policy, and the write lock that keeps mutations
/// serialized across sessions.
#[derive(Clone)]
pub struct GitDriverFactory {
    root: PathBuf,
    perm: Arc<dyn Perm>,
    policy: CommitPolicy,
    write_lock: Arc<Mutex<()>>,
}

impl GitDriverFactory {
    /// Factory over `root` with the default commit policy.
    pub fn new(root: impl Into<PathBuf>, perm: Arc<dyn Perm>) -> Self {
        Self::with_policy(root, perm, CommitPolicy::default())
    }

    /// Factory with an explicit commit policy.
    pub fn with_policy(
        root: impl Into<PathBuf>,
        perm: Arc<dyn Perm>,
        policy: CommitPolicy,
    ) -> Self {
        Self {
            root: root.into(),
            perm,
            policy,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// One driver per client session.
    pub fn new_driver(&self) -> GitDriver {
        GitDriver {
            root: self.root.clone(),
            perm: Arc::clone(&self.perm),
            policy: self.policy.clone(),
            write_lock: Arc::clone(&self.write_lock),
        }
    }

    /// The repository root this factory's drivers serve.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// File-server driver over one git repository's working tree.
///
/// Every mutating operation runs open → mutate → stage → commit while
/// holding the factory-wide write lock. The mutate and commit phases are not
/// one transaction: if staging or committing fails, the working tree keeps
/// the mutation while HEAD does not, the change stays visible to later reads,
/// and the next successful commit absorbs it. Read operations take no lock.
///
/// The repository is re-opened by every call and dropped on return; nothing
/// is cached between operations.
pub struct GitDriver {
    root: PathBuf,
    perm: Arc<dyn Perm>,
    policy: CommitPolicy,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for GitDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitDriver")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// A virtual path pinned to the working tree.
#[derive(Debug)]
struct Resolved {
    /// Root-anchored filesystem path.
    abs: PathBuf,
    /// Root-relative slash path — git pathspec and permission key. Empty
    /// for the root itself.
    rel: String,
}

impl GitDriver {
    // ========================================================================
    // Path resolution
    // ========================================================================

    /// Resolve a virtual path to its working-tree locations.
    ///
    /// Empty and `.` segments drop out; `..` pops within the tree and fails
    /// once it would climb past the root. The repository's own `.git` is
    /// not addressable.
    fn resolve(&self, path: &str) -> Result<Resolved, DriverError> {
        let mut segments: Vec<&str> = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(DriverError::PathEscape(path.to_string()));
                    }
                }
                name => segments.push(name),
            }
        }
        if segments.first() == Some(&".git") {
            return Err(DriverError::ReservedPath(path.to_string()));
        }
        let mut abs = self.root.clone();
        for segment in &segments {
            abs.push(segment);
        }
        Ok(Resolved {
            abs,
            rel: segments.join("/"),
        })
    }

    // ========================================================================
    // Repository access
    // ========================================================================

    /// Open the repository for the duration of one call.
    ///
    /// Bare repositories have no working tree to serve, so they are
    /// rejected here, before anything touches the filesystem.
    fn open_repo(&self) -> Result<Repository, DriverError> {
        let repo = Repository::open(&self.root)?;
        if repo.workdir().is_none() {
            return Err(DriverError::NoWorktree(self.root.clone()));
        }
        Ok(repo)
    }

    // ========================================================================
    // Stage + commit
    // ========================================================================

    /// Stage one root-relative pathspec: additions, modifications, and
    /// deletions under it, like `git add -A <path>`. An empty pathspec
    /// stages the whole tree.
    fn stage(&self, repo: &Repository, rel: &str) -> Result<(), DriverError> {
        let specs: &[&str] = if rel.is_empty() {
            &[]
        } else {
            std::slice::from_ref(&rel)
        };
        let mut index = repo.index().map_err(DriverError::Commit)?;
        index
            .add_all(specs.iter().copied(), IndexAddOption::DEFAULT, None)
            .map_err(DriverError::Commit)?;
        index
            .update_all(specs.iter().copied(), None)
            .map_err(DriverError::Commit)?;
        index.write().map_err(DriverError::Commit)?;
        Ok(())
    }

    /// Commit everything staged. The first commit of a repository has no
    /// parent; later ones chain onto HEAD. Commits with an unchanged tree
    /// are allowed — git does not track directories, so `make_dir` would
    /// otherwise leave no record.
    fn commit(&self, repo: &Repository) -> Result<Oid, DriverError> {
        let mut index = repo.index().map_err(DriverError::Commit)?;
        let tree_id = index.write_tree().map_err(DriverError::Commit)?;
        let tree = repo.find_tree(tree_id).map_err(DriverError::Commit)?;
        let sig = Signature::now(&self.policy.author_name, &self.policy.author_email)
            .map_err(DriverError::Commit)?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit().map_err(DriverError::Commit)?),
            Err(_) => None,
        };
        let parents: Vec<&Commit> = parent.iter().collect();

        let oid = repo
            .commit(
                Some("HEAD"),
                &sig,
                &sig,
                &self.policy.message,
                &tree,
                &parents,
            )
            .map_err(DriverError::Commit)?;
        debug!(commit = %oid, "recorded working tree change");
        Ok(oid)
    }

    /// The stage→commit pair every successful mutation ends with.
    fn record(&self, repo: &Repository, rels: &[&str]) -> Result<(), DriverError> {
        let result = rels
            .iter()
            .try_for_each(|rel| self.stage(repo, rel))
            .and_then(|()| self.commit(repo).map(|_| ()));
        if let Err(err) = &result {
            warn!(error = %err, "working tree mutated but not committed");
        }
        result
    }

    // ========================================================================
    // Metadata synthesis
    // ========================================================================

    /// Merge a backend stat with the permission collaborator's answers.
    fn stat_meta(&self, resolved: &Resolved) -> Result<FileMeta, DriverError> {
        let meta = fs::metadata(&resolved.abs)?;
        let mut mode = self.perm.mode(&resolved.rel)?;
        if meta.is_dir() {
            mode |= MODE_DIR;
        }
        Ok(FileMeta {
            name: entry_name(&resolved.rel),
            size: meta.len(),
            modified: meta.modified().ok(),
            mode,
            owner: self.perm.owner(&resolved.rel)?,
            group: self.perm.group(&resolved.rel)?,
        })
    }

    /// Metadata for one listing entry: mode bits from the backend stat,
    /// owner/group from the permission collaborator keyed by the child's
    /// own path.
    fn list_entry_meta(
        &self,
        name: &str,
        child_abs: &Path,
        child_rel: &str,
    ) -> Result<FileMeta, DriverError> {
        let meta = fs::metadata(child_abs)?;
        let mut mode = backend_mode(&meta);
        if meta.is_dir() {
            mode |= MODE_DIR;
        }
        Ok(FileMeta {
            name: name.to_string(),
            size: meta.len(),
            modified: meta.modified().ok(),
            mode,
            owner: self.perm.owner(child_rel)?,
            group: self.perm.group(child_rel)?,
        })
    }
}

impl Driver for GitDriver {
    fn change_dir(&self, path: &str) -> Result<(), DriverError> {
        let resolved = self.resolve(path)?;
        let _repo = self.open_repo()?;
        let meta = fs::metadata(&resolved.abs)?;
        if !meta.is_dir() {
            return Err(DriverError::NotADirectory(path.to_string()));
        }
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<FileMeta, DriverError> {
        let resolved = self.resolve(path)?;
        let _repo = self.open_repo()?;
        self.stat_meta(&resolved)
    }

    fn list_dir(
        &self,
        path: &str,
        visit: &mut dyn FnMut(FileMeta) -> Result<(), DriverError>,
    ) -> Result<(), DriverError> {
        let resolved = self.resolve(path)?;
        let _repo = self.open_repo()?;

        let mut names = Vec::new();
        for entry in fs::read_dir(&resolved.abs)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            // The object store is an implementation detail, not content.
            if resolved.rel.is_empty() && name == ".git" {
                continue;
            }
            names.push(name);
        }
        names.sort();

        for name in names {
            let child_abs = resolved.abs.join(&name);
            let child_rel = if resolved.rel.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", resolved.rel, name)
            };
            visit(self.list_entry_meta(&name, &child_abs, &child_rel)?)?;
        }
        Ok(())
    }

    fn delete_dir(&self, path: &str) -> Result<(), DriverError> {
        let resolved = self.resolve(path)?;
        let _guard = self.write_lock.lock();
        let repo = self.open_repo()?;

        let meta = fs::symlink_metadata(&resolved.abs)?;
        if !meta.is_dir() {
            return Err(DriverError::NotADirectory(path.to_string()));
        }
        fs::remove_dir(&resolved.abs)?;
        debug!(path = %resolved.rel, "removed directory");
        self.record(&repo, &[&resolved.rel])
    }

    fn delete_file(&self, path: &str) -> Result<(), DriverError> {
        let resolved = self.resolve(path)?;
        let _guard = self.write_lock.lock();
        let repo = self.open_repo()?;

        let meta = fs::symlink_metadata(&resolved.abs)?;
        if meta.is_dir() {
            return Err(DriverError::NotAFile(path.to_string()));
        }
        fs::remove_file(&resolved.abs)?;
        debug!(path = %resolved.rel, "removed file");
        self.record(&repo, &[&resolved.rel])
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), DriverError> {
        let from_res = self.resolve(from)?;
        let to_res = self.resolve(to)?;
        let _guard = self.write_lock.lock();
        let repo = self.open_repo()?;

        fs::rename(&from_res.abs, &to_res.abs)?;
        debug!(from = %from_res.rel, to = %to_res.rel, "renamed");
        // Both ends: the commit records the removal and the addition.
        self.record(&repo, &[&from_res.rel, &to_res.rel])
    }

    fn make_dir(&self, path: &str) -> Result<(), DriverError> {
        let resolved = self.resolve(path)?;
        let _guard = self.write_lock.lock();
        let repo = self.open_repo()?;

        fs::create_dir_all(&resolved.abs)?;
        debug!(path = %resolved.rel, "created directory");
        self.record(&repo, &[&resolved.rel])
    }

    fn get_file(&self, path: &str, offset: u64) -> Result<(u64, File), DriverError> {
        let resolved = self.resolve(path)?;
        let _repo = self.open_repo()?;

        let size = fs::metadata(&resolved.abs)?.len();
        let mut file = File::open(&resolved.abs)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok((size, file))
    }

    fn put_file(
        &self,
        path: &str,
        data: &mut dyn Read,
        append: bool,
    ) -> Result<u64, DriverError> {
        let resolved = self.resolve(path)?;
        let _guard = self.write_lock.lock();
        let repo = self.open_repo()?;

        let existing = match fs::symlink_metadata(&resolved.abs) {
            Ok(meta) if meta.is_dir() => {
                return Err(DriverError::DirectoryCollision(path.to_string()));
            }
            Ok(meta) => Some(meta),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        // Appending to nothing is just a create.
        let append = append && existing.is_some();

        let bytes = if append {
            let mut file = OpenOptions::new().append(true).open(&resolved.abs)?;
            io::copy(data, &mut file)?
        } else {
            if existing.is_some() {
                fs::remove_file(&resolved.abs)?;
            }
            if let Some(parent) = resolved.abs.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&resolved.abs)?;
            io::copy(data, &mut file)?
        };

        debug!(path = %resolved.rel, bytes, append, "stored file");
        self.record(&repo, &[&resolved.rel])?;
        Ok(bytes)
    }
}

/// Final path segment, or `/` for the root itself.
fn entry_name(rel: &str) -> String {
    rel.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("/")
        .to_string()
}

/// Raw mode bits from a backend stat.
#[cfg(unix)]
fn backend_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn backend_mode(_meta: &fs::Metadata) -> u32 {
    0
}

// ============================================================================
// Tests
// ============================================================================
