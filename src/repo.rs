use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};
use crate::object::FileObjectStore;
use crate::refs;

/// a strata repository
///
/// immutable revision objects live in the sharded object store; refs are
/// the only mutable state and live as files under `refs/`.
pub struct Repository {
    path: PathBuf,
    config: Config,
}

impl Repository {
    /// initialize a new repository at the given path
    pub fn init(path: &Path) -> Result<Self> {
        let config_path = path.join("config.toml");
        if config_path.exists() {
            return Err(Error::RepoExists(path.to_path_buf()));
        }

        // create directory structure
        std::fs::create_dir_all(path.join("objects")).with_path(path)?;
        std::fs::create_dir_all(path.join("refs/heads")).with_path(path)?;
        std::fs::create_dir_all(path.join("refs/tags")).with_path(path)?;
        std::fs::create_dir_all(path.join("tmp")).with_path(path)?;

        let config = Config::default();
        config.save(&config_path)?;

        let repo = Self {
            path: path.to_path_buf(),
            config,
        };
        refs::write_symref(&repo, refs::HEAD, refs::DEFAULT_BRANCH)?;
        Ok(repo)
    }

    /// open an existing repository
    pub fn open(path: &Path) -> Result<Self> {
        let config_path = path.join("config.toml");
        if !config_path.exists() {
            return Err(Error::NoRepo(path.to_path_buf()));
        }

        let config = Config::load(&config_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// repository root path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// repository configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// mutable access to configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// save configuration changes
    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.config_path())
    }

    /// path to config.toml
    pub fn config_path(&self) -> PathBuf {
        self.path.join("config.toml")
    }

    /// path to the objects directory
    pub fn objects_path(&self) -> PathBuf {
        self.path.join("objects")
    }

    /// path to the refs directory
    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    /// path to tmp directory (for atomic writes)
    pub fn tmp_path(&self) -> PathBuf {
        self.path.join("tmp")
    }

    /// path to lock file
    pub fn lock_path(&self) -> PathBuf {
        self.path.join(".lock")
    }

    /// the content-addressed object store of this repository
    pub fn store(&self) -> FileObjectStore {
        FileObjectStore::new(self.objects_path(), self.tmp_path())
    }

    /// shallow history depth, None for complete repositories
    pub fn depth(&self) -> Option<u64> {
        self.config.depth
    }

    /// record this repository as shallow at the given depth
    pub fn set_depth(&mut self, depth: Option<u64>) -> Result<()> {
        self.config.depth = depth;
        self.save_config()
    }

    /// is this a shallow clone
    pub fn is_shallow(&self) -> bool {
        self.config.depth.is_some()
    }

    /// acquire exclusive lock on the repository
    /// returns a guard that releases the lock on drop
    pub fn lock(&self) -> Result<RepoLock> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;
        file.try_lock_exclusive()
            .map_err(|_| Error::LockContention)?;
        Ok(RepoLock { file })
    }

    /// try to acquire exclusive lock, returning None if already locked
    pub fn try_lock(&self) -> Result<Option<RepoLock>> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(RepoLock { file })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(_) => Err(Error::LockContention),
        }
    }
}

/// guard that holds the repository lock until dropped
pub struct RepoLock {
    file: File,
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_repo_init() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");

        let repo = Repository::init(&repo_path).unwrap();

        // verify structure
        assert!(repo_path.join("objects").is_dir());
        assert!(repo_path.join("refs/heads").is_dir());
        assert!(repo_path.join("refs/tags").is_dir());
        assert!(repo_path.join("tmp").is_dir());
        assert!(repo_path.join("config.toml").is_file());
        assert!(repo_path.join("HEAD").is_file());

        assert!(!repo.is_shallow());
    }

    #[test]
    fn test_repo_init_already_exists() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");

        Repository::init(&repo_path).unwrap();
        let result = Repository::init(&repo_path);

        assert!(matches!(result, Err(Error::RepoExists(_))));
    }

    #[test]
    fn test_repo_open() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");

        Repository::init(&repo_path).unwrap();
        let repo = Repository::open(&repo_path).unwrap();

        assert_eq!(repo.path(), repo_path);
    }

    #[test]
    fn test_repo_open_not_found() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("nonexistent");

        let result = Repository::open(&repo_path);
        assert!(matches!(result, Err(Error::NoRepo(_))));
    }

    #[test]
    fn test_shallow_depth_persists() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");

        let mut repo = Repository::init(&repo_path).unwrap();
        assert_eq!(repo.depth(), None);

        repo.set_depth(Some(5)).unwrap();
        assert!(repo.is_shallow());

        // reopen and verify
        let reopened = Repository::open(&repo_path).unwrap();
        assert_eq!(reopened.depth(), Some(5));
    }

    #[test]
    fn test_repo_lock() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");
        let repo = Repository::init(&repo_path).unwrap();

        // acquire lock
        let lock = repo.lock().unwrap();

        // try to acquire again should fail
        let result = repo.try_lock().unwrap();
        assert!(result.is_none());

        // drop lock
        drop(lock);

        // now should succeed
        let lock2 = repo.try_lock().unwrap();
        assert!(lock2.is_some());
    }

    #[test]
    fn test_config_modification() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");
        let mut repo = Repository::init(&repo_path).unwrap();

        repo.config_mut()
            .add_remote("origin", "http://server/repo")
            .unwrap();
        repo.save_config().unwrap();

        // reopen and verify
        let repo2 = Repository::open(&repo_path).unwrap();
        assert_eq!(repo2.config().remotes.len(), 1);
        assert_eq!(repo2.config().remotes[0].name, "origin");
    }
}
