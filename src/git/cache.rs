use std::{
    ffi::OsString,
    fmt::Display,
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, info, trace};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::flock::FileLock;

use super::{command::SharedRunner, repository::Repository, GitError};

const LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Directory name of a mirror inside the cache root.
///
/// The SHA-256 digest of the location string, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_location(location: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(location.as_bytes());
        CacheKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persistent mirrors of remote template repositories.
pub struct RepositoryCache {
    root: PathBuf,
    runner: SharedRunner,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache location {} is not a directory", location.display())]
    BadLocation { location: PathBuf },
    #[error("Cache lock cannot be acquired: {0}")]
    Lock(#[from] crate::flock::Error),
    #[error("Could not clone {location}: {source}")]
    CloneFailed { location: String, source: GitError },
    #[error("Could not update the mirror of {location}: {source}")]
    FetchFailed { location: String, source: GitError },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl RepositoryCache {
    pub fn new(root: PathBuf, runner: SharedRunner) -> Result<RepositoryCache, CacheError> {
        if root.exists() {
            if !root.is_dir() {
                return Err(CacheError::BadLocation { location: root });
            }
        } else {
            std::fs::create_dir_all(&root)?;
        }
        let root = absolute(&root)?;

        Ok(RepositoryCache { root, runner })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn runner(&self) -> &SharedRunner {
        &self.runner
    }

    /// Where the mirror of `location` lives, whether or not it exists yet.
    pub fn mirror_path(&self, location: &str) -> PathBuf {
        let location = resolve_location(location);
        self.root.join(CacheKey::for_location(&location).as_str())
    }

    /// Returns the mirror of `location`, cloning it on first use and fetching
    /// every ref on each later call.
    pub fn repository(&self, location: &str) -> Result<Repository, CacheError> {
        let (repository, _lock) = self.locked_repository(location)?;
        Ok(repository)
    }

    /// Same as [`RepositoryCache::repository`], but keeps the per-mirror lock
    /// held so the caller can register worktrees before another process
    /// fetches.
    pub(crate) fn locked_repository(
        &self,
        location: &str,
    ) -> Result<(Repository, FileLock), CacheError> {
        let location = resolve_location(location);
        let key = CacheKey::for_location(&location);
        let path = self.root.join(key.as_str());
        let lock = self.acquire_lock(&key)?;

        if path.exists() {
            self.fetch(&path, &location)?;
        } else {
            self.clone_mirror(&path, &location)?;
        }

        let repository = Repository::new(self.runner.clone(), path, Some(location));
        Ok((repository, lock))
    }

    /// Removes every mirror.
    pub fn clear(&self) -> Result<(), CacheError> {
        if self.root.exists() {
            info!("Clearing template cache {}.", self.root.display());
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }

    fn acquire_lock(&self, key: &CacheKey) -> Result<FileLock, CacheError> {
        let path = self.root.join(format!("{key}.lock"));
        debug!("Acquiring a lock on {}", path.display());
        Ok(FileLock::acquire(&path, LOCK_TIMEOUT)?)
    }

    fn clone_mirror(&self, path: &Path, location: &str) -> Result<(), CacheError> {
        info!("Cloning {} into {}", location, path.display());
        // `--` keeps a location such as `--upload-pack=...` from being read as an option
        let args: [OsString; 5] = [
            "clone".into(),
            "--mirror".into(),
            "--".into(),
            location.into(),
            path.into(),
        ];
        self.runner
            .run(&self.root, &args)
            .map_err(|source| CacheError::CloneFailed {
                location: location.to_string(),
                source,
            })?;
        Ok(())
    }

    fn fetch(&self, path: &Path, location: &str) -> Result<(), CacheError> {
        debug!("Updating mirror of {} at {}", location, path.display());
        let args: [OsString; 3] = ["fetch".into(), "--prune".into(), "origin".into()];
        self.runner
            .run(path, &args)
            .map_err(|source| CacheError::FetchFailed {
                location: location.to_string(),
                source,
            })?;
        trace!("Mirror of {} is up to date", location);
        Ok(())
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    // drops `.` components, so `./template` and `template` agree
    Ok(path.components().collect())
}

/// Local template directories are keyed and cloned by their absolute path.
/// Anything else, URLs and `user@host:path` included, is used verbatim.
fn resolve_location(location: &str) -> String {
    let path = Path::new(location);
    if location.contains("://") || !path.is_dir() {
        return location.to_string();
    }
    match absolute(path) {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(error) => {
            debug!("Could not resolve {}: {}", location, error);
            location.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::git::command::{render_args, CommandOutput, MockCommandRunner};

    fn failure(args: &[OsString], stderr: &str) -> GitError {
        GitError::CommandFailed {
            program: "git".to_string(),
            args: render_args(args),
            code: Some(128),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn key_is_stable_and_location_specific() {
        let key = CacheKey::for_location("https://github.com/org/template");
        assert_eq!(key, CacheKey::for_location("https://github.com/org/template"));
        assert_ne!(key, CacheKey::for_location("https://github.com/org/template.git"));
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn mirror_path_is_under_root() {
        let root = tempfile::tempdir().unwrap();
        let cache =
            RepositoryCache::new(root.path().to_path_buf(), Arc::new(MockCommandRunner::new()))
                .unwrap();
        let path = cache.mirror_path("/some/where");
        assert_eq!(path.parent(), Some(root.path()));
        assert_eq!(path, cache.mirror_path("/some/where"));
    }

    #[test]
    fn root_must_be_a_directory() {
        let root = tempfile::NamedTempFile::new().unwrap();
        let result = RepositoryCache::new(
            root.path().to_path_buf(),
            Arc::new(MockCommandRunner::new()),
        );
        assert!(matches!(result, Err(CacheError::BadLocation { .. })));
    }

    #[test]
    fn missing_mirror_is_cloned() {
        let root = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, args| {
                args.len() == 5
                    && args[..4] == ["clone", "--mirror", "--", "https://example.com/template"]
                    && Path::new(&args[4]).is_absolute()
            })
            .times(1)
            .returning(|_, _| Ok(CommandOutput::default()));
        let cache = RepositoryCache::new(root.path().to_path_buf(), Arc::new(runner)).unwrap();

        let repository = cache.repository("https://example.com/template").unwrap();
        assert_eq!(repository.path(), cache.mirror_path("https://example.com/template"));
        assert_eq!(repository.location(), Some("https://example.com/template"));
    }

    #[test]
    fn clone_failure_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, args| Err(failure(args, "fatal: repository not found")));
        let cache = RepositoryCache::new(root.path().to_path_buf(), Arc::new(runner)).unwrap();

        let error = cache.repository("https://example.com/missing").unwrap_err();
        match error {
            CacheError::CloneFailed { location, source } => {
                assert_eq!(location, "https://example.com/missing");
                assert!(source.to_string().contains("repository not found"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn existing_mirror_is_fetched() {
        let root = tempfile::tempdir().unwrap();
        let location = "https://example.com/template";
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, args| args == ["fetch", "--prune", "origin"])
            .times(1)
            .returning(|_, _| Ok(CommandOutput::default()));
        let cache = RepositoryCache::new(root.path().to_path_buf(), Arc::new(runner)).unwrap();
        std::fs::create_dir(cache.mirror_path(location)).unwrap();

        let repository = cache.repository(location).unwrap();
        assert_eq!(repository.path(), cache.mirror_path(location));
    }

    #[test]
    fn fetch_failure_keeps_the_mirror() {
        let root = tempfile::tempdir().unwrap();
        let location = "https://example.com/template";
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, args| Err(failure(args, "fatal: could not resolve host")));
        let cache = RepositoryCache::new(root.path().to_path_buf(), Arc::new(runner)).unwrap();
        let mirror = cache.mirror_path(location);
        std::fs::create_dir(&mirror).unwrap();

        let error = cache.repository(location).unwrap_err();
        assert!(
            matches!(error, CacheError::FetchFailed { .. }),
            "{error:?}"
        );
        assert!(mirror.is_dir());
    }

    #[test]
    fn clear_removes_the_root() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("cache");
        let cache = RepositoryCache::new(path.clone(), Arc::new(MockCommandRunner::new())).unwrap();
        std::fs::create_dir(path.join("mirror")).unwrap();

        cache.clear().unwrap();
        assert!(!path.exists());
        // clearing twice is fine
        cache.clear().unwrap();
    }

    #[test]
    fn relative_root_is_made_absolute() {
        let parent = tempfile::tempdir_in(".").unwrap();
        let relative = parent.path().join("cache");
        assert!(relative.is_relative());

        let cache =
            RepositoryCache::new(relative.clone(), Arc::new(MockCommandRunner::new())).unwrap();
        assert!(cache.root().is_absolute());
        assert_eq!(
            cache.root(),
            absolute(&relative).unwrap()
        );
        assert!(cache.mirror_path("https://example.com/t").is_absolute());
    }

    #[test]
    fn local_locations_are_keyed_by_absolute_path() {
        let template = tempfile::tempdir_in(".").unwrap();
        let relative = template.path().to_str().unwrap().to_string();
        let name = template.path().file_name().unwrap().to_str().unwrap();
        let absolute_location = absolute(template.path()).unwrap();

        assert_eq!(
            resolve_location(&relative),
            absolute_location.to_str().unwrap()
        );
        assert_eq!(resolve_location(name), resolve_location(&format!("./{name}")));
        assert_eq!(
            resolve_location("https://example.com/t"),
            "https://example.com/t"
        );
        assert_eq!(resolve_location("git@example.com:t.git"), "git@example.com:t.git");
    }

    #[test]
    fn option_like_location_is_passed_after_separator() {
        let root = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, args| args[2] == "--" && args[3] == "--upload-pack=touch /tmp/x")
            .times(1)
            .returning(|_, args| Err(failure(args, "fatal: repository does not exist")));
        let cache = RepositoryCache::new(root.path().to_path_buf(), Arc::new(runner)).unwrap();

        let error = cache.repository("--upload-pack=touch /tmp/x").unwrap_err();
        assert!(matches!(error, CacheError::CloneFailed { .. }), "{error:?}");
    }
}
