use std::{
    ffi::OsString,
    ops::Deref,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use tempfile::TempDir;
use thiserror::Error;

use super::{
    cache::{CacheError, RepositoryCache},
    repository::Repository,
    GitError,
};

const TEMP_PREFIX: &str = "stencil-";
const CHECKOUT_DIR: &str = "worktree";

#[derive(Error, Debug)]
pub enum WorktreeError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("Revision {revision} not found in {location}")]
    RefNotFound { location: String, revision: String },
    #[error("Git error: {0}")]
    Git(#[from] GitError),
    #[error("Could not create a worktree for {revision}: {source}")]
    CreationFailed { revision: String, source: GitError },
    #[error("Could not remove the worktree at {}: {source}", path.display())]
    Removal { path: PathBuf, source: GitError },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Temporary checkout of a single revision of a cached mirror.
///
/// Derefs to the checked out [`Repository`]. The checkout and its
/// bookkeeping inside the mirror are removed when the value is dropped,
/// including during unwinding.
#[derive(Debug)]
pub struct Worktree {
    checkout: Repository,
    mirror: Repository,
    commit: String,
    directory: Option<TempDir>,
}

impl Worktree {
    /// The commit the worktree is checked out at.
    pub fn commit(&self) -> &str {
        &self.commit
    }

    /// Removes the worktree now, reporting failures instead of logging them.
    pub fn remove(mut self) -> Result<(), WorktreeError> {
        self.cleanup()
    }

    /// Runs `f` against the checkout and removes it afterwards.
    ///
    /// An error from `f` takes precedence over a failure to remove the
    /// checkout, which is then only logged.
    pub fn run<T, E, F>(self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Repository) -> Result<T, E>,
        E: From<WorktreeError>,
    {
        let result = f(&self.checkout);
        let removed = self.remove();

        match (result, removed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(error)) => Err(error.into()),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(removal)) => {
                warn!("{}", removal);
                Err(error)
            }
        }
    }

    fn cleanup(&mut self) -> Result<(), WorktreeError> {
        let Some(directory) = self.directory.take() else {
            return Ok(());
        };
        let path = self.checkout.path().to_path_buf();
        debug!("Removing worktree {}", path.display());

        let removed = self.unregister(&path);

        // The temporary parent goes away even if git refused to remove the checkout.
        let closed = directory.close();

        removed?;
        closed?;
        Ok(())
    }

    fn unregister(&self, path: &Path) -> Result<(), WorktreeError> {
        let args: [OsString; 4] = [
            "worktree".into(),
            "remove".into(),
            "--force".into(),
            path.into(),
        ];
        let Err(error) = self.mirror.git(args) else {
            return Ok(());
        };

        debug!(
            "git worktree remove failed for {}, pruning instead: {}",
            path.display(),
            error
        );
        match std::fs::remove_dir_all(path) {
            Ok(()) => {}
            Err(io) if io.kind() == std::io::ErrorKind::NotFound => {}
            Err(io) => return Err(io.into()),
        }
        self.mirror
            .git(["worktree", "prune"])
            .map_err(|source| WorktreeError::Removal {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(())
    }
}

impl Deref for Worktree {
    type Target = Repository;

    fn deref(&self) -> &Repository {
        &self.checkout
    }
}

impl Drop for Worktree {
    fn drop(&mut self) {
        if let Err(error) = self.cleanup() {
            warn!("{}", error);
        }
    }
}

impl RepositoryCache {
    /// Checks out `revision` of `location` into a fresh temporary directory.
    ///
    /// The mirror is refreshed first. The returned guard removes the checkout
    /// when dropped.
    pub fn worktree(&self, location: &str, revision: &str) -> Result<Worktree, WorktreeError> {
        self.worktree_selecting(location, |_| Ok(revision.to_string()))
    }

    /// Like [`RepositoryCache::worktree`], but `select` picks the revision
    /// from the refreshed mirror while the mirror is still locked, so the
    /// mirror is only fetched once.
    pub fn worktree_selecting<E, S>(&self, location: &str, select: S) -> Result<Worktree, E>
    where
        S: FnOnce(&Repository) -> Result<String, E>,
        E: From<WorktreeError>,
    {
        let (mirror, _lock) = self
            .locked_repository(location)
            .map_err(WorktreeError::from)?;
        let revision = select(&mirror)?;
        Ok(self.add_worktree(mirror, location, &revision)?)
    }

    /// Runs `f` against a temporary checkout and removes it afterwards.
    ///
    /// See [`Worktree::run`] for how errors are reported.
    pub fn with_worktree<T, E, F>(&self, location: &str, revision: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Repository) -> Result<T, E>,
        E: From<WorktreeError>,
    {
        self.worktree(location, revision)?.run(f)
    }

    fn add_worktree(
        &self,
        mirror: Repository,
        location: &str,
        revision: &str,
    ) -> Result<Worktree, WorktreeError> {
        let commit = mirror.rev_parse(revision).map_err(|error| match error {
            GitError::RefNotFound { .. } => WorktreeError::RefNotFound {
                location: location.to_string(),
                revision: revision.to_string(),
            },
            other => other.into(),
        })?;

        let directory = tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir()?;
        let path = directory.path().join(CHECKOUT_DIR);

        info!(
            "Checking out {} ({}) of {} at {}",
            revision,
            commit,
            location,
            path.display()
        );
        let args: [OsString; 5] = [
            "worktree".into(),
            "add".into(),
            "--detach".into(),
            path.as_os_str().into(),
            commit.as_str().into(),
        ];
        mirror
            .git(args)
            .map_err(|source| WorktreeError::CreationFailed {
                revision: revision.to_string(),
                source,
            })?;

        let checkout = Repository::new(
            self.runner().clone(),
            path,
            mirror.location().map(str::to_string),
        );
        Ok(Worktree {
            checkout,
            mirror,
            commit,
            directory: Some(directory),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use crate::git::command::{render_args, CommandOutput, MockCommandRunner};

    const COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

    /// Mock git that records every invocation and actually creates the
    /// checkout directory on `worktree add`.
    fn recording_runner(
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        fail_add: bool,
    ) -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |_, args| {
            let rendered = render_args(args);
            calls.lock().unwrap().push(rendered.clone());
            match rendered.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
                ["rev-parse", .., reference] if reference.starts_with("missing") => {
                    Err(GitError::CommandFailed {
                        program: "git".to_string(),
                        args: rendered.clone(),
                        code: Some(1),
                        stderr: String::new(),
                    })
                }
                ["rev-parse", ..] => Ok(CommandOutput {
                    stdout: COMMIT.to_string(),
                    ..Default::default()
                }),
                ["worktree", "add", _, path, _] => {
                    if fail_add {
                        return Err(GitError::CommandFailed {
                            program: "git".to_string(),
                            args: rendered.clone(),
                            code: Some(128),
                            stderr: "fatal: disk full".to_string(),
                        });
                    }
                    std::fs::create_dir_all(path).unwrap();
                    Ok(CommandOutput::default())
                }
                ["worktree", "remove", "--force", path] => {
                    std::fs::remove_dir_all(path).unwrap();
                    Ok(CommandOutput::default())
                }
                _ => Ok(CommandOutput::default()),
            }
        });
        runner
    }

    fn cache_with(runner: MockCommandRunner) -> (tempfile::TempDir, RepositoryCache) {
        let root = tempfile::tempdir().unwrap();
        let cache = RepositoryCache::new(root.path().to_path_buf(), Arc::new(runner)).unwrap();
        (root, cache)
    }

    #[test]
    fn worktree_is_removed_on_drop() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (_root, cache) = cache_with(recording_runner(calls.clone(), false));

        let worktree = cache.worktree("https://example.com/t", "HEAD").unwrap();
        let path = worktree.path().to_path_buf();
        let parent = path.parent().unwrap().to_path_buf();
        assert!(path.is_dir());
        assert!(!path.starts_with(cache.root()));
        assert_eq!(worktree.commit(), COMMIT);
        assert_eq!(worktree.location(), Some("https://example.com/t"));

        drop(worktree);
        assert!(!path.exists());
        assert!(!parent.exists());

        let calls = calls.lock().unwrap();
        let last = calls.last().unwrap();
        assert_eq!(&last[..3], ["worktree", "remove", "--force"]);
    }

    #[test]
    fn worktree_is_removed_when_closure_fails() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (_root, cache) = cache_with(recording_runner(calls, false));

        let mut seen = None;
        let result: Result<(), anyhow::Error> =
            cache.with_worktree("https://example.com/t", "HEAD", |checkout| {
                seen = Some(checkout.path().to_path_buf());
                anyhow::bail!("template is broken")
            });

        assert_eq!(result.unwrap_err().to_string(), "template is broken");
        assert!(!seen.unwrap().exists());
    }

    #[test]
    fn worktree_is_removed_on_panic() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (_root, cache) = cache_with(recording_runner(calls, false));
        let seen = Mutex::new(None);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let worktree = cache.worktree("https://example.com/t", "HEAD").unwrap();
            *seen.lock().unwrap() = Some(worktree.path().to_path_buf());
            panic!("renderer crashed");
        }));

        assert!(outcome.is_err());
        let path = seen.lock().unwrap().take().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn unknown_revision_is_ref_not_found() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (_root, cache) = cache_with(recording_runner(calls.clone(), false));

        let error = cache
            .worktree("https://example.com/t", "missing-branch")
            .unwrap_err();
        assert!(
            matches!(&error, WorktreeError::RefNotFound { revision, .. } if revision == "missing-branch"),
            "{error:?}"
        );
        assert!(calls
            .lock()
            .unwrap()
            .iter()
            .all(|call| call[0] != "worktree"));
    }

    #[test]
    fn failed_add_is_creation_failed() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (_root, cache) = cache_with(recording_runner(calls, true));

        let error = cache.worktree("https://example.com/t", "HEAD").unwrap_err();
        assert!(
            matches!(error, WorktreeError::CreationFailed { .. }),
            "{error:?}"
        );
    }

    #[test]
    fn explicit_remove_reports_success() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (_root, cache) = cache_with(recording_runner(calls.clone(), false));

        let worktree = cache.worktree("https://example.com/t", "v1.0.0").unwrap();
        let path = worktree.path().to_path_buf();
        worktree.remove().unwrap();
        assert!(!path.exists());

        // dropping after an explicit removal does not run git again
        let removals = calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.get(1).map(String::as_str) == Some("remove"))
            .count();
        assert_eq!(removals, 1);
    }
}
