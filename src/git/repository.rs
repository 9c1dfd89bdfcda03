use std::{
    ffi::OsString,
    fmt::Debug,
    path::{Path, PathBuf},
};

use log::{debug, trace};

use super::{
    command::{CommandOutput, SharedRunner},
    GitError,
};

/// A git working copy or mirror on disk.
#[derive(Clone)]
pub struct Repository {
    path: PathBuf,
    location: Option<String>,
    runner: SharedRunner,
}

impl Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .field("location", &self.location)
            .finish()
    }
}

impl Repository {
    /// Wraps a path that is already known to hold a git directory.
    pub(crate) fn new(runner: SharedRunner, path: PathBuf, location: Option<String>) -> Self {
        Repository {
            path,
            location,
            runner,
        }
    }

    /// Initializes a new repository, creating the directory if needed.
    pub fn init(runner: SharedRunner, path: impl Into<PathBuf>) -> Result<Self, GitError> {
        let path = path.into();
        std::fs::create_dir_all(&path)?;
        runner.run(&path, &[OsString::from("init")])?;
        debug!("Initialized repository at {}", path.display());
        Ok(Repository::new(runner, path, None))
    }

    /// Opens an existing repository or mirror.
    pub fn open(runner: SharedRunner, path: impl Into<PathBuf>) -> Result<Self, GitError> {
        let path = path.into();
        if !path.is_dir() {
            return Err(GitError::NotARepository { path });
        }
        match runner.run(&path, &["rev-parse".into(), "--git-dir".into()]) {
            Ok(_) => Ok(Repository::new(runner, path, None)),
            Err(GitError::CommandFailed { .. }) => Err(GitError::NotARepository { path }),
            Err(error) => Err(error),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The remote location this repository was cloned from, if known.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Runs an arbitrary git subcommand inside the repository.
    pub fn git<I, S>(&self, args: I) -> Result<CommandOutput, GitError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        self.runner.run(&self.path, &args)
    }

    /// Names of all tags, in whatever order git lists them.
    ///
    /// Every call queries git again, so the sequence reflects the latest
    /// fetch.
    pub fn tags(&self) -> Result<impl Iterator<Item = String>, GitError> {
        let output = self.git(["tag", "--list"])?;
        let tags: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        trace!("Found {} tags in {}", tags.len(), self.path.display());
        Ok(tags.into_iter())
    }

    /// Resolves a branch, tag or commit-ish to a full commit hash.
    pub fn rev_parse(&self, reference: &str) -> Result<String, GitError> {
        let result = self.git([
            "rev-parse".to_string(),
            "--verify".to_string(),
            "--quiet".to_string(),
            format!("{reference}^{{commit}}"),
        ]);
        match result {
            Ok(output) if !output.stdout.is_empty() => Ok(output.stdout),
            Ok(_) => Err(GitError::RefNotFound {
                reference: reference.to_string(),
            }),
            // `--verify --quiet` exits with 1 and prints nothing for refs that do not resolve
            Err(error) if error.exit_code() == Some(1) => {
                trace!("{} does not resolve: {}", reference, error);
                Err(GitError::RefNotFound {
                    reference: reference.to_string(),
                })
            }
            Err(error) => Err(error),
        }
    }

    pub fn remote_url(&self, remote: &str) -> Result<String, GitError> {
        Ok(self.git(["remote", "get-url", remote])?.stdout)
    }
}
