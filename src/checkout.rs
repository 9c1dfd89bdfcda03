use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::{
    git::{
        cache::RepositoryCache,
        repository::Repository,
        worktree::WorktreeError,
        GitError,
    },
    resolver::{self, ResolveError},
};

const GIT_DIR: &str = ".git";
const DEFAULT_REVISION: &str = "HEAD";

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Destination {} already exists", path.display())]
    DestinationExists { path: PathBuf },
    #[error(transparent)]
    Worktree(#[from] WorktreeError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Git error: {0}")]
    Git(#[from] GitError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Picks the revision to check out: `checkout` when given, otherwise the
/// latest tag matching `specifier`, otherwise `HEAD`.
pub fn resolve_revision(
    repository: &Repository,
    checkout: Option<&str>,
    specifier: Option<&str>,
) -> Result<String, ResolveError> {
    if let Some(checkout) = checkout {
        return Ok(checkout.to_string());
    }
    Ok(resolver::find_latest(repository, specifier)?
        .unwrap_or_else(|| DEFAULT_REVISION.to_string()))
}

/// Copies a revision of the template at `location` into `destination` and
/// returns the commit it was taken from.
pub fn checkout(
    cache: &RepositoryCache,
    location: &str,
    destination: &Path,
    checkout: Option<&str>,
    specifier: Option<&str>,
) -> Result<String, CheckoutError> {
    if destination.exists() {
        return Err(CheckoutError::DestinationExists {
            path: destination.to_path_buf(),
        });
    }

    let worktree = cache.worktree_selecting(location, |mirror| {
        let revision = resolve_revision(mirror, checkout, specifier)?;
        info!("Using revision {} of {}", revision, location);
        Ok::<_, CheckoutError>(revision)
    })?;

    worktree.run(|worktree| {
        let commit = worktree.rev_parse(DEFAULT_REVISION)?;
        if let Err(error) = copy_tree(worktree.path(), destination) {
            if destination.exists() {
                if let Err(cleanup) = std::fs::remove_dir_all(destination) {
                    warn!(
                        "Could not remove partial checkout {}: {}",
                        destination.display(),
                        cleanup
                    );
                }
            }
            return Err(error.into());
        }
        info!("Copied {} ({}) into {}", location, commit, destination.display());
        Ok(commit)
    })
}

/// Recursively copies `source` into `target`, leaving out git metadata.
fn copy_tree(source: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(target)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        if entry.file_name() == GIT_DIR {
            continue;
        }
        let from = entry.path();
        let to = target.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(std::fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    if from.is_dir() {
        copy_tree(from, to)
    } else {
        std::fs::copy(from, to).map(|_| ())
    }
}
