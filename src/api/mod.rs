use std::{
    error::Error,
    path::{Path, PathBuf},
};

use crate::{
    cli::command_handlers::{
        do_cache_path, do_checkout, do_clear_cache, do_latest, do_rev_parse, do_tags,
    },
    git::{
        cache::RepositoryCache,
        repository::Repository,
        worktree::{Worktree, WorktreeError},
    },
    resolver::VersionTag,
};

mod builder;

pub use builder::StencilBuilder;

pub struct Stencil {
    cache: RepositoryCache,
}

impl Stencil {
    pub fn builder() -> StencilBuilder {
        StencilBuilder::default()
    }

    pub fn cache(&self) -> &RepositoryCache {
        &self.cache
    }

    /// Clones or refreshes the mirror of a template repository
    pub fn repository(&self, location: &str) -> Result<Repository, Box<dyn Error>> {
        Ok(self.cache.repository(location)?)
    }

    /// Checks out a revision of a template into a temporary worktree that is
    /// removed when dropped
    pub fn worktree(&self, location: &str, revision: &str) -> Result<Worktree, WorktreeError> {
        self.cache.worktree(location, revision)
    }

    /// Finds the latest version tag, optionally restricted by a specifier such as `>=1.0,<2`
    pub fn find_latest(
        &self,
        location: &str,
        specifier: Option<&str>,
    ) -> Result<Option<String>, Box<dyn Error>> {
        do_latest(&self.cache, location, specifier)
    }

    /// Lists version tags in ascending order
    pub fn tags(
        &self,
        location: &str,
        specifier: Option<&str>,
    ) -> Result<Vec<VersionTag>, Box<dyn Error>> {
        do_tags(&self.cache, location, specifier)
    }

    pub fn rev_parse(&self, location: &str, reference: &str) -> Result<String, Box<dyn Error>> {
        do_rev_parse(&self.cache, location, reference)
    }

    /// Copies a template into `destination`, which must not exist yet.
    ///
    /// Uses `revision` if given, otherwise the latest version tag matching
    /// `specifier`, otherwise `HEAD`. Returns the commit that was copied.
    pub fn checkout(
        &self,
        location: &str,
        destination: impl AsRef<Path>,
        revision: Option<&str>,
        specifier: Option<&str>,
    ) -> Result<String, Box<dyn Error>> {
        do_checkout(
            &self.cache,
            location,
            destination.as_ref(),
            revision,
            specifier,
        )
    }

    pub fn cache_path(&self, location: &str) -> PathBuf {
        do_cache_path(&self.cache, location)
    }

    pub fn clear_cache(&self) -> Result<(), Box<dyn Error>> {
        do_clear_cache(&self.cache)
    }
}
