use std::{error::Error, path::PathBuf};

use home::home_dir;
use log::debug;

use crate::{
    config::StencilConfig,
    git::{cache::RepositoryCache, command::Git},
    Stencil,
};

#[derive(Default)]
pub struct StencilBuilder {
    cache_directory_path: Option<PathBuf>,
    git_program: Option<PathBuf>,
    skip_config: bool,
}

impl StencilBuilder {
    /// Location of the template cache directory.
    ///
    /// Defaults to `STENCIL_CACHE_DIR`, then the `cache.dir` setting of the
    /// configuration file, then the user cache directory.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    /// Git executable to run.
    ///
    /// Defaults to `STENCIL_GIT_PROGRAM`, then `git.program`, then `git`.
    pub fn git_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.git_program = Some(program.into());
        self
    }

    /// Ignores the configuration file and `STENCIL_*` variables.
    pub fn without_config(mut self) -> Self {
        self.skip_config = true;
        self
    }

    pub fn try_build(self) -> Result<Stencil, Box<dyn Error>> {
        let Self {
            cache_directory_path,
            git_program,
            skip_config,
        } = self;

        let config = if skip_config {
            StencilConfig::default()
        } else {
            StencilConfig::load()?
        };

        let cache_directory = match cache_directory_path.or(config.cache_dir) {
            Some(path) => path,
            None => default_cache_directory()?,
        };
        let git = match git_program.or(config.git_program) {
            Some(program) => Git::new(program),
            None => Git::default(),
        };
        debug!(
            "Using cache {} and git program {}",
            cache_directory.display(),
            git.program().display()
        );

        let cache = RepositoryCache::new(cache_directory, git.shared())?;

        Ok(Stencil { cache })
    }
}

fn default_cache_directory() -> Result<PathBuf, Box<dyn Error>> {
    if let Some(cache_directory) = dirs::cache_dir() {
        return Ok(cache_directory.join("stencil"));
    }
    let mut cache_directory =
        home_dir().ok_or("Could not find home dir. Please define $HOME env variable.")?;
    cache_directory.push(".cache/stencil");
    Ok(cache_directory)
}
