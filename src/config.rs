use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use config::{Config, ConfigError, Environment, File, FileFormat};
use log::debug;
use serde::Deserialize;

const CONFIG_FILE: &str = "stencil/config.toml";

#[derive(Default)]
pub struct StencilConfig {
    pub cache_dir: Option<PathBuf>,
    pub git_program: Option<PathBuf>,
}

impl StencilConfig {
    /// Reads `<config dir>/stencil/config.toml` and `STENCIL_*` variables.
    pub fn load() -> anyhow::Result<Self> {
        let file = dirs::config_dir().map(|directory| directory.join(CONFIG_FILE));
        let raw_config = RawConfig::load(file.as_deref(), None)?;

        Ok(Self {
            cache_dir: raw_config.cache.dir,
            git_program: raw_config.git.program,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    git: GitConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CacheConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct GitConfig {
    program: Option<PathBuf>,
}

impl RawConfig {
    fn load(file: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            debug!("Reading configuration from {}", file.display());
            builder = builder.add_source(
                File::from(file)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        builder
            .add_source(
                Environment::with_prefix("STENCIL")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
