use std::{
    error::Error,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{
    checkout,
    git::cache::RepositoryCache,
    resolver::{self, VersionTag},
};

/// Handler to latest command
pub fn do_latest(
    cache: &RepositoryCache,
    location: &str,
    specifier: Option<&str>,
) -> Result<Option<String>, Box<dyn Error>> {
    let repository = cache.repository(location)?;
    Ok(resolver::find_latest(&repository, specifier)?)
}

/// Handler to tags command
/// Lists version tags in ascending order, restricted to `specifier` if given
pub fn do_tags(
    cache: &RepositoryCache,
    location: &str,
    specifier: Option<&str>,
) -> Result<Vec<VersionTag>, Box<dyn Error>> {
    let repository = cache.repository(location)?;
    let tags = resolver::load(&repository)?;
    let tags = match specifier {
        Some(specifier) => resolver::filter(tags, specifier)?,
        None => tags.collect(),
    };
    debug!("Found {} version tags in {}", tags.len(), location);
    Ok(resolver::sorted(tags))
}

pub fn do_rev_parse(
    cache: &RepositoryCache,
    location: &str,
    reference: &str,
) -> Result<String, Box<dyn Error>> {
    let repository = cache.repository(location)?;
    Ok(repository.rev_parse(reference)?)
}

/// Handler to checkout command
pub fn do_checkout(
    cache: &RepositoryCache,
    location: &str,
    destination: &Path,
    revision: Option<&str>,
    specifier: Option<&str>,
) -> Result<String, Box<dyn Error>> {
    Ok(checkout::checkout(
        cache,
        location,
        destination,
        revision,
        specifier,
    )?)
}

pub fn do_cache_path(cache: &RepositoryCache, location: &str) -> PathBuf {
    cache.mirror_path(location)
}

pub fn do_clear_cache(cache: &RepositoryCache) -> Result<(), Box<dyn Error>> {
    cache.clear()?;
    info!("Template cache cleared.");
    Ok(())
}
