use std::{collections::HashMap, fmt::Display};

use log::{debug, trace};
use thiserror::Error;

use crate::{
    git::{repository::Repository, GitError},
    version::{InvalidVersion, SpecifierError, SpecifierSet, Version},
};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Specifier(#[from] SpecifierError),
}

/// A tag whose name parses as a version, e.g. `v1.2.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTag {
    pub name: String,
    pub version: Version,
}

impl VersionTag {
    pub fn create(name: impl Into<String>) -> Result<Self, InvalidVersion> {
        let name = name.into();
        let version = Version::parse(name.strip_prefix('v').unwrap_or(&name))
            .map_err(|_| InvalidVersion(name.clone()))?;
        Ok(VersionTag { name, version })
    }
}

impl Display for VersionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Tags of `repository` that are versions. Other tags are skipped.
pub fn load(repository: &Repository) -> Result<impl Iterator<Item = VersionTag>, GitError> {
    Ok(repository
        .tags()?
        .filter_map(|name| match VersionTag::create(name) {
            Ok(tag) => Some(tag),
            Err(error) => {
                trace!("Ignoring tag: {}", error);
                None
            }
        }))
}

/// Tags whose version satisfies `specifier`, in their original order.
///
/// Tags naming the same version (`v1.0` and `v1.0.0`) collapse into the one
/// seen last.
pub fn filter(
    tags: impl IntoIterator<Item = VersionTag>,
    specifier: &str,
) -> Result<Vec<VersionTag>, SpecifierError> {
    let specifiers = SpecifierSet::parse(specifier)?;
    Ok(specifiers.filter(deduplicate(tags), |tag| &tag.version))
}

fn deduplicate(tags: impl IntoIterator<Item = VersionTag>) -> Vec<VersionTag> {
    let mut positions: HashMap<Version, usize> = HashMap::new();
    let mut unique: Vec<VersionTag> = Vec::new();
    for tag in tags {
        match positions.get(&tag.version) {
            Some(&position) => {
                trace!("{} replaces {}", tag.name, unique[position].name);
                unique[position] = tag;
            }
            None => {
                positions.insert(tag.version.clone(), unique.len());
                unique.push(tag);
            }
        }
    }
    unique
}

/// Name of the tag with the highest version, optionally restricted to
/// versions matching `specifier`.
pub fn find_latest(
    repository: &Repository,
    specifier: Option<&str>,
) -> Result<Option<String>, ResolveError> {
    if let Some(specifier) = specifier {
        SpecifierSet::parse(specifier)?;
    }

    let mut tags: Vec<VersionTag> = load(repository)?.collect();
    if let Some(specifier) = specifier {
        if !tags.is_empty() {
            tags = filter(tags, specifier)?;
        }
    }

    let latest = tags.into_iter().reduce(|latest, tag| {
        if tag.version > latest.version {
            tag
        } else {
            latest
        }
    });
    debug!(
        "Latest tag of {} matching {:?}: {:?}",
        repository.path().display(),
        specifier,
        latest.as_ref().map(|tag| tag.name.as_str())
    );
    Ok(latest.map(|tag| tag.name))
}

/// Tags ordered by ascending version.
pub fn sorted(tags: impl IntoIterator<Item = VersionTag>) -> Vec<VersionTag> {
    let mut tags: Vec<VersionTag> = tags.into_iter().collect();
    tags.sort_by(|left, right| left.version.cmp(&right.version));
    tags
}
