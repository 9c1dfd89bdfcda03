//! Release versions in the PEP 440 scheme and ranges over them.
//!
//! Template tags such as `v1.2.0`, `2.0.0-rc1` or `1.0.post2` are parsed into
//! [`Version`] values whose ordering matches what Python packaging tools use,
//! so that `10 > 2`, `2.0rc1 < 2.0 < 2.0.post1`, and `1.0 == 1.0.0`.

mod specifier;

use std::{
    cmp::Ordering,
    fmt::{Display, Write},
    hash::{Hash, Hasher},
    str::FromStr,
    sync::OnceLock,
};

use regex_lite::{Captures, Regex};
use thiserror::Error;

pub use specifier::{Operator, Specifier, SpecifierError, SpecifierSet};

const VERSION_PATTERN: &str = r"(?xi)
    ^\s*
    v?
    (?:(?P<epoch>[0-9]+)!)?
    (?P<release>[0-9]+(?:\.[0-9]+)*)
    (?P<pre>
        [-_\.]?
        (?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)
        [-_\.]?
        (?P<pre_n>[0-9]+)?
    )?
    (?P<post>
        (?:-(?P<post_n1>[0-9]+))
        |
        (?:
            [-_\.]?
            (?P<post_l>post|rev|r)
            [-_\.]?
            (?P<post_n2>[0-9]+)?
        )
    )?
    (?P<dev>
        [-_\.]?
        (?P<dev_l>dev)
        [-_\.]?
        (?P<dev_n>[0-9]+)?
    )?
    (?:\+(?P<local>[a-z0-9]+(?:[-_\.][a-z0-9]+)*))?
    \s*$
";

fn version_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(VERSION_PATTERN).unwrap())
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid version: '{0}'")]
pub struct InvalidVersion(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreReleaseKind {
    Alpha,
    Beta,
    ReleaseCandidate,
}

impl PreReleaseKind {
    fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "a" | "alpha" => PreReleaseKind::Alpha,
            "b" | "beta" => PreReleaseKind::Beta,
            _ => PreReleaseKind::ReleaseCandidate,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            PreReleaseKind::Alpha => "a",
            PreReleaseKind::Beta => "b",
            PreReleaseKind::ReleaseCandidate => "rc",
        }
    }
}

/// One dot-separated part of a local version label.
///
/// Alphanumeric parts sort before numeric ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalSegment {
    Text(String),
    Number(u64),
}

impl Display for LocalSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocalSegment::Text(text) => f.write_str(text),
            LocalSegment::Number(number) => write!(f, "{number}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreReleaseKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<Vec<LocalSegment>>,
}

/// Position of the pre-release component in the ordering.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum PreKey {
    // 1.0.dev0 has no pre-release but must sort before 1.0a0
    DevOnly,
    Pre(PreReleaseKind, u64),
    Final,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum DevKey {
    Dev(u64),
    None,
}

type CmpKey<'a> = (
    u64,
    &'a [u64],
    PreKey,
    Option<u64>,
    DevKey,
    Option<&'a [LocalSegment]>,
);

impl Version {
    pub fn parse(value: &str) -> Result<Self, InvalidVersion> {
        let invalid = || InvalidVersion(value.to_string());
        let captures = version_regex().captures(value).ok_or_else(invalid)?;

        let epoch = number(&captures, "epoch").ok_or_else(invalid)?.unwrap_or(0);

        let release = captures
            .name("release")
            .ok_or_else(invalid)?
            .as_str()
            .split('.')
            .map(|segment| segment.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match captures.name("pre_l") {
            Some(label) => Some((
                PreReleaseKind::from_label(label.as_str()),
                number(&captures, "pre_n").ok_or_else(invalid)?.unwrap_or(0),
            )),
            None => None,
        };

        let post = if captures.name("post").is_some() {
            let n1 = number(&captures, "post_n1").ok_or_else(invalid)?;
            let n2 = number(&captures, "post_n2").ok_or_else(invalid)?;
            Some(n1.or(n2).unwrap_or(0))
        } else {
            None
        };

        let dev = if captures.name("dev").is_some() {
            Some(number(&captures, "dev_n").ok_or_else(invalid)?.unwrap_or(0))
        } else {
            None
        };

        let local = captures.name("local").map(|local| {
            local
                .as_str()
                .split(['-', '_', '.'])
                .map(|part| match part.parse::<u64>() {
                    Ok(number) if part.bytes().all(|b| b.is_ascii_digit()) => {
                        LocalSegment::Number(number)
                    }
                    _ => LocalSegment::Text(part.to_ascii_lowercase()),
                })
                .collect()
        });

        Ok(Version {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn pre(&self) -> Option<(PreReleaseKind, u64)> {
        self.pre
    }

    pub fn post(&self) -> Option<u64> {
        self.post
    }

    pub fn dev(&self) -> Option<u64> {
        self.dev
    }

    pub fn local(&self) -> Option<&[LocalSegment]> {
        self.local.as_deref()
    }

    /// Pre-releases and development releases.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    /// The version without its local label.
    pub fn public(&self) -> Version {
        Version {
            local: None,
            ..self.clone()
        }
    }

    /// Epoch and release segments only.
    pub fn base(&self) -> Version {
        Version {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
            local: None,
        }
    }

    fn cmp_key(&self) -> CmpKey<'_> {
        let significant = self
            .release
            .iter()
            .rposition(|segment| *segment != 0)
            .map_or(0, |last| last + 1);

        let pre = match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOnly,
            (None, _, _) => PreKey::Final,
            (Some((kind, number)), _, _) => PreKey::Pre(kind, number),
        };

        let dev = match self.dev {
            Some(number) => DevKey::Dev(number),
            None => DevKey::None,
        };

        (
            self.epoch,
            &self.release[..significant],
            pre,
            self.post,
            dev,
            self.local.as_deref(),
        )
    }
}

/// `Some(None)` when the group did not participate, `None` on overflow.
fn number(captures: &Captures<'_>, group: &str) -> Option<Option<u64>> {
    match captures.name(group) {
        Some(matched) => matched.as_str().parse::<u64>().ok().map(Some),
        None => Some(None),
    }
}

impl FromStr for Version {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        for (index, segment) in self.release.iter().enumerate() {
            if index > 0 {
                f.write_char('.')?;
            }
            write!(f, "{segment}")?;
        }
        if let Some((kind, number)) = self.pre {
            write!(f, "{}{}", kind.as_str(), number)?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        if let Some(local) = &self.local {
            f.write_char('+')?;
            for (index, segment) in local.iter().enumerate() {
                if index > 0 {
                    f.write_char('.')?;
                }
                write!(f, "{segment}")?;
            }
        }
        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key().cmp(&other.cmp_key())
    }
}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cmp_key().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn v(value: &str) -> Version {
        Version::parse(value).unwrap()
    }

    #[test]
    fn parse_release() {
        let version = v("1.2.0");
        assert_eq!(version.release(), [1, 2, 0]);
        assert_eq!(version.epoch(), 0);
        assert!(!version.is_prerelease());
        assert!(!version.is_postrelease());
    }

    #[test]
    fn parse_normalizes_spelling() {
        assert_eq!(v("1.0-RC1").to_string(), "1.0rc1");
        assert_eq!(v("1.0.alpha.2").to_string(), "1.0a2");
        assert_eq!(v("1.0beta").to_string(), "1.0b0");
        assert_eq!(v("1.0c3").to_string(), "1.0rc3");
        assert_eq!(v("1.0preview1").to_string(), "1.0rc1");
        assert_eq!(v("1.0-1").to_string(), "1.0.post1");
        assert_eq!(v("1.0.rev").to_string(), "1.0.post0");
        assert_eq!(v("1.0dev").to_string(), "1.0.dev0");
        assert_eq!(v("2!1.0+Ubuntu-1").to_string(), "2!1.0+ubuntu.1");
        assert_eq!(v("  v3.1  ").to_string(), "3.1");
    }

    #[test]
    fn parse_rejects_non_versions() {
        for value in ["latest", "release-branch", "not-a-tag", "", "1.0-", "1..0", "1.0+"] {
            assert_eq!(
                Version::parse(value).unwrap_err(),
                InvalidVersion(value.to_string()),
                "{value:?}"
            );
        }
    }

    #[test]
    fn parse_rejects_overflow() {
        assert!(Version::parse("99999999999999999999999.0").is_err());
    }

    #[test]
    fn release_segments_compare_numerically() {
        assert!(v("10.0") > v("2.0"));
        assert!(v("1.10") > v("1.9"));
        assert!(v("1.0.10") > v("1.0.9"));
    }

    #[test]
    fn trailing_zeros_are_insignificant() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1"), v("1.0.0.0"));
        assert!(v("1.0.1") > v("1.0"));
    }

    #[test]
    fn full_ordering() {
        let ordered = [
            "1.0.dev0",
            "1.0a1.dev1",
            "1.0a1",
            "1.0a2",
            "1.0b1",
            "1.0rc1",
            "1.0",
            "1.0+abc",
            "1.0+5",
            "1.0.post1.dev0",
            "1.0.post1",
            "1.1.dev0",
            "1.1",
            "2.0.0rc1",
            "2.0.0",
            "10.0",
            "1!0.1",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn pre_release_sits_between_finals() {
        let rc = v("2.0.0-rc1");
        assert!(rc > v("1.1.0"));
        assert!(rc < v("2.0.0"));
    }

    #[test]
    fn equal_versions_hash_equally() {
        use std::collections::HashSet;

        let set: HashSet<Version> = ["1.0", "1.0.0", "v1.0"].into_iter().map(v).collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn public_and_base() {
        let version = v("1.2rc1.post3.dev4+local.7");
        assert_eq!(version.public().to_string(), "1.2rc1.post3.dev4");
        assert_eq!(version.base().to_string(), "1.2");
        assert_eq!(
            version.local(),
            Some(&[LocalSegment::Text("local".to_string()), LocalSegment::Number(7)][..])
        );
    }
}
