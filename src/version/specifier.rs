use std::{fmt::Display, str::FromStr};

use thiserror::Error;

use super::Version;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecifierError {
    #[error("Invalid specifier: '{0}'")]
    InvalidSpecifier(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Arbitrary,
    Compatible,
    Equal,
    NotEqual,
    LessThanOrEqual,
    GreaterThanOrEqual,
    LessThan,
    GreaterThan,
}

impl Operator {
    // longest first so that `<=` is not read as `<`
    const ALL: [(&'static str, Operator); 8] = [
        ("===", Operator::Arbitrary),
        ("~=", Operator::Compatible),
        ("==", Operator::Equal),
        ("!=", Operator::NotEqual),
        ("<=", Operator::LessThanOrEqual),
        (">=", Operator::GreaterThanOrEqual),
        ("<", Operator::LessThan),
        (">", Operator::GreaterThan),
    ];

    pub fn as_str(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(_, operator)| *operator == self)
            .map_or("", |(symbol, _)| *symbol)
    }

    /// Operators whose clause makes pre-releases eligible when it names one.
    fn admits_named_prerelease(self) -> bool {
        matches!(
            self,
            Operator::Arbitrary
                | Operator::Compatible
                | Operator::Equal
                | Operator::LessThanOrEqual
                | Operator::GreaterThanOrEqual
        )
    }
}

#[derive(Debug, Clone)]
enum Target {
    Version(Version),
    /// `==1.2.*`: epoch and leading release segments.
    Prefix { epoch: u64, release: Vec<u64> },
    /// `===anything`
    Literal(String),
}

/// A single `<operator><version>` clause.
#[derive(Debug, Clone)]
pub struct Specifier {
    operator: Operator,
    target: Target,
    text: String,
}

impl Specifier {
    pub fn parse(clause: &str) -> Result<Self, SpecifierError> {
        let invalid = || SpecifierError::InvalidSpecifier(clause.to_string());
        let text = clause.trim();

        let (symbol, operator) = Operator::ALL
            .iter()
            .find(|(symbol, _)| text.starts_with(symbol))
            .copied()
            .ok_or_else(invalid)?;
        let value = text[symbol.len()..].trim();
        if value.is_empty() || value.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let target = match operator {
            Operator::Arbitrary => Target::Literal(value.to_string()),
            Operator::Equal | Operator::NotEqual => match value.strip_suffix(".*") {
                Some(prefix) => {
                    let version = Version::parse(prefix).map_err(|_| invalid())?;
                    if version.pre.is_some()
                        || version.post.is_some()
                        || version.dev.is_some()
                        || version.local.is_some()
                    {
                        return Err(invalid());
                    }
                    Target::Prefix {
                        epoch: version.epoch,
                        release: version.release,
                    }
                }
                None => Target::Version(Version::parse(value).map_err(|_| invalid())?),
            },
            Operator::Compatible => {
                let version = Version::parse(value).map_err(|_| invalid())?;
                if version.local.is_some() || version.release.len() < 2 {
                    return Err(invalid());
                }
                Target::Version(version)
            }
            _ => {
                let version = Version::parse(value).map_err(|_| invalid())?;
                if version.local.is_some() {
                    return Err(invalid());
                }
                Target::Version(version)
            }
        };

        Ok(Specifier {
            operator,
            target,
            text: format!("{}{}", symbol, value),
        })
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Whether this clause explicitly asks for a pre-release, which makes
    /// pre-releases eligible for the whole set.
    pub fn names_prerelease(&self) -> bool {
        if !self.operator.admits_named_prerelease() {
            return false;
        }
        match &self.target {
            Target::Version(version) => version.is_prerelease(),
            Target::Literal(literal) => {
                Version::parse(literal).is_ok_and(|version| version.is_prerelease())
            }
            Target::Prefix { .. } => false,
        }
    }

    /// Whether `candidate` satisfies this clause, ignoring pre-release policy.
    pub fn matches(&self, candidate: &Version) -> bool {
        match (&self.target, self.operator) {
            (Target::Literal(literal), _) => {
                candidate.to_string().eq_ignore_ascii_case(literal)
            }
            (Target::Prefix { epoch, release }, Operator::Equal) => {
                prefix_matches(candidate, *epoch, release)
            }
            (Target::Prefix { epoch, release }, _) => !prefix_matches(candidate, *epoch, release),
            (Target::Version(spec), Operator::Compatible) => {
                // ~=1.4.5a4 is >=1.4.5a4,==1.4.*
                let prefix = &spec.release[..spec.release.len() - 1];
                candidate >= spec && prefix_matches(candidate, spec.epoch, prefix)
            }
            (Target::Version(spec), Operator::Equal) => equals(candidate, spec),
            (Target::Version(spec), Operator::NotEqual) => !equals(candidate, spec),
            (Target::Version(spec), Operator::LessThanOrEqual) => &candidate.public() <= spec,
            (Target::Version(spec), Operator::GreaterThanOrEqual) => &candidate.public() >= spec,
            (Target::Version(spec), Operator::LessThan) => {
                // <2.0 does not admit 2.0rc1
                candidate < spec
                    && !(!spec.is_prerelease()
                        && candidate.is_prerelease()
                        && candidate.base() == spec.base())
            }
            (Target::Version(spec), Operator::GreaterThan) => {
                // >2.0 admits neither 2.0.post1 nor 2.0+local
                candidate > spec
                    && !(!spec.is_postrelease()
                        && candidate.is_postrelease()
                        && candidate.base() == spec.base())
                    && !(candidate.local.is_some() && candidate.base() == spec.base())
            }
            (Target::Version(_), Operator::Arbitrary) => false,
        }
    }
}

fn equals(candidate: &Version, spec: &Version) -> bool {
    if spec.local.is_some() {
        candidate == spec
    } else {
        &candidate.public() == spec
    }
}

/// Compares epochs and the first `release.len()` release segments, padding
/// the candidate with zeros.
fn prefix_matches(candidate: &Version, epoch: u64, release: &[u64]) -> bool {
    candidate.epoch == epoch
        && release
            .iter()
            .enumerate()
            .all(|(index, segment)| candidate.release.get(index).copied().unwrap_or(0) == *segment)
}

impl FromStr for Specifier {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Specifier::parse(s)
    }
}

impl Display for Specifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Comma separated clauses that must all hold, such as `>=1.0,<2.0`.
#[derive(Debug, Clone, Default)]
pub struct SpecifierSet {
    specifiers: Vec<Specifier>,
}

impl SpecifierSet {
    pub fn parse(value: &str) -> Result<Self, SpecifierError> {
        let specifiers = value
            .split(',')
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .map(Specifier::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SpecifierSet { specifiers })
    }

    pub fn specifiers(&self) -> &[Specifier] {
        &self.specifiers
    }

    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    /// Pre-releases are only eligible when a clause names one.
    pub fn allows_prereleases(&self) -> bool {
        self.specifiers.iter().any(Specifier::names_prerelease)
    }

    /// Whether `version` satisfies every clause and the pre-release policy.
    pub fn contains(&self, version: &Version) -> bool {
        if version.is_prerelease() && !self.allows_prereleases() {
            return false;
        }
        self.specifiers.iter().all(|specifier| specifier.matches(version))
    }

    /// Keeps the items whose version satisfies the set, preserving order.
    ///
    /// Without any clause, pre-releases are dropped unless nothing else is
    /// left.
    pub fn filter<T, F>(&self, items: impl IntoIterator<Item = T>, version_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &Version,
    {
        if !self.is_empty() {
            return items
                .into_iter()
                .filter(|item| self.contains(version_of(item)))
                .collect();
        }

        let mut finals = Vec::new();
        let mut prereleases = Vec::new();
        for item in items {
            if version_of(&item).is_prerelease() {
                if finals.is_empty() {
                    prereleases.push(item);
                }
            } else {
                finals.push(item);
            }
        }
        if finals.is_empty() {
            prereleases
        } else {
            finals
        }
    }
}

impl FromStr for SpecifierSet {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpecifierSet::parse(s)
    }
}

impl Display for SpecifierSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, specifier) in self.specifiers.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{specifier}")?;
        }
        Ok(())
    }
}
