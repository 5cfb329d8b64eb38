//! Version specifiers (`>=1.0,!=1.3.*,<2`).

use std::fmt;
use std::str::FromStr;

use crate::version::{Version, VersionError};

/// Error produced when a specifier clause cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecifierError {
    /// The clause has no recognised comparison operator.
    #[error("invalid specifier {0:?}: missing operator")]
    MissingOperator(String),

    /// The version after the operator is not valid.
    #[error("invalid specifier {clause:?}: {source}")]
    Version {
        /// The clause as written.
        clause: String,
        /// Underlying version error.
        source: VersionError,
    },

    /// The operator does not accept this form of version.
    #[error("invalid specifier {0:?}: operator cannot be used with this version")]
    Unsupported(String),
}

/// Comparison operator of a single specifier clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `==`
    Equal,
    /// `==X.*`
    EqualStar,
    /// `!=`
    NotEqual,
    /// `!=X.*`
    NotEqualStar,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `~=`
    Compatible,
    /// `===`
    Arbitrary,
}

impl Operator {
    fn as_str(self) -> &'static str {
        match self {
            Self::Equal | Self::EqualStar => "==",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Compatible => "~=",
            Self::Arbitrary => "===",
        }
    }
}

/// One `<operator><version>` clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Specifier {
    operator: Operator,
    version: Version,
    raw: String,
}

impl Specifier {
    /// An `==version` clause.
    pub fn equals(version: &Version) -> Self {
        Self {
            operator: Operator::Equal,
            version: version.clone(),
            raw: version.to_string(),
        }
    }

    /// The comparison operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The version operand (without any `.*` suffix).
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether this clause by itself opts in to pre-releases.
    pub fn allows_prereleases(&self) -> bool {
        match self.operator {
            Operator::Equal
            | Operator::EqualStar
            | Operator::LessEqual
            | Operator::GreaterEqual
            | Operator::Compatible
            | Operator::Arbitrary => self.version.is_prerelease(),
            _ => false,
        }
    }

    /// Test a version against this clause, ignoring the pre-release filter.
    pub fn contains(&self, candidate: &Version) -> bool {
        let spec = &self.version;
        match self.operator {
            Operator::Equal => {
                if spec.has_local() {
                    candidate == spec
                } else {
                    candidate.public() == *spec
                }
            }
            Operator::NotEqual => {
                if spec.has_local() {
                    candidate != spec
                } else {
                    candidate.public() != *spec
                }
            }
            Operator::EqualStar => prefix_match(spec, candidate),
            Operator::NotEqualStar => !prefix_match(spec, candidate),
            Operator::LessEqual => candidate.public() <= *spec,
            Operator::GreaterEqual => candidate.public() >= *spec,
            Operator::Less => {
                candidate < spec
                    && !(candidate.is_prerelease()
                        && !spec.is_prerelease()
                        && candidate.base_version() == spec.base_version())
            }
            Operator::Greater => {
                candidate > spec
                    && !(candidate.is_postrelease()
                        && !spec.is_postrelease()
                        && candidate.base_version() == spec.base_version())
                    && !(candidate.has_local()
                        && candidate.base_version() == spec.base_version())
            }
            Operator::Compatible => {
                let release = spec.release();
                let prefix = Version::from_release(&release[..release.len() - 1]);
                candidate.public() >= *spec && release_prefix_matches(&prefix, candidate)
            }
            Operator::Arbitrary => self.raw.eq_ignore_ascii_case(&candidate.to_string()),
        }
    }
}

/// `==X.*` semantics: epoch equal, release padded and compared on the prefix
/// length, and any pre/post/dev segment of the prefix matched exactly.
fn prefix_match(prefix: &Version, candidate: &Version) -> bool {
    if !release_prefix_matches(prefix, candidate) {
        return false;
    }
    if prefix.pre().is_some() && prefix.pre() != candidate.pre() {
        return false;
    }
    if prefix.post().is_some() && prefix.post() != candidate.post() {
        return false;
    }
    if prefix.dev().is_some() && prefix.dev() != candidate.dev() {
        return false;
    }
    true
}

fn release_prefix_matches(prefix: &Version, candidate: &Version) -> bool {
    if prefix.epoch() != candidate.epoch() {
        return false;
    }
    prefix
        .release()
        .iter()
        .enumerate()
        .all(|(i, n)| candidate.release().get(i).copied().unwrap_or(0) == *n)
}

impl FromStr for Specifier {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clause = s.trim();
        let (operator, rest) = [
            ("===", Operator::Arbitrary),
            ("==", Operator::Equal),
            ("!=", Operator::NotEqual),
            ("<=", Operator::LessEqual),
            (">=", Operator::GreaterEqual),
            ("~=", Operator::Compatible),
            ("<", Operator::Less),
            (">", Operator::Greater),
        ]
        .into_iter()
        .find_map(|(token, op)| clause.strip_prefix(token).map(|rest| (op, rest.trim())))
        .ok_or_else(|| SpecifierError::MissingOperator(clause.to_string()))?;

        if rest.is_empty() {
            return Err(SpecifierError::Unsupported(clause.to_string()));
        }

        let version_error = |source| SpecifierError::Version {
            clause: clause.to_string(),
            source,
        };

        if operator == Operator::Arbitrary {
            // Arbitrary equality compares strings; a non-PEP 440 operand
            // simply never matches.
            let version = rest
                .parse()
                .unwrap_or_else(|_| Version::from_release(&[0]));
            return Ok(Self {
                operator,
                version,
                raw: rest.to_string(),
            });
        }

        let (operator, text) = match rest.strip_suffix(".*") {
            Some(prefix) => match operator {
                Operator::Equal => (Operator::EqualStar, prefix),
                Operator::NotEqual => (Operator::NotEqualStar, prefix),
                _ => return Err(SpecifierError::Unsupported(clause.to_string())),
            },
            None => (operator, rest),
        };

        let version: Version = text.parse().map_err(version_error)?;

        let local_allowed = matches!(operator, Operator::Equal | Operator::NotEqual);
        if version.has_local() && !local_allowed {
            return Err(SpecifierError::Unsupported(clause.to_string()));
        }
        if operator == Operator::Compatible && version.release().len() < 2 {
            return Err(SpecifierError::Unsupported(clause.to_string()));
        }

        Ok(Self {
            operator,
            version,
            raw: text.to_string(),
        })
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::EqualStar | Operator::NotEqualStar => {
                write!(f, "{}{}.*", self.operator.as_str(), self.version)
            }
            Operator::Arbitrary => write!(f, "==={}", self.raw),
            _ => write!(f, "{}{}", self.operator.as_str(), self.version),
        }
    }
}

/// A conjunction of specifier clauses. The empty set matches every final
/// release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SpecifierSet {
    specifiers: Vec<Specifier>,
}

impl SpecifierSet {
    /// A set with a single `==version` clause.
    pub fn pinned(version: &Version) -> Self {
        Self {
            specifiers: vec![Specifier::equals(version)],
        }
    }

    /// True when the set has no clauses.
    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    /// The clauses in the order written.
    pub fn iter(&self) -> impl Iterator<Item = &Specifier> {
        self.specifiers.iter()
    }

    /// Whether any clause names a pre-release.
    pub fn allows_prereleases(&self) -> bool {
        self.specifiers.iter().any(Specifier::allows_prereleases)
    }

    /// Containment with the default pre-release policy: pre-releases only
    /// match if some clause names a pre-release.
    pub fn contains(&self, version: &Version) -> bool {
        self.contains_with(version, self.allows_prereleases())
    }

    /// Containment with an explicit pre-release policy.
    pub fn contains_with(&self, version: &Version, prereleases: bool) -> bool {
        if !prereleases && version.is_prerelease() {
            return false;
        }
        self.specifiers.iter().all(|s| s.contains(version))
    }

    /// The pinned version when the set is exactly one `==` clause.
    pub fn pinned_version(&self) -> Option<&Version> {
        match self.specifiers.as_slice() {
            [only] if only.operator == Operator::Equal => Some(&only.version),
            _ => None,
        }
    }
}

impl FromStr for SpecifierSet {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let specifiers = s
            .split(',')
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { specifiers })
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses: Vec<String> = self.specifiers.iter().map(ToString::to_string).collect();
        f.write_str(&clauses.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(s: &str) -> SpecifierSet {
        s.parse().unwrap()
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_basic_ranges() {
        let range = set(">=1.0,<2");
        assert!(range.contains(&v("1.0")));
        assert!(range.contains(&v("1.9.9")));
        assert!(!range.contains(&v("2.0")));
        assert!(!range.contains(&v("0.9")));
    }

    #[test]
    fn test_equality_pads_and_ignores_local() {
        assert!(set("==1.0").contains(&v("1.0.0")));
        assert!(set("==1.0").contains(&v("1.0+local")));
        assert!(!set("==1.0+other").contains(&v("1.0+local")));
        assert!(set("!=1.0").contains(&v("1.1")));
        assert!(!set("!=1.0").contains(&v("1.0.0")));
    }

    #[test]
    fn test_wildcards() {
        assert!(set("==1.4.*").contains(&v("1.4.7")));
        assert!(set("==1.4.*").contains(&v("1.4")));
        assert!(!set("==1.4.*").contains(&v("1.5")));
        assert!(set("!=1.4.*").contains(&v("1.5")));
        assert!(">=1.4.*".parse::<SpecifierSet>().is_err());
    }

    #[test]
    fn test_compatible_release() {
        let compat = set("~=2.2");
        assert!(compat.contains(&v("2.2")));
        assert!(compat.contains(&v("2.9")));
        assert!(!compat.contains(&v("3.0")));
        let narrow = set("~=1.4.5");
        assert!(narrow.contains(&v("1.4.9")));
        assert!(!narrow.contains(&v("1.5.0")));
        assert!("~=1".parse::<SpecifierSet>().is_err());
    }

    #[test]
    fn test_exclusive_bounds_skip_same_base_releases() {
        assert!(!set("<2.0").contains_with(&v("2.0rc1"), true));
        assert!(set("<2.0rc2").contains_with(&v("2.0rc1"), true));
        assert!(!set("<2.0rc2").contains(&v("2.0rc1")));
        assert!(!set(">1.7").contains(&v("1.7.post2")));
        assert!(set(">1.7.post1").contains(&v("1.7.post2")));
        assert!(!set(">1.7").contains(&v("1.7+local")));
    }

    #[test]
    fn test_prerelease_policy() {
        assert!(!set(">=1.0").contains(&v("2.0b1")));
        assert!(set(">=1.0").contains_with(&v("2.0b1"), true));
        assert!(set(">=2.0b1").contains(&v("2.0b2")));
        assert!(!SpecifierSet::default().contains(&v("1.0a1")));
        assert!(SpecifierSet::default().contains(&v("1.0")));
    }

    #[test]
    fn test_arbitrary_equality() {
        assert!(set("===1.0").contains(&v("1.0")));
        assert!(!set("===1.0").contains(&v("1.0.0")));
    }

    #[test]
    fn test_display_and_pin() {
        let parsed = set(" >= 1.0 , < 2 ");
        assert_eq!(parsed.to_string(), ">=1.0,<2");
        assert_eq!(set("==1.2").pinned_version(), Some(&v("1.2")));
        assert_eq!(set(">=1.2").pinned_version(), None);
        assert_eq!(SpecifierSet::pinned(&v("3")).to_string(), "==3");
    }
}
