//! PEP 508 dependency specifications.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::marker::Marker;
use crate::name::{ProjectKey, canonicalize};
use crate::specifier::SpecifierSet;
use crate::version::Version;

/// Error produced when a requirement string cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid requirement {input:?}: {reason}")]
pub struct RequirementError {
    /// The requirement text as given.
    pub input: String,
    /// What went wrong.
    pub reason: String,
}

impl RequirementError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A dependency on a project: name, optional extras, version constraints,
/// an optional direct reference and an optional environment marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Project name as written.
    pub name: String,
    /// Requested extras, canonicalized.
    pub extras: BTreeSet<String>,
    /// Version constraints (empty means any final release).
    pub specifier: SpecifierSet,
    /// Direct reference (`name @ url`), if any.
    pub url: Option<String>,
    /// Environment marker, if any.
    pub marker: Option<Marker>,
}

impl Requirement {
    /// A bare requirement on a project with no constraints.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            extras: BTreeSet::new(),
            specifier: SpecifierSet::default(),
            url: None,
            marker: None,
        }
    }

    /// A requirement pinned to exactly one version (`name==version`).
    pub fn pinned(name: &str, version: &Version) -> Self {
        Self {
            specifier: SpecifierSet::pinned(version),
            ..Self::named(name)
        }
    }

    /// The canonical project key.
    pub fn project_key(&self) -> ProjectKey {
        ProjectKey::new(&self.name)
    }

    /// This requirement with the given extras added.
    pub fn with_extras<I, S>(mut self, extras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extras
            .extend(extras.into_iter().map(|e| canonicalize(e.as_ref())));
        self
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Parse a comma-separated extras list (without brackets) into canonical
/// extra names. Returns `None` if any entry is not a valid name.
pub fn parse_extras(list: &str) -> Option<BTreeSet<String>> {
    list.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|e| {
            if e.chars().all(is_name_char) {
                Some(canonicalize(e))
            } else {
                None
            }
        })
        .collect()
}

impl FromStr for Requirement {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();

        let name_len = text.chars().take_while(|c| is_name_char(*c)).count();
        let name = &text[..name_len];
        let valid_edges = name
            .chars()
            .next()
            .zip(name.chars().last())
            .is_some_and(|(a, b)| a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric());
        if !valid_edges {
            return Err(RequirementError::new(s, "expected a project name"));
        }
        let mut rest = text[name_len..].trim_start();

        let mut extras = BTreeSet::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| RequirementError::new(s, "unclosed extras bracket"))?;
            extras = parse_extras(&after[..close])
                .ok_or_else(|| RequirementError::new(s, "invalid extra name"))?;
            rest = after[close + 1..].trim_start();
        }

        let mut url = None;
        let mut specifier = SpecifierSet::default();
        let marker_text;

        if let Some(after) = rest.strip_prefix('@') {
            let after = after.trim_start();
            let end = after.find(char::is_whitespace).unwrap_or(after.len());
            let reference = &after[..end];
            if reference.is_empty() || !reference.contains(':') {
                return Err(RequirementError::new(s, "expected a URL after '@'"));
            }
            url = Some(reference.to_string());
            let tail = after[end..].trim_start();
            marker_text = if tail.is_empty() {
                None
            } else {
                Some(
                    tail.strip_prefix(';')
                        .ok_or_else(|| RequirementError::new(s, "unexpected text after URL"))?,
                )
            };
        } else {
            let (spec_text, tail) = match rest.split_once(';') {
                Some((spec, marker)) => (spec.trim(), Some(marker)),
                None => (rest.trim(), None),
            };
            let spec_text = match spec_text.strip_prefix('(') {
                Some(inner) => inner
                    .strip_suffix(')')
                    .ok_or_else(|| RequirementError::new(s, "unclosed parenthesis"))?,
                None => spec_text,
            };
            specifier = spec_text
                .parse()
                .map_err(|e: crate::specifier::SpecifierError| RequirementError::new(s, e.to_string()))?;
            marker_text = tail;
        }

        let marker = match marker_text.map(str::trim) {
            None => None,
            Some("") => return Err(RequirementError::new(s, "empty marker")),
            Some(m) => Some(
                m.parse::<Marker>()
                    .map_err(|e| RequirementError::new(s, e.to_string()))?,
            ),
        };

        Ok(Self {
            name: name.to_string(),
            extras,
            specifier,
            url,
            marker,
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if let Some(url) = &self.url {
            write!(f, " @ {url}")?;
            if self.marker.is_some() {
                f.write_str(" ")?;
            }
        } else {
            write!(f, "{}", self.specifier)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, "; {marker}")?;
        }
        Ok(())
    }
}
