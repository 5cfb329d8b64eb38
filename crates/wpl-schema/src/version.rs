//! PEP 440 release versions.
//!
//! Parsing accepts the alternate spellings PEP 440 allows (`1.0-alpha.1`,
//! `v2`, `1.0-1`, `1.0.post.dev3` ...) and normalises them, so two strings
//! naming the same release produce equal [`Version`] values. Ordering
//! follows the PEP: release segments compare numerically with trailing
//! zeros ignored, developmental releases sort before pre-releases, which
//! sort before the final release, which sorts before post-releases. A local
//! label sorts after the public version it decorates.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Error produced when a string is not a valid PEP 440 version.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The input does not match the version grammar.
    #[error("invalid version: {0:?}")]
    Invalid(String),
}

/// Pre-release phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreKind {
    /// `a`, `alpha`
    Alpha,
    /// `b`, `beta`
    Beta,
    /// `rc`, `c`, `pre`, `preview`
    Rc,
}

impl PreKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Rc => "rc",
        }
    }
}

/// One dot-separated component of a local version label.
///
/// Alphanumeric components sort before numeric ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalSegment {
    /// A component with at least one non-digit character (lower-cased).
    Text(String),
    /// An all-digit component.
    Number(u64),
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A parsed PEP 440 version.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

impl Version {
    /// A plain final release such as `1.2.3`.
    pub fn from_release(release: &[u64]) -> Self {
        Self {
            epoch: 0,
            release: if release.is_empty() {
                vec![0]
            } else {
                release.to_vec()
            },
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// `0.dev0`, which no valid version sorts below.
    pub fn lowest() -> Self {
        Self {
            dev: Some(0),
            ..Self::from_release(&[0])
        }
    }

    /// The version epoch (`N!` prefix, usually 0).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Release components, exactly as written.
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// Pre-release phase and number, if any.
    pub fn pre(&self) -> Option<(PreKind, u64)> {
        self.pre
    }

    /// Post-release number, if any.
    pub fn post(&self) -> Option<u64> {
        self.post
    }

    /// Developmental release number, if any.
    pub fn dev(&self) -> Option<u64> {
        self.dev
    }

    /// Local version label components.
    pub fn local(&self) -> &[LocalSegment] {
        &self.local
    }

    /// True for pre-releases and developmental releases.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// True when a post-release segment is present.
    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    /// True when a local label is present.
    pub fn has_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// Epoch and release only (`1!2.0rc1.post3+x` becomes `1!2.0`).
    pub fn base_version(&self) -> Self {
        Self {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// This version with its local label stripped.
    pub fn public(&self) -> Self {
        Self {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Release components with trailing zeros removed (at least one kept).
    fn trimmed_release(&self) -> &[u64] {
        let mut end = self.release.len();
        while end > 1 && self.release[end - 1] == 0 {
            end -= 1;
        }
        &self.release[..end]
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::Before,
            (None, _, _) => PreKey::After,
            (Some((kind, n)), _, _) => PreKey::Pre(kind, n),
        }
    }

    fn dev_key(&self) -> (bool, u64) {
        match self.dev {
            Some(n) => (false, n),
            None => (true, 0),
        }
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    Before,
    Pre(PreKind, u64),
    After,
}

fn compare_release(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.trimmed_release().hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(u64::to_string).collect();
        f.write_str(&release.join("."))?;
        if let Some((kind, n)) = self.pre {
            write!(f, "{}{n}", kind.as_str())?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{n}")?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{n}")?;
        }
        if !self.local.is_empty() {
            let local: Vec<String> = self.local.iter().map(ToString::to_string).collect();
            write!(f, "+{}", local.join("."))?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::Invalid(s.to_string());
        let lowered = s.trim().to_ascii_lowercase();
        let (public, local) = match lowered.split_once('+') {
            Some((public, local)) => (public, Some(local)),
            None => (lowered.as_str(), None),
        };

        let mut cursor = Cursor::new(public);
        cursor.eat_char('v');

        let mut epoch = 0;
        let checkpoint = cursor.pos;
        match cursor.eat_number() {
            Some(n) if cursor.eat_char('!') => epoch = n,
            _ => cursor.pos = checkpoint,
        }

        let mut release = vec![cursor.eat_number().ok_or_else(invalid)?];
        loop {
            let checkpoint = cursor.pos;
            match cursor.eat_char('.').then(|| cursor.eat_number()).flatten() {
                Some(n) => release.push(n),
                None => {
                    cursor.pos = checkpoint;
                    break;
                }
            }
        }

        let pre = cursor.eat_pre();
        let post = cursor.eat_post();
        let dev = cursor.eat_dev();

        if !cursor.is_done() {
            return Err(invalid());
        }

        let local = match local {
            Some(label) => parse_local(label).ok_or_else(invalid)?,
            None => Vec::new(),
        };

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }
}

fn parse_local(label: &str) -> Option<Vec<LocalSegment>> {
    label
        .split(['.', '-', '_'])
        .map(|part| {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_alphanumeric()) {
                None
            } else if let Ok(n) = part.parse::<u64>() {
                Some(LocalSegment::Number(n))
            } else {
                Some(LocalSegment::Text(part.to_string()))
            }
        })
        .collect()
}

const PRE_KEYWORDS: &[(&str, PreKind)] = &[
    ("preview", PreKind::Rc),
    ("alpha", PreKind::Alpha),
    ("beta", PreKind::Beta),
    ("pre", PreKind::Rc),
    ("rc", PreKind::Rc),
    ("a", PreKind::Alpha),
    ("b", PreKind::Beta),
    ("c", PreKind::Rc),
];

const POST_KEYWORDS: &[&str] = &["post", "rev", "r"];

/// Hand-rolled scanner over the lower-cased public part of a version.
struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn is_done(&self) -> bool {
        self.pos == self.input.len()
    }

    fn eat_char(&mut self, c: char) -> bool {
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_separator(&mut self) -> bool {
        self.eat_char('.') || self.eat_char('-') || self.eat_char('_')
    }

    fn eat_number(&mut self) -> Option<u64> {
        let digits = self.rest().bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        let n = self.rest()[..digits].parse().ok()?;
        self.pos += digits;
        Some(n)
    }

    fn eat_keyword<'k>(&mut self, keywords: &[&'k str]) -> Option<&'k str> {
        let keyword = keywords
            .iter()
            .find(|kw| self.rest().starts_with(**kw))
            .copied()?;
        self.pos += keyword.len();
        Some(keyword)
    }

    /// Optional separator followed by a number; restores position when no
    /// number follows.
    fn eat_separated_number(&mut self) -> Option<u64> {
        let checkpoint = self.pos;
        self.eat_separator();
        let n = self.eat_number();
        if n.is_none() {
            self.pos = checkpoint;
        }
        n
    }

    fn eat_pre(&mut self) -> Option<(PreKind, u64)> {
        let checkpoint = self.pos;
        self.eat_separator();
        let words: Vec<&str> = PRE_KEYWORDS.iter().map(|(w, _)| *w).collect();
        let Some(word) = self.eat_keyword(&words) else {
            self.pos = checkpoint;
            return None;
        };
        let kind = PRE_KEYWORDS
            .iter()
            .find(|(w, _)| *w == word)
            .map_or(PreKind::Rc, |(_, k)| *k);
        Some((kind, self.eat_separated_number().unwrap_or(0)))
    }

    fn eat_post(&mut self) -> Option<u64> {
        let checkpoint = self.pos;
        if self.eat_char('-') {
            if let Some(n) = self.eat_number() {
                return Some(n);
            }
        }
        self.pos = checkpoint;
        self.eat_separator();
        if self.eat_keyword(POST_KEYWORDS).is_none() {
            self.pos = checkpoint;
            return None;
        }
        Some(self.eat_separated_number().unwrap_or(0))
    }

    fn eat_dev(&mut self) -> Option<u64> {
        let checkpoint = self.pos;
        self.eat_separator();
        if self.eat_keyword(&["dev"]).is_none() {
            self.pos = checkpoint;
            return None;
        }
        Some(self.eat_separated_number().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_normalise() {
        assert_eq!(v("1.2.3").to_string(), "1.2.3");
        assert_eq!(v("v1.0").to_string(), "1.0");
        assert_eq!(v("1.0-alpha.1").to_string(), "1.0a1");
        assert_eq!(v("1.0.preview2").to_string(), "1.0rc2");
        assert_eq!(v("1.0c").to_string(), "1.0rc0");
        assert_eq!(v("1.0-1").to_string(), "1.0.post1");
        assert_eq!(v("1.0.rev3").to_string(), "1.0.post3");
        assert_eq!(v("1.0.post.dev3").to_string(), "1.0.post0.dev3");
        assert_eq!(v("2!1.0+Ubuntu-1").to_string(), "2!1.0+ubuntu.1");
        assert_eq!(v("1.0a.post1").to_string(), "1.0a0.post1");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "abc", "1.0-", "1..0", "1.0+", "1.0+a..b", "1.0 beta"] {
            assert!(bad.parse::<Version>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_trailing_zeros_are_insignificant() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1"), v("1.0.0.0"));
        assert!(v("1.0.1") > v("1.0"));
    }

    #[test]
    fn test_pep440_ordering() {
        let ordered = [
            "1.0.dev456",
            "1.0a1",
            "1.0a2.dev456",
            "1.0a12",
            "1.0b1.dev456",
            "1.0b2",
            "1.0b2.post345.dev456",
            "1.0b2.post345",
            "1.0rc1.dev456",
            "1.0rc1",
            "1.0",
            "1.0+abc.5",
            "1.0+abc.7",
            "1.0+5",
            "1.0.post456.dev34",
            "1.0.post456",
            "1.1.dev1",
            "1!0.1",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_classification() {
        assert!(v("1.0rc1").is_prerelease());
        assert!(v("1.0.dev0").is_prerelease());
        assert!(!v("1.0.post1").is_prerelease());
        assert!(v("1.0.post1").is_postrelease());
        assert_eq!(v("1!2.0rc1.post3+x").base_version().to_string(), "1!2.0");
        assert_eq!(v("1.0+local").public().to_string(), "1.0");
    }

    #[test]
    fn test_hash_agrees_with_eq() {
        use std::collections::HashSet;
        let set: HashSet<Version> = [v("1.0"), v("1.0.0"), v("1")].into_iter().collect();
        assert_eq!(set.len(), 1);
    }
}
