//! Wheel compatibility tags (PEP 425).
//!
//! A wheel filename carries a compressed tag string such as
//! `py2.py3-none-any`: each of the three components may list several
//! dot-separated values and the wheel supports every combination. The pool
//! uses the same compressed form as its partition key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Error produced when a tag string is not `interpreter-abi-platform`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid compatibility tag {0:?}")]
pub struct TagError(pub String);

/// One `(interpreter, abi, platform)` triple, lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    /// Interpreter tag, e.g. `cp311` or `py3`.
    pub interpreter: String,
    /// ABI tag, e.g. `cp311`, `abi3` or `none`.
    pub abi: String,
    /// Platform tag, e.g. `manylinux_2_17_x86_64` or `any`.
    pub platform: String,
}

/// A set of compatibility tags.
pub type TagSet = BTreeSet<Tag>;

impl Tag {
    /// Build a tag from its three components.
    pub fn new(interpreter: &str, abi: &str, platform: &str) -> Self {
        Self {
            interpreter: interpreter.to_ascii_lowercase(),
            abi: abi.to_ascii_lowercase(),
            platform: platform.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.interpreter, self.abi, self.platform)
    }
}

/// Expand a possibly compressed tag string into the set of tags it names.
pub fn parse_tag(tag: &str) -> Result<TagSet, TagError> {
    let parts: Vec<&str> = tag.split('-').collect();
    let [interpreters, abis, platforms] = parts.as_slice() else {
        return Err(TagError(tag.to_string()));
    };
    let split = |s: &str| -> Result<Vec<String>, TagError> {
        let values: Vec<String> = s.split('.').map(str::to_ascii_lowercase).collect();
        if values.iter().any(String::is_empty) {
            return Err(TagError(tag.to_string()));
        }
        Ok(values)
    };
    let (interpreters, abis, platforms) = (split(interpreters)?, split(abis)?, split(platforms)?);

    let mut tags = TagSet::new();
    for interpreter in &interpreters {
        for abi in &abis {
            for platform in &platforms {
                tags.insert(Tag::new(interpreter, abi, platform));
            }
        }
    }
    Ok(tags)
}

/// Compress a tag set into one string: the distinct values of each
/// component, sorted and dot-joined, then hyphen-joined.
///
/// This is the pool's storage key. It over-approximates when the set is not
/// a full cartesian product, which is harmless for partitioning.
pub fn compress_tags(tags: &TagSet) -> String {
    let interpreters: BTreeSet<&str> = tags.iter().map(|t| t.interpreter.as_str()).collect();
    let abis: BTreeSet<&str> = tags.iter().map(|t| t.abi.as_str()).collect();
    let platforms: BTreeSet<&str> = tags.iter().map(|t| t.platform.as_str()).collect();
    let join = |set: BTreeSet<&str>| set.into_iter().collect::<Vec<_>>().join(".");
    format!("{}-{}-{}", join(interpreters), join(abis), join(platforms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_tag() {
        let tags = parse_tag("py3-none-any").unwrap();
        assert_eq!(tags.len(), 1);
        assert!(tags.contains(&Tag::new("py3", "none", "any")));
    }

    #[test]
    fn test_parse_compressed_tag() {
        let tags = parse_tag("py2.py3-none-any").unwrap();
        assert_eq!(tags.len(), 2);
        let tags = parse_tag("cp311-cp311-manylinux_2_17_x86_64.manylinux2014_x86_64").unwrap();
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_tag("py3-none").is_err());
        assert!(parse_tag("py3..py2-none-any").is_err());
        assert!(parse_tag("a-b-c-d").is_err());
    }

    #[test]
    fn test_compress_is_sorted_and_stable() {
        let tags = parse_tag("py3.py2-none-any").unwrap();
        assert_eq!(compress_tags(&tags), "py2.py3-none-any");
        let again = parse_tag(&compress_tags(&tags)).unwrap();
        assert_eq!(again, tags);
    }
}
