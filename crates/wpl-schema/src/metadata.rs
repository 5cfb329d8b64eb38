//! Core metadata headers (`METADATA` / `PKG-INFO`).
//!
//! Only the RFC 822 header block is read; the description body after the
//! first blank line is ignored.

use crate::requirement::{Requirement, RequirementError};
use crate::specifier::{SpecifierError, SpecifierSet};
use crate::version::{Version, VersionError};

/// Errors raised while reading core metadata.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// A mandatory field is absent.
    #[error("metadata is missing the {0} field")]
    MissingField(&'static str),

    /// The `Version` field is not PEP 440.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// A `Requires-Dist` entry is not PEP 508.
    #[error(transparent)]
    Requirement(#[from] RequirementError),

    /// `Requires-Python` is not a valid specifier set.
    #[error(transparent)]
    Specifier(#[from] SpecifierError),
}

/// The header fields of a core metadata file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    fields: Vec<(String, String)>,
}

impl Metadata {
    /// Parse the header block of a metadata file.
    pub fn parse(text: &str) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                break;
            }
            if line.starts_with([' ', '\t']) {
                // Continuation of the previous header.
                if let Some((_, value)) = fields.last_mut() {
                    value.push('\n');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                fields.push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        Self { fields }
    }

    /// True when no header was found.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First value of a field (case-insensitive name).
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(field))
            .map(|(_, value)| value.as_str())
    }

    /// Every value of a repeatable field (case-insensitive name).
    pub fn get_all<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(field))
            .map(|(_, value)| value.as_str())
    }

    /// The `Name` field.
    pub fn name(&self) -> Result<&str, MetadataError> {
        self.get("Name").ok_or(MetadataError::MissingField("Name"))
    }

    /// The parsed `Version` field.
    pub fn version(&self) -> Result<Version, MetadataError> {
        let raw = self
            .get("Version")
            .ok_or(MetadataError::MissingField("Version"))?;
        Ok(raw.parse()?)
    }

    /// Every `Requires-Dist` entry, parsed.
    pub fn requires_dist(&self) -> Result<Vec<Requirement>, MetadataError> {
        self.get_all("Requires-Dist")
            .map(|entry| entry.parse::<Requirement>().map_err(MetadataError::from))
            .collect()
    }

    /// The `Requires-Python` constraint, if declared.
    pub fn requires_python(&self) -> Result<Option<SpecifierSet>, MetadataError> {
        self.get("Requires-Python")
            .map(|raw| raw.parse::<SpecifierSet>().map_err(MetadataError::from))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Metadata-Version: 2.1
Name: Demo_Pkg
Version: 1.0.post1
Summary: A demo
  spanning two lines
Requires-Python: >=3.8
Requires-Dist: idna (>=2.5)
Requires-Dist: pytest ; extra == 'test'

Requires-Dist: ignored-body
";

    #[test]
    fn test_parse_headers() {
        let meta = Metadata::parse(SAMPLE);
        assert_eq!(meta.name().unwrap(), "Demo_Pkg");
        assert_eq!(meta.version().unwrap().to_string(), "1.0.post1");
        assert_eq!(meta.get("summary"), Some("A demo\nspanning two lines"));
        assert_eq!(
            meta.requires_python().unwrap().map(|s| s.to_string()),
            Some(">=3.8".to_string())
        );
    }

    #[test]
    fn test_requires_dist_stops_at_body() {
        let deps = Metadata::parse(SAMPLE).requires_dist().unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name, "idna");
        assert!(deps[1].marker.is_some());
    }

    #[test]
    fn test_missing_fields() {
        let meta = Metadata::parse("Summary: nothing useful\n");
        assert_eq!(meta.name(), Err(MetadataError::MissingField("Name")));
        assert!(Metadata::parse("").is_empty());
    }
}
