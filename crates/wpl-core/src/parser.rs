//! Command-line requirement parsing.
//!
//! Each input is first read as a PEP 508 requirement. Anything else is
//! treated as a direct reference blob, `location[extra1,extra2]`, where the
//! location is a local path or a `file`, `http` or `https` URL naming an
//! artifact one of the makers recognises.

use std::collections::BTreeSet;
use std::path::Path;

use regex::Regex;
use tracing::debug;
use url::Url;
use wpl_schema::{Requirement, parse_extras};

use crate::candidate::maker::Maker;
use crate::error::{Error, Result};
use crate::registry::Registry;

const SCHEMES: [&str; 3] = ["file", "http", "https"];

fn location_url(location: &str) -> Result<Url> {
    match Url::parse(location) {
        Ok(url) if SCHEMES.contains(&url.scheme()) => Ok(url),
        Ok(url) => Err(Error::Usage(format!(
            "unsupported scheme {:?} in {location:?}",
            url.scheme()
        ))),
        Err(_) => {
            let path = std::path::absolute(Path::new(location))?;
            Url::from_file_path(&path)
                .map_err(|()| Error::Usage(format!("cannot use {location:?} as a path")))
        }
    }
}

fn parse_reference(registry: &Registry, text: &str) -> Result<Option<Requirement>> {
    let blob = Regex::new(r"^(?P<location>[^\[]+)(?:\[(?P<extras>[^\]]*)\])?$")?;
    let Some(captures) = blob.captures(text) else {
        return Ok(None);
    };
    let extras = match captures.name("extras") {
        Some(list) => match parse_extras(list.as_str()) {
            Some(extras) => extras,
            None => return Ok(None),
        },
        None => BTreeSet::new(),
    };
    let url = location_url(captures["location"].trim())?;

    for maker in Maker::ALL {
        if let Some(identity) = maker.parse_uri(registry, &url)? {
            debug!(%url, key = %identity.key, version = %identity.version, "parsed direct reference");
            let mut requirement = Requirement::pinned(identity.key.as_str(), &identity.version)
                .with_extras(extras);
            requirement.url = Some(url.to_string());
            return Ok(Some(requirement));
        }
    }
    Ok(None)
}

/// Parse one requirement as given on the command line.
pub fn parse_requirement(registry: &Registry, text: &str) -> Result<Requirement> {
    let text = text.trim();
    match text.parse::<Requirement>() {
        Ok(requirement) => Ok(requirement),
        Err(pep508) => match parse_reference(registry, text)? {
            Some(requirement) => Ok(requirement),
            None => Err(Error::Usage(format!(
                "invalid requirement {text:?}: {pep508}"
            ))),
        },
    }
}

/// Parse every input, failing on the first one that does not parse.
pub fn parse_requirements<S: AsRef<str>>(registry: &Registry, inputs: &[S]) -> Result<Vec<Requirement>> {
    inputs
        .iter()
        .map(|text| parse_requirement(registry, text.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::tests::test_registry;
    use tempfile::TempDir;

    #[test]
    fn test_standard_requirement() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let requirement = parse_requirement(&registry, "Demo[fast]>=1.0; python_version >= '3'")
            .unwrap();
        assert_eq!(requirement.project_key().as_str(), "demo");
        assert!(requirement.extras.contains("fast"));
        assert!(requirement.url.is_none());
    }

    #[test]
    fn test_local_archive_with_extras() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let requirement = parse_requirement(&registry, "/tmp/demo-1.0.tar.gz[extra1]").unwrap();
        assert_eq!(requirement.name, "demo");
        assert_eq!(requirement.specifier.to_string(), "==1.0");
        assert_eq!(requirement.extras, BTreeSet::from(["extra1".to_string()]));
        assert_eq!(requirement.url.as_deref(), Some("file:///tmp/demo-1.0.tar.gz"));
    }

    #[test]
    fn test_remote_wheel_reference() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let requirement = parse_requirement(
            &registry,
            "https://files.example/pkgs/Demo_Pkg-2.0-py3-none-any.whl",
        )
        .unwrap();
        assert_eq!(requirement.project_key().as_str(), "demo-pkg");
        assert_eq!(requirement.specifier.to_string(), "==2.0");
        assert!(requirement.extras.is_empty());
    }

    #[test]
    fn test_unrecognised_inputs_are_usage_errors() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        for input in [
            "ftp://files.example/demo-1.0.tar.gz",
            "/tmp/not-an-artifact.txt",
            "https://files.example/demo-1.0.tar.gz[bad extra]",
        ] {
            let error = parse_requirement(&registry, input).unwrap_err();
            assert!(error.is_usage(), "{input}: {error}");
        }
        let inputs = ["demo", "!!"];
        assert!(parse_requirements(&registry, &inputs).is_err());
    }
}
