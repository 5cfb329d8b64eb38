//! Cheap identity for direct references and index links.
//!
//! A maker looks at a URI and decides, without downloading anything,
//! whether it names an artifact of its form and which project and version
//! it is. Binary and source archives are identified from their file names
//! alone; a source tree has no naming convention, so its identity comes
//! from building it once (memoized by the registry).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use url::Url;
use wpl_schema::{ProjectKey, Requirement, TagSet, Version, parse_tag};

use super::{Candidate, Source};
use crate::error::Result;
use crate::io::download::filename_from_url;
use crate::registry::Registry;

/// What a maker learned about a reference before fetching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Canonical project key.
    pub key: ProjectKey,
    /// Release version.
    pub version: Version,
    /// Compatibility tags, for binary archives only.
    pub tags: Option<TagSet>,
}

/// The artifact forms a reference can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maker {
    /// A wheel (`.whl`).
    BinaryArchive,
    /// A source archive (`.tar.gz` or `.zip`).
    SourceArchive,
    /// A local directory containing a buildable project.
    SourceTree,
}

impl Maker {
    /// Every maker, in the order direct references are tried.
    pub const ALL: [Maker; 3] = [Maker::SourceTree, Maker::SourceArchive, Maker::BinaryArchive];

    /// Makers for index links, which are never directories.
    pub const ARCHIVES: [Maker; 2] = [Maker::BinaryArchive, Maker::SourceArchive];

    /// Identify `url`, or `None` if it is not this maker's form.
    pub fn parse_uri(self, registry: &Registry, url: &Url) -> Result<Option<Identity>> {
        match self {
            Maker::BinaryArchive => Ok(filename_from_url(url)
                .as_deref()
                .and_then(parse_wheel_filename)),
            Maker::SourceArchive => Ok(filename_from_url(url)
                .as_deref()
                .and_then(parse_sdist_filename)),
            Maker::SourceTree => match local_dir(url) {
                Some(dir) => registry.source_identity(&dir).map(Some),
                None => Ok(None),
            },
        }
    }

    /// Build the candidate for an identified reference.
    pub fn make(
        self,
        identity: Identity,
        url: &Url,
        extras: &BTreeSet<String>,
        direct: bool,
    ) -> Candidate {
        let source = match self {
            Maker::BinaryArchive => Source::Wheel {
                url: url.clone(),
                tags: identity.tags.unwrap_or_default(),
            },
            Maker::SourceArchive => Source::Sdist { url: url.clone() },
            Maker::SourceTree => Source::SourceTree {
                path: local_dir(url).unwrap_or_else(|| PathBuf::from(url.path())),
            },
        };
        Candidate::new(source, identity.key, identity.version, extras.clone(), direct)
    }

    /// Identify `url` and build its candidate in one step.
    pub fn make_from_uri(
        self,
        registry: &Registry,
        url: &Url,
        extras: &BTreeSet<String>,
        direct: bool,
    ) -> Result<Option<Candidate>> {
        Ok(self
            .parse_uri(registry, url)?
            .map(|identity| self.make(identity, url, extras, direct)))
    }

    /// Candidate for a requirement carrying a direct reference, if this
    /// maker recognises the reference and it names the requirement's project.
    pub fn make_from_direct_requirement(
        self,
        registry: &Registry,
        requirement: &Requirement,
        extras: &BTreeSet<String>,
    ) -> Result<Option<Candidate>> {
        let Some(raw) = requirement.url.as_deref() else {
            return Ok(None);
        };
        let Ok(url) = Url::parse(raw) else {
            return Ok(None);
        };
        let Some(identity) = self.parse_uri(registry, &url)? else {
            return Ok(None);
        };
        if identity.key != requirement.project_key() {
            debug!(
                reference = raw,
                found = %identity.key,
                "direct reference names a different project"
            );
            return Ok(None);
        }
        Ok(Some(self.make(identity, &url, extras, true)))
    }
}

/// Local directory named by a `file:` URL.
fn local_dir(url: &Url) -> Option<PathBuf> {
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok().filter(|p| p.is_dir())
}

/// Parse `project-version-interpreter-abi-platform.whl`.
///
/// Wheels with a build tag (six components) are not recognised.
pub fn parse_wheel_filename(filename: &str) -> Option<Identity> {
    let stem = filename.strip_suffix(".whl")?;
    let parts: Vec<&str> = stem.split('-').collect();
    let [name, version, interpreter, abi, platform] = parts.as_slice() else {
        return None;
    };
    if name.is_empty() {
        return None;
    }
    let version = version.parse().ok()?;
    let tags = parse_tag(&format!("{interpreter}-{abi}-{platform}")).ok()?;
    Some(Identity {
        key: ProjectKey::new(name),
        version,
        tags: Some(tags),
    })
}

/// Parse `project-version.tar.gz` or `project-version.zip`.
pub fn parse_sdist_filename(filename: &str) -> Option<Identity> {
    let stem = filename
        .strip_suffix(".tar.gz")
        .or_else(|| filename.strip_suffix(".zip"))?;
    let (name, version) = stem.rsplit_once('-')?;
    if name.is_empty() {
        return None;
    }
    Some(Identity {
        key: ProjectKey::new(name),
        version: version.parse().ok()?,
        tags: None,
    })
}

/// File name of a local path, for callers holding paths rather than URLs.
pub fn wheel_identity_of(path: &Path) -> Option<Identity> {
    parse_wheel_filename(&path.file_name()?.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wpl_schema::Tag;

    #[test]
    fn test_wheel_filename() {
        let identity = parse_wheel_filename("Proj-1.2.3-py3-none-any.whl").unwrap();
        assert_eq!(identity.key.as_str(), "proj");
        assert_eq!(identity.version.to_string(), "1.2.3");
        let tags = identity.tags.unwrap();
        assert_eq!(tags.len(), 1);
        assert!(tags.contains(&Tag::new("py3", "none", "any")));
    }

    #[test]
    fn test_wheel_filename_compressed_tags() {
        let identity = parse_wheel_filename("six-1.16.0-py2.py3-none-any.whl").unwrap();
        assert_eq!(identity.tags.unwrap().len(), 2);
    }

    #[test]
    fn test_wheel_filename_rejects_wrong_shape() {
        assert!(parse_wheel_filename("proj-1.0-1-py3-none-any.whl").is_none());
        assert!(parse_wheel_filename("proj-1.0-py3-none.whl").is_none());
        assert!(parse_wheel_filename("proj-notaversion-py3-none-any.whl").is_none());
        assert!(parse_wheel_filename("proj-1.0-py3-none-any.zip").is_none());
    }

    #[test]
    fn test_sdist_filename() {
        let identity = parse_sdist_filename("Proj-1.2.3.tar.gz").unwrap();
        assert_eq!(identity.key.as_str(), "proj");
        assert_eq!(identity.version.to_string(), "1.2.3");
        assert!(identity.tags.is_none());

        let identity = parse_sdist_filename("my_pkg-0.1.zip").unwrap();
        assert_eq!(identity.key.as_str(), "my-pkg");
    }

    #[test]
    fn test_sdist_filename_rejects_wrong_shape() {
        assert!(parse_sdist_filename("proj.tar.gz").is_none());
        assert!(parse_sdist_filename("proj-x.y.z.tar.gz").is_none());
        assert!(parse_sdist_filename("proj-1.0.tar.bz2").is_none());
        assert!(parse_sdist_filename("-1.0.tar.gz").is_none());
    }

    #[test]
    fn test_wheel_identity_of_path() {
        let identity = wheel_identity_of(Path::new("/tmp/out/demo-2.0-py3-none-any.whl")).unwrap();
        assert_eq!(identity.key.as_str(), "demo");
    }
}
