//! Candidates: one release of one project, obtainable from one place.
//!
//! The provenance is a closed set of [`Source`] variants. Everything the
//! resolver asks of a candidate (metadata, dependencies, compatibility)
//! goes through [`Candidate`], which fetches or builds lazily and memoizes
//! each result for the lifetime of the candidate, i.e. one resolution
//! attempt.

pub mod maker;

use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use url::Url;
use wpl_schema::{Metadata, ProjectKey, Requirement, TagSet, Version};

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::io::{download, extract};
use crate::registry::Registry;

/// A distribution installed in a directory, found through its
/// `*.dist-info` or `*.egg-info` metadata directory.
#[derive(Debug, Clone)]
pub struct InstalledDist {
    /// Directory the distribution is importable from.
    pub location: PathBuf,
    /// The metadata directory itself.
    pub info_dir: PathBuf,
    /// Parsed core metadata.
    pub metadata: Metadata,
    /// Project key from `Name`.
    pub key: ProjectKey,
    /// Version from `Version`.
    pub version: Version,
}

impl InstalledDist {
    /// Read the distribution described by one metadata directory.
    /// Returns `None` when the directory holds no metadata file.
    pub fn from_info_dir(info_dir: &Path) -> Result<Option<Self>> {
        let text = ["METADATA", "PKG-INFO"]
            .iter()
            .map(|name| info_dir.join(name))
            .find(|path| path.is_file())
            .map(fs::read_to_string)
            .transpose()?;
        let Some(text) = text else {
            return Ok(None);
        };
        let metadata = Metadata::parse(&text);
        let key = ProjectKey::new(metadata.name()?);
        let version = metadata.version()?;
        let location = info_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Some(Self {
            location,
            info_dir: info_dir.to_path_buf(),
            metadata,
            key,
            version,
        }))
    }

    /// Every distribution installed directly in `dir`, in path order.
    /// Unreadable metadata directories are skipped with a warning.
    pub fn find_in(dir: &Path) -> Result<Vec<Self>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = format!(
            "{}/*.*-info",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let paths = glob::glob(&pattern).map_err(|e| Error::context("glob", e))?;

        let mut found = Vec::new();
        for info_dir in paths.filter_map(std::result::Result::ok) {
            let name = info_dir.to_string_lossy();
            if !(name.ends_with(".dist-info") || name.ends_with(".egg-info")) || !info_dir.is_dir()
            {
                continue;
            }
            match Self::from_info_dir(&info_dir) {
                Ok(Some(dist)) => found.push(dist),
                Ok(None) => {}
                Err(e) => warn!(path = %info_dir.display(), "skipping unreadable metadata: {e}"),
            }
        }
        Ok(found)
    }
}

/// Where a candidate comes from.
#[derive(Debug, Clone)]
pub enum Source {
    /// Importable from the target environment right now.
    Active(InstalledDist),
    /// Unpacked in the local pool.
    Pool(InstalledDist),
    /// A wheel at a local or remote URL.
    Wheel {
        /// Location of the archive.
        url: Url,
        /// Tags parsed from the file name.
        tags: TagSet,
    },
    /// A source archive at a local or remote URL.
    Sdist {
        /// Location of the archive.
        url: Url,
    },
    /// A local source tree.
    SourceTree {
        /// Root of the tree.
        path: PathBuf,
    },
}

/// One release of one project from one provenance, with the extras it was
/// requested with.
#[derive(Debug)]
pub struct Candidate {
    source: Source,
    key: ProjectKey,
    version: Version,
    extras: BTreeSet<String>,
    direct: bool,
    metadata: OnceCell<Metadata>,
    dependencies: OnceCell<Vec<Requirement>>,
    local_path: OnceCell<PathBuf>,
    source_tree: OnceCell<PathBuf>,
    wheel: OnceCell<PathBuf>,
}

fn memoized<T>(cell: &OnceCell<T>, init: impl FnOnce() -> Result<T>) -> Result<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}

/// Core metadata embedded in a wheel.
pub fn read_wheel_metadata(wheel: &Path) -> Result<Metadata> {
    let text = extract::read_zip_member(wheel, ".dist-info/METADATA")?
        .ok_or_else(|| Error::MetadataUnavailable(wheel.display().to_string()))?;
    let metadata = Metadata::parse(&text);
    if metadata.is_empty() {
        return Err(Error::MetadataUnavailable(wheel.display().to_string()));
    }
    Ok(metadata)
}

impl Candidate {
    /// Assemble a candidate. Identity for installed distributions comes
    /// from their metadata; for archives, from the file name.
    pub fn new(
        source: Source,
        key: ProjectKey,
        version: Version,
        extras: BTreeSet<String>,
        direct: bool,
    ) -> Self {
        Self {
            source,
            key,
            version,
            extras,
            direct,
            metadata: OnceCell::new(),
            dependencies: OnceCell::new(),
            local_path: OnceCell::new(),
            source_tree: OnceCell::new(),
            wheel: OnceCell::new(),
        }
    }

    /// A candidate for an installed distribution found in the environment.
    pub fn active(dist: InstalledDist, extras: BTreeSet<String>) -> Self {
        let (key, version) = (dist.key.clone(), dist.version.clone());
        Self::new(Source::Active(dist), key, version, extras, false)
    }

    /// A candidate for a distribution unpacked in the pool.
    pub fn pooled(dist: InstalledDist, extras: BTreeSet<String>) -> Self {
        let (key, version) = (dist.key.clone(), dist.version.clone());
        Self::new(Source::Pool(dist), key, version, extras, false)
    }

    /// Provenance.
    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Canonical project key.
    pub fn project_key(&self) -> &ProjectKey {
        &self.key
    }

    /// Release version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Extras this candidate was requested with.
    pub fn extras(&self) -> &BTreeSet<String> {
        &self.extras
    }

    /// Importable from the target environment already.
    pub fn is_in_environment(&self) -> bool {
        matches!(self.source, Source::Active(_))
    }

    /// Unpacked in the pool already.
    pub fn is_in_pool(&self) -> bool {
        matches!(self.source, Source::Pool(_))
    }

    /// Named explicitly by a direct reference.
    pub fn is_direct(&self) -> bool {
        self.direct
    }

    /// Already a binary archive, with no build step needed.
    pub fn is_built(&self) -> bool {
        matches!(self.source, Source::Wheel { .. })
    }

    /// Directory an installed candidate lives in.
    pub fn installed_location(&self) -> Option<&Path> {
        match &self.source {
            Source::Active(dist) | Source::Pool(dist) => Some(&dist.location),
            _ => None,
        }
    }

    /// Local file for an archive candidate, downloading it into the cache
    /// when the reference is remote.
    pub fn local_path(&self, registry: &Registry) -> Result<Option<&Path>> {
        let url = match &self.source {
            Source::Wheel { url, .. } | Source::Sdist { url } => url,
            Source::SourceTree { path } => return Ok(Some(path)),
            Source::Active(_) | Source::Pool(_) => return Ok(None),
        };
        let path = memoized(&self.local_path, || {
            if url.scheme() == "file" {
                return url
                    .to_file_path()
                    .map_err(|()| Error::Usage(format!("not a local path: {url}")));
            }
            Ok(download::fetch(
                registry.client(),
                url,
                &registry.settings().distributions_dir(),
            )?)
        })?;
        Ok(Some(path))
    }

    /// The source tree, extracting a source archive on first access.
    pub fn source_tree(&self, registry: &Registry) -> Result<Option<&Path>> {
        match &self.source {
            Source::SourceTree { path } => Ok(Some(path)),
            Source::Sdist { .. } => {
                let tree = memoized(&self.source_tree, || {
                    let archive = self.local_path(registry)?.ok_or_else(|| {
                        Error::MetadataUnavailable(self.to_string())
                    })?;
                    registry.extract_source(archive)
                })?;
                Ok(Some(tree))
            }
            _ => Ok(None),
        }
    }

    /// A wheel for this candidate, building from source when needed.
    /// Installed candidates have none.
    pub fn wheel_path(&self, registry: &Registry) -> Result<Option<&Path>> {
        match &self.source {
            Source::Active(_) | Source::Pool(_) => Ok(None),
            Source::Wheel { .. } => self.local_path(registry),
            Source::Sdist { .. } | Source::SourceTree { .. } => {
                let wheel = memoized(&self.wheel, || self.build(registry))?;
                Ok(Some(wheel))
            }
        }
    }

    /// Build a wheel from source. Wheels built from index archives are kept
    /// in the distributions cache and reused by later runs.
    fn build(&self, registry: &Registry) -> Result<PathBuf> {
        let cacheable = matches!(self.source, Source::Sdist { .. }) && !self.direct;
        let cached = if cacheable {
            registry.cached_wheel(&self.key, &self.version)?
        } else {
            None
        };
        if let Some(wheel) = cached {
            debug!(candidate = %self, wheel = %wheel.display(), "reusing built wheel");
            return Ok(wheel);
        }
        let tree = self
            .source_tree(registry)?
            .ok_or_else(|| Error::MetadataUnavailable(self.to_string()))?;
        let wheel = registry.build_wheel(tree)?;
        if cacheable {
            self.check_identity(&read_wheel_metadata(&wheel)?)?;
            return registry.cache_wheel(&wheel);
        }
        Ok(wheel)
    }

    /// The metadata must describe the project and version this candidate
    /// was identified as.
    fn check_identity(&self, metadata: &Metadata) -> Result<()> {
        let key = ProjectKey::new(metadata.name()?);
        let version = metadata.version()?;
        if key == self.key && version == self.version {
            return Ok(());
        }
        Err(Error::MetadataUnavailable(format!(
            "{self}: metadata describes {key} {version}"
        )))
    }

    /// Core metadata, fetched or built on first access.
    pub fn metadata(&self, registry: &Registry) -> Result<&Metadata> {
        if let Source::Active(dist) | Source::Pool(dist) = &self.source {
            if dist.metadata.is_empty() {
                return Err(Error::MetadataUnavailable(self.to_string()));
            }
            return Ok(&dist.metadata);
        }
        memoized(&self.metadata, || {
            let wheel = self
                .wheel_path(registry)?
                .ok_or_else(|| Error::MetadataUnavailable(self.to_string()))?;
            let metadata = read_wheel_metadata(wheel)?;
            self.check_identity(&metadata)?;
            Ok(metadata)
        })
    }

    /// Declared dependencies that apply to this candidate.
    ///
    /// Entries without a marker always apply. An entry with a marker applies
    /// when the marker holds for at least one requested extra, so marked
    /// entries never apply to a candidate requested without extras.
    pub fn dependencies(&self, registry: &Registry) -> Result<&[Requirement]> {
        let deps = memoized(&self.dependencies, || {
            let markers = &registry.environment().markers;
            let declared = self.metadata(registry)?.requires_dist()?;
            Ok(declared
                .into_iter()
                .filter(|dep| match &dep.marker {
                    None => true,
                    Some(marker) => self
                        .extras
                        .iter()
                        .any(|extra| marker.evaluate_with_extra(markers, extra)),
                })
                .collect())
        })?;
        Ok(deps)
    }

    /// Whether every requirement targets this project and allows this
    /// version, and (for wheels) whether the environment supports the tags.
    ///
    /// Pre-releases are not filtered here; the provider applies that policy
    /// when it matches candidates against requirements.
    pub fn is_compatible(&self, requirements: &[Requirement], environment: &Environment) -> bool {
        let matches = requirements.iter().all(|r| {
            r.project_key() == self.key && r.specifier.contains_with(&self.version, true)
        });
        match &self.source {
            Source::Wheel { tags, .. } => matches && environment.supports_any(tags),
            _ => matches,
        }
    }

    /// `name==version` for this candidate.
    pub fn pinned_requirement(&self) -> Requirement {
        Requirement::pinned(self.key.as_str(), &self.version)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        write!(f, " {}", self.version)?;
        match &self.source {
            Source::Active(dist) => write!(f, " (active: {})", dist.location.display()),
            Source::Pool(dist) => write!(f, " (pool: {})", dist.location.display()),
            Source::Wheel { url, .. } | Source::Sdist { url } => write!(f, " ({url})"),
            Source::SourceTree { path } => write!(f, " (source: {})", path.display()),
        }
    }
}
