//! Linking pool entries into an environment.
//!
//! The links record is a `.pth` file in the environment's purelib
//! directory listing one pool entry per line, which the interpreter adds to
//! its import path at startup. At most one entry per project is linked.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use wpl_schema::{ProjectKey, Requirement, Version};

use crate::candidate::{Candidate, InstalledDist};
use crate::error::{Error, Result};
use crate::lock::DirLock;
use crate::pool;
use crate::registry::Registry;
use crate::solve::solve_for_environment;

/// One linked pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Project the entry provides.
    pub key: ProjectKey,
    /// Version the entry provides.
    pub version: Version,
    /// Absolute path of the entry directory.
    pub path: PathBuf,
}

impl Link {
    /// `name==version` for this link.
    pub fn pinned(&self) -> Requirement {
        Requirement::pinned(self.key.as_str(), &self.version)
    }
}

/// The contents of a links record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    links: Vec<Link>,
}

impl LinkSet {
    /// Read `record`. A missing record is empty; lines naming directories
    /// without distribution metadata are dropped with a warning.
    pub fn read(record: &Path) -> Result<Self> {
        let text = match fs::read_to_string(record) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let mut set = Self::default();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let path = PathBuf::from(line);
            let Some(dist) = InstalledDist::find_in(&path)?.into_iter().next() else {
                warn!(path = line, "dropping stale link");
                continue;
            };
            set.add(Link {
                key: dist.key,
                version: dist.version,
                path,
            });
        }
        Ok(set)
    }

    /// Replace `record` with this set in one rename.
    pub fn write(&self, record: &Path) -> Result<()> {
        let dir = record
            .parent()
            .ok_or_else(|| Error::Usage(format!("invalid links record {}", record.display())))?;
        fs::create_dir_all(dir)?;
        let mut file = NamedTempFile::new_in(dir)?;
        for link in &self.links {
            writeln!(file, "{}", link.path.display())?;
        }
        file.persist(record).map_err(|e| e.error)?;
        Ok(())
    }

    /// Add `link` unless its project is already linked. Returns whether the
    /// set changed.
    pub fn add(&mut self, link: Link) -> bool {
        if self.contains(&link.key) {
            return false;
        }
        self.links.push(link);
        true
    }

    /// Remove the link for `key`, whatever its version.
    pub fn remove(&mut self, key: &ProjectKey) -> Option<Link> {
        let index = self.links.iter().position(|l| &l.key == key)?;
        Some(self.links.remove(index))
    }

    /// Whether `key` is linked.
    pub fn contains(&self, key: &ProjectKey) -> bool {
        self.links.iter().any(|l| &l.key == key)
    }

    /// Links sorted by project.
    pub fn sorted(&self) -> Vec<&Link> {
        let mut links: Vec<&Link> = self.links.iter().collect();
        links.sort_by(|a, b| a.key.cmp(&b.key));
        links
    }

    /// Number of links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether nothing is linked.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Apply `change` to the environment's record under its lock, rewriting
/// the record when anything changed.
fn update<T>(registry: &Registry, change: impl FnOnce(&mut LinkSet) -> Result<T>) -> Result<T> {
    let record = registry.links_record();
    let dir = record.parent().unwrap_or(Path::new("."));
    let _lock = DirLock::acquire(dir)?;
    let mut set = LinkSet::read(&record)?;
    let before = set.clone();
    let outcome = change(&mut set)?;
    if set != before {
        set.write(&record)?;
        debug!(record = %record.display(), links = set.len(), "rewrote links record");
    }
    Ok(outcome)
}

/// Link every candidate not already importable, promoting it into the pool
/// first when needed. Returns what was newly linked.
pub fn add_candidates<'a, I>(registry: &Registry, candidates: I) -> Result<Vec<Requirement>>
where
    I: IntoIterator<Item = &'a Candidate>,
{
    let mut entries = Vec::new();
    for candidate in candidates {
        if candidate.is_in_environment() {
            continue;
        }
        if let Some(path) = pool::promote(registry, candidate)? {
            entries.push(Link {
                key: candidate.project_key().clone(),
                version: candidate.version().clone(),
                path,
            });
        }
    }
    update(registry, |set| {
        let mut linked = Vec::new();
        for link in entries {
            let requirement = link.pinned();
            if set.add(link) {
                info!(%requirement, "linked");
                linked.push(requirement);
            } else {
                debug!(%requirement, "already linked");
            }
        }
        Ok(linked)
    })
}

/// Resolve `requirements` from the environment and pool, and link what the
/// environment lacks. Direct references are refused.
pub fn add(registry: &Registry, requirements: &[Requirement]) -> Result<Vec<Requirement>> {
    if let Some(direct) = requirements.iter().find(|r| r.url.is_some()) {
        return Err(Error::Usage(format!(
            "cannot link a direct reference: {direct}"
        )));
    }
    let resolution = solve_for_environment(registry, requirements, false)?;
    add_candidates(registry, resolution.candidates().map(Rc::as_ref))
}

/// Linked projects as `name==version`, sorted by name.
pub fn list(registry: &Registry) -> Result<Vec<Requirement>> {
    let set = LinkSet::read(&registry.links_record())?;
    Ok(set.sorted().into_iter().map(Link::pinned).collect())
}

/// Unlink the projects `requirements` name. Versions are ignored.
pub fn remove(registry: &Registry, requirements: &[Requirement]) -> Result<Vec<Requirement>> {
    update(registry, |set| {
        let mut removed = Vec::new();
        for requirement in requirements {
            if let Some(link) = set.remove(&requirement.project_key()) {
                info!(requirement = %link.pinned(), "unlinked");
                removed.push(link.pinned());
            }
        }
        Ok(removed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::maker::{Maker, wheel_identity_of};
    use crate::candidate::tests::{test_registry, write_wheel};
    use std::collections::BTreeSet;
    use tempfile::TempDir;
    use url::Url;

    fn link(name: &str, version: &str) -> Link {
        Link {
            key: ProjectKey::new(name),
            version: version.parse().unwrap(),
            path: PathBuf::from(format!("/pool/{name}-{version}")),
        }
    }

    fn wheel_candidate(path: &Path) -> Candidate {
        let url = Url::from_file_path(path).unwrap();
        Maker::BinaryArchive.make(wheel_identity_of(path).unwrap(), &url, &BTreeSet::new(), false)
    }

    fn pins(requirements: &[Requirement]) -> Vec<String> {
        requirements.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_link_set_deduplicates_by_key() {
        let mut set = LinkSet::default();
        assert!(set.add(link("demo", "1.0")));
        assert!(!set.add(link("demo", "1.0")));
        assert!(!set.add(link("Demo", "2.0")));
        assert_eq!(set.len(), 1);

        assert!(set.remove(&ProjectKey::new("other")).is_none());
        assert_eq!(set.len(), 1);
        assert_eq!(set.remove(&ProjectKey::new("demo")), Some(link("demo", "1.0")));
        assert!(set.is_empty());
    }

    #[test]
    fn test_add_list_remove() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let demo = wheel_candidate(&write_wheel(temp.path(), "demo", "1.0", &[]));
        let other = wheel_candidate(&write_wheel(temp.path(), "other", "0.3", &[]));

        let linked = add_candidates(&registry, [&other, &demo]).unwrap();
        assert_eq!(pins(&linked), ["other==0.3", "demo==1.0"]);
        assert!(add_candidates(&registry, [&demo]).unwrap().is_empty());
        assert_eq!(pins(&list(&registry).unwrap()), ["demo==1.0", "other==0.3"]);

        let record = fs::read_to_string(registry.links_record()).unwrap();
        assert_eq!(record.lines().count(), 2);
        let entry = registry.pool_dir().join("py3-none-any").join("demo-1.0");
        assert!(record.lines().any(|l| Path::new(l) == entry));

        let removed = remove(&registry, &["demo==9.9".parse().unwrap()]).unwrap();
        assert_eq!(pins(&removed), ["demo==1.0"]);
        assert!(remove(&registry, &["demo".parse().unwrap()]).unwrap().is_empty());
        assert_eq!(pins(&list(&registry).unwrap()), ["other==0.3"]);
    }

    #[test]
    fn test_stale_lines_are_dropped() {
        let temp = TempDir::new().unwrap();
        let record = temp.path().join("links.pth");
        fs::write(&record, "/nowhere/demo-1.0\n\n").unwrap();
        assert!(LinkSet::read(&record).unwrap().is_empty());
        assert!(LinkSet::read(&temp.path().join("missing.pth")).unwrap().is_empty());
    }

    #[test]
    fn test_direct_references_are_refused() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let requirement: Requirement = "demo @ https://files.example/demo-1.0.tar.gz"
            .parse()
            .unwrap();
        assert!(add(&registry, &[requirement]).unwrap_err().is_usage());
    }
}
