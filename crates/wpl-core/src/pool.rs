//! The pool: unpacked distributions shared across environments.
//!
//! Layout is `<pool>/<tag-key>/<project>-<version>/`, where the tag key is
//! the compressed tag set of the wheel the entry was unpacked from. Entries
//! are staged inside the pool root and renamed into place while the pool
//! lock is held, so a partially unpacked entry is never visible.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info, warn};
use wpl_schema::{ProjectKey, Requirement, Version, compress_tags, parse_tag};

use crate::candidate::maker::wheel_identity_of;
use crate::candidate::{Candidate, InstalledDist};
use crate::error::{Error, Result};
use crate::lock::{DirLock, is_lock_file};
use crate::registry::Registry;
use crate::solve::solve_for_pool;

/// Tag directories in the pool, sorted by name. With `compatible_only`,
/// only those sharing a tag with the environment.
fn tag_dirs(registry: &Registry, compatible_only: bool) -> Result<Vec<PathBuf>> {
    let root = registry.pool_dir();
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(&root)? {
        let path = entry?.path();
        if !path.is_dir() || is_lock_file(&path) {
            continue;
        }
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        let Some(name) = name.filter(|n| !n.starts_with('.')) else {
            continue;
        };
        let tags = match parse_tag(&name) {
            Ok(tags) => tags,
            Err(e) => {
                debug!(dir = %path.display(), "ignoring pool directory: {e}");
                continue;
            }
        };
        if compatible_only && !registry.environment().supports_any(&tags) {
            continue;
        }
        dirs.push(path);
    }
    dirs.sort();
    Ok(dirs)
}

fn entries(registry: &Registry, compatible_only: bool) -> Result<Vec<InstalledDist>> {
    let mut found = Vec::new();
    for tag_dir in tag_dirs(registry, compatible_only)? {
        let mut entry_dirs: Vec<PathBuf> = fs::read_dir(&tag_dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_dir())
            .collect();
        entry_dirs.sort();
        for entry_dir in entry_dirs {
            found.extend(InstalledDist::find_in(&entry_dir)?);
        }
    }
    Ok(found)
}

/// Every pool entry usable by the environment.
pub fn scan(registry: &Registry) -> Result<Vec<InstalledDist>> {
    entries(registry, true)
}

/// Unpack one candidate into the pool. Returns the entry directory, or
/// `None` for candidates that have no wheel (installed ones).
pub fn promote(registry: &Registry, candidate: &Candidate) -> Result<Option<PathBuf>> {
    if candidate.is_in_pool() {
        return Ok(candidate.installed_location().map(Path::to_path_buf));
    }
    let Some(wheel) = candidate.wheel_path(registry)? else {
        return Ok(None);
    };
    candidate.metadata(registry)?;
    let tags = wheel_identity_of(wheel)
        .and_then(|identity| identity.tags)
        .ok_or_else(|| Error::BuildFailure {
            path: wheel.to_path_buf(),
            reason: "not a wheel file name".to_string(),
        })?;

    let root = registry.pool_dir();
    let _lock = DirLock::acquire(&root)?;
    let dest = root.join(compress_tags(&tags)).join(format!(
        "{}-{}",
        candidate.project_key().as_filename_component(),
        candidate.version()
    ));
    if dest.exists() {
        debug!(entry = %dest.display(), "already pooled");
        return Ok(Some(dest));
    }

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(&root)?;
    registry.install(wheel, Some(staging.path()), false)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(staging.path(), &dest)?;
    info!(%candidate, entry = %dest.display(), "added to pool");
    Ok(Some(dest))
}

/// Promote every candidate that is not yet pooled. Returns the pool entry of
/// each candidate that has one.
pub fn add_candidates<'a, I>(
    registry: &Registry,
    candidates: I,
) -> Result<BTreeMap<ProjectKey, PathBuf>>
where
    I: IntoIterator<Item = &'a Candidate>,
{
    let mut placed = BTreeMap::new();
    for candidate in candidates {
        if candidate.is_in_environment() {
            continue;
        }
        if let Some(entry) = promote(registry, candidate)? {
            placed.insert(candidate.project_key().clone(), entry);
        }
    }
    Ok(placed)
}

/// Resolve `requirements` for the pool and add what is missing.
pub fn add(registry: &Registry, requirements: &[Requirement]) -> Result<Vec<Requirement>> {
    let resolution = solve_for_pool(registry, requirements, false)?;
    add_candidates(registry, resolution.candidates().map(Rc::as_ref))?;
    Ok(resolution.pinned())
}

/// Everything in the pool as `name==version`, sorted by name.
pub fn list(registry: &Registry) -> Result<Vec<Requirement>> {
    let mut found: Vec<(ProjectKey, Version)> = entries(registry, false)?
        .into_iter()
        .map(|dist| (dist.key, dist.version))
        .collect();
    found.sort();
    found.dedup();
    Ok(found
        .iter()
        .map(|(key, version)| Requirement::pinned(key.as_str(), version))
        .collect())
}

fn matches(requirement: &Requirement, dist: &InstalledDist) -> bool {
    requirement.project_key() == dist.key
        && requirement
            .specifier
            .pinned_version()
            .is_none_or(|version| *version == dist.version)
}

/// Delete the entries matching `requirements`: by key, and by version when
/// a requirement pins one. Returns what was removed.
pub fn remove(registry: &Registry, requirements: &[Requirement]) -> Result<Vec<Requirement>> {
    let root = registry.pool_dir();
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let _lock = DirLock::acquire(&root)?;
    let mut removed = Vec::new();
    for dist in entries(registry, false)? {
        if !requirements.iter().any(|r| matches(r, &dist)) {
            continue;
        }
        fs::remove_dir_all(&dist.location)?;
        info!(entry = %dist.location.display(), "removed from pool");
        remove_if_empty(dist.location.parent());
        removed.push(Requirement::pinned(dist.key.as_str(), &dist.version));
    }
    Ok(removed)
}

fn remove_if_empty(dir: Option<&Path>) {
    let Some(dir) = dir else {
        return;
    };
    let empty = fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
    if !empty {
        return;
    }
    if let Err(e) = fs::remove_dir(dir) {
        warn!(dir = %dir.display(), "could not remove empty tag directory: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::maker::Maker;
    use crate::candidate::tests::{test_registry, write_wheel};
    use std::collections::BTreeSet;
    use tempfile::TempDir;
    use url::Url;

    fn wheel_candidate(path: &Path) -> Candidate {
        let url = Url::from_file_path(path).unwrap();
        Maker::BinaryArchive.make(wheel_identity_of(path).unwrap(), &url, &BTreeSet::new(), false)
    }

    fn pins(requirements: &[Requirement]) -> Vec<String> {
        requirements.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_promote_unpacks_into_tag_directory() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let wheel = write_wheel(temp.path(), "Demo_Pkg", "1.0", &[]);

        let entry = promote(&registry, &wheel_candidate(&wheel)).unwrap().unwrap();
        assert_eq!(entry, registry.pool_dir().join("py3-none-any").join("demo_pkg-1.0"));
        assert!(entry.join("Demo_Pkg-1.0.dist-info").join("METADATA").is_file());

        let again = promote(&registry, &wheel_candidate(&wheel)).unwrap().unwrap();
        assert_eq!(again, entry);

        let scanned = scan(&registry).unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].key.as_str(), "demo-pkg");
        assert_eq!(scanned[0].location, entry);
    }

    #[test]
    fn test_scan_skips_incompatible_tags() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let foreign = registry
            .pool_dir()
            .join("cp27-cp27m-win32")
            .join("old-1.0")
            .join("old-1.0.dist-info");
        fs::create_dir_all(&foreign).unwrap();
        fs::write(foreign.join("METADATA"), "Name: old\nVersion: 1.0\n").unwrap();

        assert!(scan(&registry).unwrap().is_empty());
        assert_eq!(pins(&list(&registry).unwrap()), ["old==1.0"]);
    }

    #[test]
    fn test_list_and_remove() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let candidates = [
            wheel_candidate(&write_wheel(temp.path(), "zeta", "2.0", &[])),
            wheel_candidate(&write_wheel(temp.path(), "alpha", "1.0", &[])),
            wheel_candidate(&write_wheel(temp.path(), "alpha", "1.1", &[])),
        ];
        let placed = add_candidates(&registry, &candidates).unwrap();
        assert_eq!(placed.len(), 2);
        assert_eq!(
            pins(&list(&registry).unwrap()),
            ["alpha==1.0", "alpha==1.1", "zeta==2.0"]
        );

        let removed = remove(&registry, &["alpha==1.0".parse().unwrap()]).unwrap();
        assert_eq!(pins(&removed), ["alpha==1.0"]);
        let removed = remove(&registry, &["ZETA".parse().unwrap()]).unwrap();
        assert_eq!(pins(&removed), ["zeta==2.0"]);
        assert_eq!(pins(&list(&registry).unwrap()), ["alpha==1.1"]);

        assert!(remove(&registry, &["missing".parse().unwrap()]).unwrap().is_empty());
    }
}
