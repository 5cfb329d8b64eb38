use std::cell::OnceCell;
use std::collections::{BTreeSet, HashSet};

use tracing::debug;
use wpl_schema::{ProjectKey, Requirement};

use super::CandidateFinder;
use crate::candidate::{Candidate, InstalledDist};
use crate::error::Result;
use crate::registry::Registry;

/// Finds distributions already importable from the environment.
///
/// The search path is scanned once, on first use. When a project is
/// installed in several search path entries only the first one counts,
/// since that is the one the interpreter imports.
#[derive(Debug, Default)]
pub struct ActiveFinder {
    installed: OnceCell<Vec<InstalledDist>>,
}

impl ActiveFinder {
    /// Create a finder; nothing is scanned until the first query.
    pub fn new() -> Self {
        Self::default()
    }

    fn installed(&self, registry: &Registry) -> Result<&[InstalledDist]> {
        if let Some(installed) = self.installed.get() {
            return Ok(installed);
        }
        let mut seen = HashSet::new();
        let mut installed = Vec::new();
        for dir in &registry.environment().search_path {
            for dist in InstalledDist::find_in(dir)? {
                if seen.insert(dist.key.clone()) {
                    installed.push(dist);
                }
            }
        }
        debug!(count = installed.len(), "scanned active distributions");
        Ok(self.installed.get_or_init(|| installed))
    }
}

impl CandidateFinder for ActiveFinder {
    fn find_candidates(
        &self,
        registry: &Registry,
        key: &ProjectKey,
        requirements: &[Requirement],
        extras: &BTreeSet<String>,
    ) -> Result<Vec<Candidate>> {
        Ok(self
            .installed(registry)?
            .iter()
            .filter(|dist| &dist.key == key)
            .map(|dist| Candidate::active(dist.clone(), extras.clone()))
            .filter(|c| c.is_compatible(requirements, registry.environment()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::tests::{test_registry, write_installed};
    use tempfile::TempDir;

    #[test]
    fn test_finds_compatible_installed_distribution() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        write_installed(&temp.path().join("site-packages"), "demo", "1.2");
        let finder = ActiveFinder::new();
        let key = ProjectKey::new("Demo");

        let found = finder
            .find_candidates(&registry, &key, &["demo>=1".parse().unwrap()], &BTreeSet::new())
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_in_environment());
        assert_eq!(found[0].version().to_string(), "1.2");

        let none = finder
            .find_candidates(&registry, &key, &["demo>=2".parse().unwrap()], &BTreeSet::new())
            .unwrap();
        assert!(none.is_empty());
    }
}
