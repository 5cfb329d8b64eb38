//! Resolution policy.
//!
//! The [`Provider`] answers the questions a backtracking resolver asks:
//! which project a requirement is about, which candidates satisfy a group of
//! requirements (and in what order to try them), what a candidate depends
//! on, and whether a candidate satisfies a requirement. The solver adapter
//! in [`crate::pubgrub_adapter`] translates these answers into pubgrub's
//! vocabulary.

use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::debug;
use wpl_schema::{ProjectKey, Requirement};

use crate::candidate::Candidate;
use crate::error::Result;
use crate::finder::CandidateFinder;
use crate::registry::Registry;

/// Finder-backed resolution policy.
#[derive(Debug)]
pub struct Provider<'r> {
    registry: &'r Registry,
    finders: Vec<Box<dyn CandidateFinder + 'r>>,
    skip_dependencies: bool,
}

impl<'r> Provider<'r> {
    /// Create a provider querying `finders` in order.
    pub fn new(
        registry: &'r Registry,
        finders: Vec<Box<dyn CandidateFinder + 'r>>,
        skip_dependencies: bool,
    ) -> Self {
        Self {
            registry,
            finders,
            skip_dependencies,
        }
    }

    /// The registry this provider resolves against.
    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// The project a requirement is about.
    pub fn identify(&self, requirement: &Requirement) -> ProjectKey {
        requirement.project_key()
    }

    /// Candidates for `key` that satisfy all of `requirements`, in the order
    /// they should be tried.
    ///
    /// Extras are merged across the requirements. Finders are asked in
    /// priority order and each finder's answer is sorted newest first. As
    /// soon as a finder offers a direct candidate, that candidate is the
    /// only match.
    pub fn find_matches(
        &self,
        key: &ProjectKey,
        requirements: &[Requirement],
    ) -> Result<Vec<Rc<Candidate>>> {
        let extras: BTreeSet<String> = requirements
            .iter()
            .flat_map(|r| r.extras.iter().cloned())
            .collect();

        let mut matches = Vec::new();
        for finder in &self.finders {
            let mut found = finder.find_candidates(self.registry, key, requirements, &extras)?;
            found.sort_by(|a, b| b.version().cmp(a.version()));
            if let Some(direct) = found.iter().position(Candidate::is_direct) {
                let candidate = found.swap_remove(direct);
                debug!(%key, %candidate, "direct reference overrides other candidates");
                return Ok(vec![Rc::new(candidate)]);
            }
            matches.extend(found.into_iter().map(Rc::new));
        }
        debug!(%key, count = matches.len(), "found matches");
        Ok(matches)
    }

    /// Ordering heuristic: the number of remaining candidates. Packages with
    /// fewer choices are decided first.
    pub fn get_preference(&self, candidates: &[Rc<Candidate>]) -> usize {
        candidates.len()
    }

    /// What `candidate` depends on, or nothing when dependencies are skipped.
    pub fn get_dependencies(&self, candidate: &Candidate) -> Result<Vec<Requirement>> {
        if self.skip_dependencies {
            return Ok(Vec::new());
        }
        Ok(candidate.dependencies(self.registry)?.to_vec())
    }

    /// Whether `candidate` is the project `requirement` names, at a version
    /// its specifier admits.
    pub fn is_satisfied_by(&self, requirement: &Requirement, candidate: &Candidate) -> bool {
        self.identify(requirement) == *candidate.project_key()
            && requirement.specifier.contains(candidate.version())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::candidate::maker::{Maker, wheel_identity_of};
    use crate::candidate::tests::{test_registry, write_wheel};
    use std::path::PathBuf;
    use tempfile::TempDir;
    use url::Url;

    /// In-memory finder over wheels written to disk, for resolver tests.
    #[derive(Debug, Default)]
    pub(crate) struct WheelFinder {
        wheels: Vec<PathBuf>,
        direct: bool,
    }

    impl WheelFinder {
        pub(crate) fn new(wheels: Vec<PathBuf>) -> Self {
            Self {
                wheels,
                direct: false,
            }
        }

        pub(crate) fn direct(wheels: Vec<PathBuf>) -> Self {
            Self {
                wheels,
                direct: true,
            }
        }
    }

    impl CandidateFinder for WheelFinder {
        fn find_candidates(
            &self,
            registry: &Registry,
            key: &ProjectKey,
            requirements: &[Requirement],
            extras: &BTreeSet<String>,
        ) -> Result<Vec<Candidate>> {
            Ok(self
                .wheels
                .iter()
                .filter_map(|path| {
                    let identity = wheel_identity_of(path)?;
                    let url = Url::from_file_path(path).ok()?;
                    Some(Maker::BinaryArchive.make(identity, &url, extras, self.direct))
                })
                .filter(|c| c.project_key() == key)
                .filter(|c| c.is_compatible(requirements, registry.environment()))
                .collect())
        }
    }

    #[test]
    fn test_find_matches_orders_finders_and_versions() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();
        let provider = Provider::new(
            &registry,
            vec![
                Box::new(WheelFinder::new(vec![
                    write_wheel(&first, "demo", "1.0", &[]),
                    write_wheel(&first, "demo", "1.1", &[]),
                ])),
                Box::new(WheelFinder::new(vec![write_wheel(&second, "demo", "2.0", &[])])),
            ],
            false,
        );

        let matches = provider
            .find_matches(&ProjectKey::new("demo"), &["demo".parse().unwrap()])
            .unwrap();
        let versions: Vec<String> = matches.iter().map(|c| c.version().to_string()).collect();
        assert_eq!(versions, ["1.1", "1.0", "2.0"]);
    }

    #[test]
    fn test_direct_candidate_wins() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let index = temp.path().join("index");
        let local = temp.path().join("local");
        std::fs::create_dir_all(&index).unwrap();
        std::fs::create_dir_all(&local).unwrap();
        let provider = Provider::new(
            &registry,
            vec![
                Box::new(WheelFinder::new(vec![write_wheel(&index, "demo", "9.0", &[])])),
                Box::new(WheelFinder::direct(vec![write_wheel(&local, "demo", "0.1", &[])])),
                Box::new(WheelFinder::new(vec![write_wheel(&index, "demo", "10.0", &[])])),
            ],
            false,
        );

        let matches = provider
            .find_matches(&ProjectKey::new("demo"), &["demo".parse().unwrap()])
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].is_direct());
        assert_eq!(matches[0].version().to_string(), "0.1");
    }

    #[test]
    fn test_extras_are_merged_and_dependencies_skippable() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let found = vec![write_wheel(
            temp.path(),
            "demo",
            "1.0",
            &["dep", "extra-dep; extra == 'fast'"],
        )];
        let provider = Provider::new(&registry, vec![Box::new(WheelFinder::new(found))], false);

        let requirements: [Requirement; 2] =
            ["demo".parse().unwrap(), "demo[fast]>=1".parse().unwrap()];
        let matches = provider
            .find_matches(&ProjectKey::new("demo"), &requirements)
            .unwrap();
        assert_eq!(matches.len(), 1);
        let deps = provider.get_dependencies(&matches[0]).unwrap();
        assert_eq!(deps.len(), 2);
        assert!(provider.is_satisfied_by(&requirements[1], &matches[0]));
        assert!(!provider.is_satisfied_by(&"demo>1".parse().unwrap(), &matches[0]));

        let skipping = Provider::new(&registry, Vec::new(), true);
        assert!(skipping.get_dependencies(&matches[0]).unwrap().is_empty());
        assert_eq!(provider.get_preference(&matches), 1);
    }
}
