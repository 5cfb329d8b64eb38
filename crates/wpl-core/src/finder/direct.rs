use std::collections::{BTreeSet, HashMap};

use tracing::debug;
use wpl_schema::{ProjectKey, Requirement};

use super::CandidateFinder;
use crate::candidate::Candidate;
use crate::candidate::maker::Maker;
use crate::error::{Error, Result};
use crate::registry::Registry;

/// Yields the one candidate named by a direct reference (`name @ url`, a
/// local path, or an archive URL) among the input requirements.
#[derive(Debug)]
pub struct DirectFinder {
    references: HashMap<ProjectKey, Requirement>,
}

impl DirectFinder {
    /// Collect the direct references from the input requirements.
    ///
    /// A second reference for the same project is a usage error, even when
    /// it repeats the first.
    pub fn new(requirements: &[Requirement]) -> Result<Self> {
        let mut references: HashMap<ProjectKey, Requirement> = HashMap::new();
        for requirement in requirements {
            let Some(url) = &requirement.url else {
                continue;
            };
            let key = requirement.project_key();
            if let Some(existing) = references.get(&key) {
                return Err(Error::Usage(format!(
                    "more than one direct reference for {key}: {} and {url}",
                    existing.url.as_deref().unwrap_or_default()
                )));
            }
            references.insert(key, requirement.clone());
        }
        Ok(Self { references })
    }
}

impl CandidateFinder for DirectFinder {
    fn find_candidates(
        &self,
        registry: &Registry,
        key: &ProjectKey,
        _requirements: &[Requirement],
        extras: &BTreeSet<String>,
    ) -> Result<Vec<Candidate>> {
        let Some(requirement) = self.references.get(key) else {
            return Ok(Vec::new());
        };
        for maker in Maker::ALL {
            if let Some(candidate) =
                maker.make_from_direct_requirement(registry, requirement, extras)?
            {
                debug!(%candidate, "direct reference");
                return Ok(vec![candidate]);
            }
        }
        Err(Error::Usage(format!(
            "cannot use {} as a reference for {key}",
            requirement.url.as_deref().unwrap_or_default()
        )))
    }
}
