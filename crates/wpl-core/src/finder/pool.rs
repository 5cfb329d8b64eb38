use std::cell::OnceCell;
use std::collections::BTreeSet;

use wpl_schema::{ProjectKey, Requirement};

use super::CandidateFinder;
use crate::candidate::{Candidate, InstalledDist};
use crate::error::Result;
use crate::pool;
use crate::registry::Registry;

/// Finds distributions unpacked in the pool under a tag directory the
/// environment supports.
#[derive(Debug, Default)]
pub struct PoolFinder {
    entries: OnceCell<Vec<InstalledDist>>,
}

impl PoolFinder {
    /// Create a finder; the pool is scanned on first use.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CandidateFinder for PoolFinder {
    fn find_candidates(
        &self,
        registry: &Registry,
        key: &ProjectKey,
        requirements: &[Requirement],
        extras: &BTreeSet<String>,
    ) -> Result<Vec<Candidate>> {
        let entries = match self.entries.get() {
            Some(entries) => entries,
            None => {
                let scanned = pool::scan(registry)?;
                self.entries.get_or_init(|| scanned)
            }
        };
        Ok(entries
            .iter()
            .filter(|dist| &dist.key == key)
            .map(|dist| Candidate::pooled(dist.clone(), extras.clone()))
            .filter(|c| c.is_compatible(requirements, registry.environment()))
            .collect())
    }
}
