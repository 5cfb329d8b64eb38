//! Entry points for resolution.
//!
//! Three finder configurations cover every command: the full set used by
//! `solve` and as the install fallback, an offline set that only considers
//! what is already on this machine, and the pool set that ignores the
//! environment.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, info};
use wpl_schema::{ProjectKey, Requirement};

use crate::candidate::Candidate;
use crate::error::Result;
use crate::finder::{ActiveFinder, CandidateFinder, DirectFinder, PoolFinder, RemoteIndexFinder};
use crate::provider::Provider;
use crate::pubgrub_adapter;
use crate::registry::Registry;

/// The outcome of a successful resolution.
#[derive(Debug)]
pub struct Resolution {
    /// One elected candidate per project.
    pub mapping: BTreeMap<ProjectKey, Rc<Candidate>>,
    /// Projects named by the input requirements.
    pub requested: BTreeSet<ProjectKey>,
    /// Dependency edges between elected projects.
    pub graph: BTreeMap<ProjectKey, BTreeSet<ProjectKey>>,
}

impl Resolution {
    /// Elected candidates in key order.
    pub fn candidates(&self) -> impl Iterator<Item = &Rc<Candidate>> {
        self.mapping.values()
    }

    /// `name==version` for every elected candidate, in key order.
    pub fn pinned(&self) -> Vec<Requirement> {
        self.candidates().map(|c| c.pinned_requirement()).collect()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for candidate in self.candidates() {
            writeln!(f, "{}=={}", candidate.project_key(), candidate.version())?;
        }
        Ok(())
    }
}

/// Drop requirements whose marker does not hold for the environment.
fn applicable(registry: &Registry, requirements: &[Requirement]) -> Vec<Requirement> {
    let markers = &registry.environment().markers;
    requirements
        .iter()
        .filter(|r| {
            let keep = r.marker.as_ref().is_none_or(|m| m.evaluate(markers));
            if !keep {
                debug!(requirement = %r, "marker excludes requirement");
            }
            keep
        })
        .cloned()
        .collect()
}

/// Resolve with an explicit finder list.
pub fn solve_with<'r>(
    registry: &'r Registry,
    finders: Vec<Box<dyn CandidateFinder + 'r>>,
    requirements: &[Requirement],
    skip_dependencies: bool,
) -> Result<Resolution> {
    let requirements = applicable(registry, requirements);
    let provider = Provider::new(registry, finders, skip_dependencies);
    let resolution = pubgrub_adapter::resolve(&provider, &requirements)?;
    info!(projects = resolution.mapping.len(), "resolved");
    Ok(resolution)
}

/// Resolve against direct references, the environment, the pool and the
/// index, in that priority order.
pub fn solve(
    registry: &Registry,
    requirements: &[Requirement],
    skip_dependencies: bool,
) -> Result<Resolution> {
    let finders: Vec<Box<dyn CandidateFinder>> = vec![
        Box::new(DirectFinder::new(requirements)?),
        Box::new(ActiveFinder::new()),
        Box::new(PoolFinder::new()),
        Box::new(RemoteIndexFinder::new()),
    ];
    solve_with(registry, finders, requirements, skip_dependencies)
}

/// Resolve without the network: direct references, the environment and
/// the pool.
pub fn solve_for_environment(
    registry: &Registry,
    requirements: &[Requirement],
    skip_dependencies: bool,
) -> Result<Resolution> {
    let finders: Vec<Box<dyn CandidateFinder>> = vec![
        Box::new(DirectFinder::new(requirements)?),
        Box::new(ActiveFinder::new()),
        Box::new(PoolFinder::new()),
    ];
    solve_with(registry, finders, requirements, skip_dependencies)
}

/// Resolve for the pool alone: pooled entries, then the index.
pub fn solve_for_pool(
    registry: &Registry,
    requirements: &[Requirement],
    skip_dependencies: bool,
) -> Result<Resolution> {
    let finders: Vec<Box<dyn CandidateFinder>> =
        vec![Box::new(PoolFinder::new()), Box::new(RemoteIndexFinder::new())];
    solve_with(registry, finders, requirements, skip_dependencies)
}
