//! PubGrub adapter for wpl dependency resolution.
//!
//! Implements pubgrub's `DependencyProvider` on top of a [`Provider`].
//! Extras become virtual packages: `demo[fast]` at version V depends on
//! `demo` at exactly V plus whatever the `fast` extra pulls in. Requirement
//! ranges are built as the union of the exact versions of known candidates
//! that satisfy the requirement, so version containment is always decided
//! by [`Provider::is_satisfied_by`].

use std::borrow::Borrow;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use pubgrub::error::PubGrubError;
use pubgrub::range::Range;
use pubgrub::report::{DefaultStringReporter, Reporter};
use pubgrub::solver::{Dependencies, DependencyConstraints, DependencyProvider};
use pubgrub::version::Version as PubGrubVersion;
use tracing::{debug, warn};
use wpl_schema::{ProjectKey, Requirement, Version};

use crate::candidate::Candidate;
use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::solve::Resolution;

/// A node in the resolution graph.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum PkgId {
    /// The set of requested requirements.
    Root,
    /// A real project.
    Project(ProjectKey),
    /// A project together with one of its extras.
    Extra(ProjectKey, String),
}

impl PkgId {
    /// The project this node belongs to, if any.
    pub fn project_key(&self) -> Option<&ProjectKey> {
        match self {
            PkgId::Root => None,
            PkgId::Project(key) | PkgId::Extra(key, _) => Some(key),
        }
    }

    /// The requirement used to ask the finders for this node's candidates.
    fn lookup_requirement(&self) -> Option<Requirement> {
        match self {
            PkgId::Root => None,
            PkgId::Project(key) => Some(Requirement::named(key.as_str())),
            PkgId::Extra(key, extra) => {
                Some(Requirement::named(key.as_str()).with_extras([extra]))
            }
        }
    }
}

impl fmt::Display for PkgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkgId::Root => write!(f, "the requested set"),
            PkgId::Project(key) => write!(f, "{key}"),
            PkgId::Extra(key, extra) => write!(f, "{key}[{extra}]"),
        }
    }
}

/// A PEP 440 version made usable by pubgrub.
///
/// pubgrub needs a successor for every version to build exact ranges;
/// `step` provides one without inventing real release numbers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SolverVersion {
    version: Version,
    step: u32,
}

impl SolverVersion {
    /// The version pubgrub sees for a candidate.
    pub fn of(candidate: &Candidate) -> Self {
        Self::from(candidate.version().clone())
    }

    /// The underlying release version.
    pub fn version(&self) -> &Version {
        &self.version
    }
}

impl From<Version> for SolverVersion {
    fn from(version: Version) -> Self {
        Self { version, step: 0 }
    }
}

impl fmt::Display for SolverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.step == 0 {
            write!(f, "{}", self.version)
        } else {
            write!(f, "{}+{}", self.version, self.step)
        }
    }
}

impl PubGrubVersion for SolverVersion {
    fn lowest() -> Self {
        Self::from(Version::lowest())
    }

    fn bump(&self) -> Self {
        Self {
            version: self.version.clone(),
            step: self.step + 1,
        }
    }
}

type Matches = Rc<Vec<Rc<Candidate>>>;

/// The single version of [`PkgId::Root`].
fn root_version() -> SolverVersion {
    SolverVersion::from(Version::from_release(&[0]))
}

fn boxed(error: Error) -> Box<dyn StdError> {
    Box::new(error)
}

/// Adapter that provides wpl candidates to the `PubGrub` solver.
#[derive(Debug)]
pub struct WplDependencyProvider<'p, 'r> {
    provider: &'p Provider<'r>,
    root_requirements: Vec<Requirement>,
    matches: RefCell<HashMap<PkgId, Matches>>,
    edges: RefCell<HashMap<(PkgId, SolverVersion), BTreeSet<ProjectKey>>>,
}

impl<'p, 'r> WplDependencyProvider<'p, 'r> {
    /// Create an adapter resolving `requirements` through `provider`.
    pub fn new(provider: &'p Provider<'r>, requirements: &[Requirement]) -> Self {
        Self {
            provider,
            root_requirements: requirements.to_vec(),
            matches: RefCell::new(HashMap::new()),
            edges: RefCell::new(HashMap::new()),
        }
    }

    fn matches_for(&self, pkg: &PkgId) -> Result<Matches> {
        if let Some(matches) = self.matches.borrow().get(pkg) {
            return Ok(Rc::clone(matches));
        }
        let matches = match (pkg.project_key(), pkg.lookup_requirement()) {
            (Some(key), Some(requirement)) => self.provider.find_matches(key, &[requirement])?,
            _ => Vec::new(),
        };
        let matches = Rc::new(matches);
        self.matches
            .borrow_mut()
            .insert(pkg.clone(), Rc::clone(&matches));
        Ok(matches)
    }

    /// The candidate pubgrub means by `(pkg, version)`: the first match at
    /// that version, which is also the one `choose_package_version` picked.
    fn elect(&self, pkg: &PkgId, version: &SolverVersion) -> Result<Rc<Candidate>> {
        self.matches_for(pkg)?
            .iter()
            .find(|c| SolverVersion::of(c) == *version)
            .cloned()
            .ok_or_else(|| Error::Solver(format!("no candidate for {pkg} {version}")))
    }

    fn range_for(&self, pkg: &PkgId, requirement: &Requirement) -> Result<Range<SolverVersion>> {
        Ok(self
            .matches_for(pkg)?
            .iter()
            .filter(|c| self.provider.is_satisfied_by(requirement, c))
            .fold(Range::none(), |range, c| {
                range.union(&Range::exact(SolverVersion::of(c)))
            }))
    }

    /// Translate requirements into pubgrub constraints. `None` means some
    /// requirement cannot be met by any known candidate.
    fn constraints_for(
        &self,
        dependent: &PkgId,
        requirements: &[Requirement],
    ) -> Result<Option<DependencyConstraints<PkgId, SolverVersion>>> {
        let mut constraints: DependencyConstraints<PkgId, SolverVersion> =
            DependencyConstraints::default();
        for requirement in requirements {
            let key = self.provider.identify(requirement);
            let targets = std::iter::once(PkgId::Project(key.clone())).chain(
                requirement
                    .extras
                    .iter()
                    .map(|extra| PkgId::Extra(key.clone(), extra.clone())),
            );
            for target in targets {
                if &target == dependent {
                    continue;
                }
                let mut range = self.range_for(&target, requirement)?;
                if range == Range::none() {
                    warn!(%dependent, %requirement, "no candidate satisfies dependency");
                    return Ok(None);
                }
                if let Some(existing) = constraints.get(&target) {
                    range = range.intersection(existing);
                }
                constraints.insert(target, range);
            }
        }
        if constraints.values().any(|range| *range == Range::none()) {
            warn!(%dependent, "conflicting requirements on the same project");
            return Ok(None);
        }
        Ok(Some(constraints))
    }

    fn dependencies(
        &self,
        pkg: &PkgId,
        version: &SolverVersion,
    ) -> Result<Dependencies<PkgId, SolverVersion>> {
        let constraints = match pkg {
            PkgId::Root => self.constraints_for(pkg, &self.root_requirements)?,
            PkgId::Project(_) => {
                let candidate = self.elect(pkg, version)?;
                let requirements = self.provider.get_dependencies(&candidate)?;
                self.constraints_for(pkg, &requirements)?
            }
            PkgId::Extra(key, _) => {
                let candidate = self.elect(pkg, version)?;
                let mut requirements = self.provider.get_dependencies(&candidate)?;
                requirements.push(Requirement::pinned(key.as_str(), version.version()));
                self.constraints_for(pkg, &requirements)?
            }
        };

        let Some(constraints) = constraints else {
            return Ok(Dependencies::Unknown);
        };
        let own = pkg.project_key();
        let children: BTreeSet<ProjectKey> = constraints
            .keys()
            .filter_map(PkgId::project_key)
            .filter(|key| Some(*key) != own)
            .cloned()
            .collect();
        debug!(%pkg, %version, dependencies = children.len(), "expanded dependencies");
        self.edges
            .borrow_mut()
            .insert((pkg.clone(), version.clone()), children);
        Ok(Dependencies::Known(constraints))
    }
}

impl DependencyProvider<PkgId, SolverVersion> for WplDependencyProvider<'_, '_> {
    fn choose_package_version<T: Borrow<PkgId>, U: Borrow<Range<SolverVersion>>>(
        &self,
        potential_packages: impl Iterator<Item = (T, U)>,
    ) -> std::result::Result<(T, Option<SolverVersion>), Box<dyn StdError>> {
        let mut potential: Vec<(T, U)> = potential_packages.collect();

        let root = potential
            .iter()
            .position(|(pkg, _)| matches!(<T as Borrow<PkgId>>::borrow(pkg), PkgId::Root));
        if let Some(index) = root {
            let (pkg, _) = potential.swap_remove(index);
            return Ok((pkg, Some(root_version())));
        }

        // Decide the most constrained package first.
        let mut best: Option<(usize, usize)> = None;
        for (index, (pkg, range)) in potential.iter().enumerate() {
            let pkg: &PkgId = pkg.borrow();
            let range: &Range<SolverVersion> = range.borrow();
            let matches = self.matches_for(pkg).map_err(boxed)?;
            let remaining: Vec<Rc<Candidate>> = matches
                .iter()
                .filter(|c| range.contains(&SolverVersion::of(c)))
                .cloned()
                .collect();
            let preference = self.provider.get_preference(&remaining);
            match best {
                Some((_, current)) if current <= preference => {}
                _ => best = Some((index, preference)),
            }
        }
        let Some((index, _)) = best else {
            return Err(boxed(Error::Solver(
                "no package left to decide".to_string(),
            )));
        };

        let (pkg, range) = potential.swap_remove(index);
        let pkg_id: &PkgId = pkg.borrow();
        let range: &Range<SolverVersion> = range.borrow();
        let version = self
            .matches_for(pkg_id)
            .map_err(boxed)?
            .iter()
            .map(|c| SolverVersion::of(c))
            .find(|v| range.contains(v));
        match &version {
            Some(version) => debug!(pkg = %pkg_id, %version, "chose version"),
            None => debug!(pkg = %pkg_id, "no version left in range"),
        }
        Ok((pkg, version))
    }

    fn get_dependencies(
        &self,
        pkg: &PkgId,
        version: &SolverVersion,
    ) -> std::result::Result<Dependencies<PkgId, SolverVersion>, Box<dyn StdError>> {
        self.dependencies(pkg, version).map_err(boxed)
    }
}

fn unbox(error: Box<dyn StdError>) -> Error {
    match error.downcast::<Error>() {
        Ok(error) => *error,
        Err(other) => Error::Solver(other.to_string()),
    }
}

/// Resolve `requirements` with the `PubGrub` algorithm.
///
/// A proof that no assignment exists is reported as
/// [`Error::ResolutionImpossible`] with pubgrub's explanation.
pub fn resolve(provider: &Provider<'_>, requirements: &[Requirement]) -> Result<Resolution> {
    let adapter = WplDependencyProvider::new(provider, requirements);
    for requirement in requirements {
        let pkg = PkgId::Project(provider.identify(requirement));
        if adapter.range_for(&pkg, requirement)? == Range::none() {
            return Err(Error::ResolutionImpossible(format!(
                "no candidates found for {requirement}"
            )));
        }
    }
    let root = root_version();

    let solution = match pubgrub::solver::resolve(&adapter, PkgId::Root, root.clone()) {
        Ok(solution) => solution,
        Err(PubGrubError::NoSolution(mut tree)) => {
            tree.collapse_no_versions();
            return Err(Error::ResolutionImpossible(DefaultStringReporter::report(
                &tree,
            )));
        }
        Err(PubGrubError::ErrorRetrievingDependencies { source, .. }) => {
            return Err(unbox(source));
        }
        Err(PubGrubError::ErrorChoosingPackageVersion(source)) => return Err(unbox(source)),
        Err(other) => return Err(Error::Solver(other.to_string())),
    };

    let edges = adapter.edges.borrow();
    let mut mapping = BTreeMap::new();
    let mut graph: BTreeMap<ProjectKey, BTreeSet<ProjectKey>> = BTreeMap::new();
    for (pkg, version) in &solution {
        if let PkgId::Project(key) = pkg {
            mapping.insert(key.clone(), adapter.elect(pkg, version)?);
        }
        if let Some(key) = pkg.project_key() {
            let children = edges.get(&(pkg.clone(), version.clone()));
            graph
                .entry(key.clone())
                .or_default()
                .extend(children.into_iter().flatten().cloned());
        }
    }
    let requested = edges
        .get(&(PkgId::Root, root))
        .cloned()
        .unwrap_or_default();

    Ok(Resolution {
        mapping,
        requested,
        graph,
    })
}
