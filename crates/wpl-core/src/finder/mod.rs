//! Candidate finders.
//!
//! Each finder answers one question: which candidates for this project key,
//! compatible with these requirements, can this source offer? Finders are
//! queried in a fixed priority order by the provider; within one finder's
//! output, binary candidates come before source candidates of the same
//! version.

mod active;
mod direct;
mod index;
mod pool;

use std::collections::BTreeSet;
use std::fmt;

use wpl_schema::{ProjectKey, Requirement};

use crate::candidate::Candidate;
use crate::error::Result;
use crate::registry::Registry;

pub use active::ActiveFinder;
pub use direct::DirectFinder;
pub use index::{IndexLink, RemoteIndexFinder, parse_links};
pub use pool::PoolFinder;

/// A source of candidates.
pub trait CandidateFinder: fmt::Debug {
    /// Candidates for `key` satisfying every requirement, carrying `extras`.
    fn find_candidates(
        &self,
        registry: &Registry,
        key: &ProjectKey,
        requirements: &[Requirement],
        extras: &BTreeSet<String>,
    ) -> Result<Vec<Candidate>>;
}
