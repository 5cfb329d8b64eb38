//! Resolution and installation engine for wpl.
//!
//! Requirement strings are parsed into [`wpl_schema::Requirement`]s, fed to
//! a [`provider::Provider`] that queries an ordered list of candidate
//! finders, and solved by pubgrub into a [`solve::Resolution`]. The
//! resolution then drives pool promotion, links, and installs.

pub mod builder;
pub mod cache;
pub mod candidate;
pub mod config;
pub mod environment;
pub mod error;
pub mod finder;
pub mod install;
pub mod installer;
pub mod io;
pub mod links;
pub mod lock;
pub mod parser;
/// Default locations for configuration and data.
pub mod paths;
pub mod pool;
pub mod provider;
pub mod pubgrub_adapter;
pub mod registry;
pub mod solve;

pub use candidate::Candidate;
pub use config::Settings;
pub use environment::Environment;
pub use error::{Error, Result};
pub use registry::Registry;
pub use solve::{Resolution, solve, solve_for_environment, solve_for_pool};

/// User Agent string for index and download requests
pub const USER_AGENT: &str = concat!("wpl/", env!("CARGO_PKG_VERSION"));
