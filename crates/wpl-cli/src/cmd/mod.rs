//! Command implementations.
//!
//! Every command builds its own [`Registry`] (which probes the interpreter)
//! except `cache list`, which only needs the settings.

pub mod cache;
pub mod install;
pub mod links;
pub mod pool;
pub mod solve;

use anyhow::{Context, Result};
use wpl_core::config::parse_index_url;
use wpl_core::{Environment, Error, Registry, Settings};
use wpl_schema::Requirement;

use crate::GlobalArgs;

/// Settings from file and environment, overridden by command-line flags.
pub fn settings(global: &GlobalArgs) -> Result<Settings> {
    let mut settings = Settings::load().context("Failed to load settings")?;
    if let Some(python) = &global.python {
        settings.python.clone_from(python);
    }
    if let Some(url) = &global.index_url {
        settings.index_url = parse_index_url(url)?;
    }
    if let Some(dir) = &global.cache_dir {
        settings.cache_dir.clone_from(dir);
    }
    if let Some(dir) = &global.data_dir {
        settings.data_dir.clone_from(dir);
    }
    Ok(settings)
}

/// Probe the interpreter and build the per-invocation registry.
pub fn registry(global: &GlobalArgs) -> Result<Registry> {
    let settings = settings(global)?;
    let environment = Environment::probe(&settings.python)
        .with_context(|| format!("Failed to inspect {}", settings.python.display()))?;
    Ok(Registry::new(settings, environment)?)
}

/// Turn "no solution" into a printed report. Other errors pass through.
pub fn or_report_no_solution<T>(result: wpl_core::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::ResolutionImpossible(reason)) => {
            println!("No solution found:");
            println!("{reason}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Print one requirement per line, prefixed with `verb` when given.
pub fn print_requirements(verb: Option<&str>, requirements: &[Requirement]) {
    for requirement in requirements {
        match verb {
            Some(verb) => println!("{verb} {requirement}"),
            None => println!("{requirement}"),
        }
    }
}
