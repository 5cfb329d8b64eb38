//! `wpl solve`.

use anyhow::Result;
use tracing::debug;
use wpl_core::parser::parse_requirements;

use super::{or_report_no_solution, registry};
use crate::GlobalArgs;

/// Resolve and print the pinned set.
pub fn solve(global: &GlobalArgs, inputs: &[String], no_deps: bool) -> Result<()> {
    let registry = registry(global)?;
    let requirements = parse_requirements(&registry, inputs)?;
    let Some(resolution) =
        or_report_no_solution(wpl_core::solve(&registry, &requirements, no_deps))?
    else {
        return Ok(());
    };
    for candidate in resolution.candidates() {
        debug!(%candidate, "elected");
    }
    print!("{resolution}");
    Ok(())
}
