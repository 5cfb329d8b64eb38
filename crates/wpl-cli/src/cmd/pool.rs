//! `wpl pool` subcommands.

use anyhow::Result;
use wpl_core::parser::parse_requirements;
use wpl_core::pool;

use super::{or_report_no_solution, print_requirements, registry};
use crate::{GlobalArgs, PoolCommands};

/// Dispatch `wpl pool ...`.
pub fn run(global: &GlobalArgs, command: &PoolCommands) -> Result<()> {
    let registry = registry(global)?;
    match command {
        PoolCommands::Add { requirements } => {
            let requirements = parse_requirements(&registry, requirements)?;
            if let Some(pinned) = or_report_no_solution(pool::add(&registry, &requirements))? {
                print_requirements(Some("pooled"), &pinned);
            }
        }
        PoolCommands::List => print_requirements(None, &pool::list(&registry)?),
        PoolCommands::Remove { requirements } => {
            let requirements = parse_requirements(&registry, requirements)?;
            print_requirements(Some("removed"), &pool::remove(&registry, &requirements)?);
        }
    }
    Ok(())
}
