//! `wpl links` subcommands.

use anyhow::Result;
use wpl_core::links;
use wpl_core::parser::parse_requirements;

use super::{or_report_no_solution, print_requirements, registry};
use crate::{GlobalArgs, LinksCommands};

/// Dispatch `wpl links ...`.
pub fn run(global: &GlobalArgs, command: &LinksCommands) -> Result<()> {
    let registry = registry(global)?;
    match command {
        LinksCommands::Add { requirements } => {
            let requirements = parse_requirements(&registry, requirements)?;
            if let Some(linked) = or_report_no_solution(links::add(&registry, &requirements))? {
                print_requirements(Some("linked"), &linked);
            }
        }
        LinksCommands::List => print_requirements(None, &links::list(&registry)?),
        LinksCommands::Remove { requirements } => {
            let requirements = parse_requirements(&registry, requirements)?;
            print_requirements(Some("unlinked"), &links::remove(&registry, &requirements)?);
        }
    }
    Ok(())
}
