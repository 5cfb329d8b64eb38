//! `wpl cache` subcommands.

use anyhow::Result;

use super::settings;
use crate::{CacheCommands, GlobalArgs};

/// Dispatch `wpl cache ...`. Never probes the interpreter.
pub fn run(global: &GlobalArgs, command: &CacheCommands) -> Result<()> {
    let settings = settings(global)?;
    match command {
        CacheCommands::List => {
            for name in wpl_core::cache::list(&settings)? {
                println!("{name}");
            }
        }
    }
    Ok(())
}
