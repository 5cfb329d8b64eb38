//! `wpl install`.

use anyhow::Result;
use wpl_core::Error;
use wpl_core::parser::parse_requirements;

use super::{or_report_no_solution, print_requirements, registry};
use crate::GlobalArgs;

/// Install requirements and editable references into the environment.
pub fn install(
    global: &GlobalArgs,
    inputs: &[String],
    editable: &[String],
    no_deps: bool,
) -> Result<()> {
    if inputs.is_empty() && editable.is_empty() {
        return Err(Error::Usage("nothing to install".to_string()).into());
    }
    let registry = registry(global)?;
    let requirements = parse_requirements(&registry, inputs)?;
    let editable = parse_requirements(&registry, editable)?;

    let result = wpl_core::install::install(&registry, &requirements, &editable, no_deps);
    let Some(summary) = or_report_no_solution(result)? else {
        return Ok(());
    };
    print_requirements(Some("linked"), &summary.linked);
    print_requirements(Some("installed"), &summary.installed);
    if summary.linked.is_empty() && summary.installed.is_empty() {
        println!("Requirements already satisfied.");
    }
    Ok(())
}
