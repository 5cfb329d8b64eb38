//! Placing artifacts into a target directory or the environment.
//!
//! Installers form a chain on the [`Registry`]; the first one that accepts
//! an artifact installs it. [`WheelUnpacker`] handles the common case of
//! unpacking a wheel into a pool directory natively. Everything else (source
//! archives, editable installs, installs into the live environment) goes to
//! pip.

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::io::extract;
use crate::registry::Registry;

/// Capability to install an artifact.
pub trait Installer: fmt::Debug {
    /// Install `artifact` into `target`, or into the environment when
    /// `target` is `None`. Returns `Ok(false)` to decline.
    fn install(
        &self,
        registry: &Registry,
        artifact: &Path,
        target: Option<&Path>,
        editable: bool,
    ) -> Result<bool>;
}

/// Unpacks a wheel into a target directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct WheelUnpacker;

impl Installer for WheelUnpacker {
    fn install(
        &self,
        _registry: &Registry,
        artifact: &Path,
        target: Option<&Path>,
        editable: bool,
    ) -> Result<bool> {
        let Some(target) = target else {
            return Ok(false);
        };
        let is_wheel = artifact.extension().is_some_and(|ext| ext == "whl");
        if editable || !is_wheel || !artifact.is_file() {
            return Ok(false);
        }
        info!(wheel = %artifact.display(), target = %target.display(), "unpacking wheel");
        extract::extract_zip(artifact, target)?;
        spread_data_dirs(target)?;
        Ok(true)
    }
}

/// Move the contents of `*.data/purelib` and `*.data/platlib` up into the
/// install root, as an installer would.
fn spread_data_dirs(target: &Path) -> Result<()> {
    for entry in fs::read_dir(target)? {
        let data_dir = entry?.path();
        let is_data = data_dir
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(".data"));
        if !is_data || !data_dir.is_dir() {
            continue;
        }
        for scheme in ["purelib", "platlib"] {
            let lib = data_dir.join(scheme);
            if !lib.is_dir() {
                continue;
            }
            for item in fs::read_dir(&lib)? {
                let item = item?;
                let dest = target.join(item.file_name());
                debug!(from = %item.path().display(), "spreading {scheme} entry");
                fs::rename(item.path(), dest)?;
            }
        }
    }
    Ok(())
}

/// Installs with `python -m pip install --no-deps`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipInstaller;

impl Installer for PipInstaller {
    fn install(
        &self,
        registry: &Registry,
        artifact: &Path,
        target: Option<&Path>,
        editable: bool,
    ) -> Result<bool> {
        let mut command = registry.python();
        command.args(["-m", "pip", "install", "--no-deps", "--quiet"]);
        if let Some(target) = target {
            command.arg("--target").arg(target);
        }
        if editable {
            command.arg("-e");
        }
        command.arg(artifact);

        info!(artifact = %artifact.display(), editable, "installing with pip");
        let output = command.output().map_err(|e| Error::Process {
            command: format!("{command:?}"),
            message: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(Error::Process {
                command: format!("{command:?}"),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(true)
    }
}
