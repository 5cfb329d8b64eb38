//! Turning source trees into wheels.
//!
//! Building is delegated to an external backend. Builders form a chain on
//! the [`Registry`]: each one either builds the tree or declines it, and the
//! first to produce a wheel wins.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::registry::Registry;

/// Capability to build a wheel from a source tree.
pub trait WheelBuilder: fmt::Debug {
    /// Build `source_dir` into a wheel placed in `out_dir`.
    ///
    /// Returns `Ok(None)` when this builder cannot handle the tree, so the
    /// next builder in the chain gets a chance.
    fn build_wheel(
        &self,
        registry: &Registry,
        source_dir: &Path,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>>;
}

/// Builds with `python -m pip wheel --no-deps`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipWheelBuilder;

/// Whether a directory looks like a buildable Python project.
pub fn is_buildable_tree(dir: &Path) -> bool {
    dir.join("pyproject.toml").is_file() || dir.join("setup.py").is_file()
}

impl WheelBuilder for PipWheelBuilder {
    fn build_wheel(
        &self,
        registry: &Registry,
        source_dir: &Path,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        if !is_buildable_tree(source_dir) {
            return Ok(None);
        }
        let wheel_dir = registry.scratch_dir()?;

        info!(source = %source_dir.display(), "building wheel");
        let mut command = registry.python();
        command
            .args(["-m", "pip", "wheel", "--no-deps", "--quiet", "--wheel-dir"])
            .arg(&wheel_dir)
            .arg(source_dir);
        let output = command.output().map_err(|e| Error::Process {
            command: format!("{command:?}"),
            message: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(Error::BuildFailure {
                path: source_dir.to_path_buf(),
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let produced = walkdir::WalkDir::new(&wheel_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .map(walkdir::DirEntry::into_path)
            .find(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "whl"))
            .ok_or_else(|| Error::BuildFailure {
                path: source_dir.to_path_buf(),
                reason: "the build produced no wheel".to_string(),
            })?;
        let Some(filename) = produced.file_name() else {
            return Ok(None);
        };
        let dest = out_dir.join(filename);
        fs::rename(&produced, &dest)?;
        Ok(Some(dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::tests::test_registry;
    use tempfile::TempDir;

    #[test]
    fn test_tree_without_project_file_is_declined() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let tree = temp.path().join("not-a-project");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("README"), "hello").unwrap();

        assert!(!is_buildable_tree(&tree));
        let out = registry.scratch_dir().unwrap();
        assert!(
            PipWheelBuilder
                .build_wheel(&registry, &tree, &out)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_project_files_are_recognised() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("setup.py"), "").unwrap();
        assert!(is_buildable_tree(temp.path()));
    }
}
