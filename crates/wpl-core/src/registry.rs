//! Per-invocation context.
//!
//! The [`Registry`] ties together the settings, the probed environment, a
//! temporary work area that lives as long as the registry, one HTTP client,
//! and the builder and installer capability chains. It also memoizes the
//! expensive source operations so each archive is unpacked, and each tree
//! built, at most once per invocation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use reqwest::blocking::Client;
use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

use crate::USER_AGENT;
use crate::builder::{PipWheelBuilder, WheelBuilder};
use crate::candidate::maker::{Identity, wheel_identity_of};
use crate::candidate::read_wheel_metadata;
use crate::config::Settings;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::installer::{Installer, PipInstaller, WheelUnpacker};
use crate::io::extract;
use crate::lock::DirLock;
use wpl_schema::{ProjectKey, Version};

/// File name of the links record in the environment's purelib directory.
pub const LINKS_RECORD_NAME: &str = "wpl-links.pth";

/// Shared state for one command run.
#[derive(Debug)]
pub struct Registry {
    settings: Settings,
    environment: Environment,
    temp: TempDir,
    client: Client,
    builders: Vec<Box<dyn WheelBuilder>>,
    installers: Vec<Box<dyn Installer>>,
    source_identities: RefCell<HashMap<PathBuf, Identity>>,
    built_wheels: RefCell<HashMap<PathBuf, PathBuf>>,
    extracted_sources: RefCell<HashMap<PathBuf, PathBuf>>,
}

impl Registry {
    /// Create a registry with the default builder and installer chains.
    pub fn new(settings: Settings, environment: Environment) -> Result<Self> {
        let temp = tempfile::Builder::new().prefix("wpl-").tempdir()?;
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            settings,
            environment,
            temp,
            client,
            builders: vec![Box::new(PipWheelBuilder)],
            installers: vec![Box::new(WheelUnpacker), Box::new(PipInstaller)],
            source_identities: RefCell::new(HashMap::new()),
            built_wheels: RefCell::new(HashMap::new()),
            extracted_sources: RefCell::new(HashMap::new()),
        })
    }

    /// Replace the builder chain.
    pub fn with_builders(mut self, builders: Vec<Box<dyn WheelBuilder>>) -> Self {
        self.builders = builders;
        self
    }

    /// Replace the installer chain.
    pub fn with_installers(mut self, installers: Vec<Box<dyn Installer>>) -> Self {
        self.installers = installers;
        self
    }

    /// Resolved settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Target environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// HTTP client for index pages and downloads.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// `<data>/<implementation>-<major>.<minor>-<processor>`
    pub fn data_dir(&self) -> PathBuf {
        self.settings.data_dir.join(self.environment.data_key())
    }

    /// Root of the tag-partitioned pool.
    pub fn pool_dir(&self) -> PathBuf {
        self.data_dir().join("pool")
    }

    /// Path of the links record.
    pub fn links_record(&self) -> PathBuf {
        self.environment.purelib.join(LINKS_RECORD_NAME)
    }

    /// A `Command` running the configured interpreter.
    pub fn python(&self) -> Command {
        Command::new(&self.settings.python)
    }

    /// A fresh directory inside the registry's temporary area.
    pub fn scratch_dir(&self) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("work-")
            .tempdir_in(self.temp.path())?;
        Ok(dir.keep())
    }

    /// Unpack a source archive and return its single top-level directory.
    /// Each archive is unpacked once per invocation.
    pub fn extract_source(&self, archive: &Path) -> Result<PathBuf> {
        if let Some(tree) = self.extracted_sources.borrow().get(archive) {
            return Ok(tree.clone());
        }
        let dest = self.scratch_dir()?;
        debug!(archive = %archive.display(), "extracting source archive");
        extract::extract(archive, &dest)?;
        let tree = extract::single_top_level_dir(&dest)?;
        self.extracted_sources
            .borrow_mut()
            .insert(archive.to_path_buf(), tree.clone());
        Ok(tree)
    }

    /// Build a wheel from a source tree with the first builder that accepts
    /// it. Built once per path per invocation.
    pub fn build_wheel(&self, source: &Path) -> Result<PathBuf> {
        if let Some(wheel) = self.built_wheels.borrow().get(source) {
            return Ok(wheel.clone());
        }
        let out_dir = self.scratch_dir()?;
        for builder in &self.builders {
            if let Some(wheel) = builder.build_wheel(self, source, &out_dir)? {
                debug!(source = %source.display(), wheel = %wheel.display(), "built wheel");
                self.built_wheels
                    .borrow_mut()
                    .insert(source.to_path_buf(), wheel.clone());
                return Ok(wheel);
            }
        }
        Err(Error::BuildFailure {
            path: source.to_path_buf(),
            reason: "no builder can handle this source tree".to_string(),
        })
    }

    /// A wheel for `key` at `version` built by an earlier run and kept in
    /// the distributions cache, if one suits the environment.
    pub fn cached_wheel(&self, key: &ProjectKey, version: &Version) -> Result<Option<PathBuf>> {
        let dir = self.settings.distributions_dir();
        if !dir.is_dir() {
            return Ok(None);
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .collect();
        files.sort();
        Ok(files.into_iter().find(|path| {
            wheel_identity_of(path).is_some_and(|identity| {
                identity.key == *key
                    && identity.version == *version
                    && identity
                        .tags
                        .is_some_and(|tags| self.environment.supports_any(&tags))
            })
        }))
    }

    /// Copy a freshly built wheel into the distributions cache and return
    /// the cached path.
    pub fn cache_wheel(&self, wheel: &Path) -> Result<PathBuf> {
        let name = wheel.file_name().ok_or_else(|| Error::BuildFailure {
            path: wheel.to_path_buf(),
            reason: "built wheel has no file name".to_string(),
        })?;
        let dir = self.settings.distributions_dir();
        let _lock = DirLock::acquire(&dir)?;
        let dest = dir.join(name);
        if dest.is_file() {
            return Ok(dest);
        }
        let mut temp = NamedTempFile::new_in(&dir)?;
        io::copy(&mut fs::File::open(wheel)?, temp.as_file_mut())?;
        temp.persist(&dest).map_err(|e| e.error)?;
        debug!(wheel = %dest.display(), "cached built wheel");
        Ok(dest)
    }

    /// Identity of a source tree, read from the wheel built from it.
    pub fn source_identity(&self, source: &Path) -> Result<Identity> {
        if let Some(identity) = self.source_identities.borrow().get(source) {
            return Ok(identity.clone());
        }
        let wheel = self.build_wheel(source)?;
        let metadata = read_wheel_metadata(&wheel)?;
        let identity = Identity {
            key: ProjectKey::new(metadata.name()?),
            version: metadata.version()?,
            tags: None,
        };
        self.source_identities
            .borrow_mut()
            .insert(source.to_path_buf(), identity.clone());
        Ok(identity)
    }

    /// Install `artifact` with the first installer that accepts it. With no
    /// `target`, installs into the environment.
    pub fn install(&self, artifact: &Path, target: Option<&Path>, editable: bool) -> Result<()> {
        for installer in &self.installers {
            if installer.install(self, artifact, target, editable)? {
                return Ok(());
            }
        }
        Err(Error::Usage(format!(
            "no installer can handle {}",
            artifact.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::tests::{test_registry, write_wheel};
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct CountingBuilder {
        calls: Rc<Cell<usize>>,
    }

    impl WheelBuilder for CountingBuilder {
        fn build_wheel(
            &self,
            _registry: &Registry,
            source_dir: &Path,
            out_dir: &Path,
        ) -> Result<Option<PathBuf>> {
            self.calls.set(self.calls.get() + 1);
            let name = source_dir.file_name().unwrap().to_string_lossy().to_string();
            Ok(Some(write_wheel(out_dir, &name, "0.3", &[])))
        }
    }

    #[derive(Debug)]
    struct Declining;

    impl WheelBuilder for Declining {
        fn build_wheel(&self, _: &Registry, _: &Path, _: &Path) -> Result<Option<PathBuf>> {
            Ok(None)
        }
    }

    #[test]
    fn test_paths_are_partitioned_by_interpreter() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        assert_eq!(
            registry.pool_dir(),
            temp.path().join("data/cpython-3.11-x86_64/pool")
        );
        assert_eq!(
            registry.links_record(),
            temp.path().join("site-packages/wpl-links.pth")
        );
        let scratch = registry.scratch_dir().unwrap();
        assert!(scratch.is_dir());
        assert_ne!(scratch, registry.scratch_dir().unwrap());
    }

    #[test]
    fn test_source_identity_builds_once() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("mytool");
        std::fs::create_dir_all(&source).unwrap();
        let calls = Rc::new(Cell::new(0));
        let registry = test_registry(temp.path()).with_builders(vec![
            Box::new(Declining),
            Box::new(CountingBuilder {
                calls: Rc::clone(&calls),
            }),
        ]);

        let identity = registry.source_identity(&source).unwrap();
        assert_eq!(identity.key.as_str(), "mytool");
        assert_eq!(identity.version.to_string(), "0.3");
        let again = registry.source_identity(&source).unwrap();
        assert_eq!(again, identity);
        assert_eq!(registry.build_wheel(&source).unwrap().extension().unwrap(), "whl");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_no_builder_is_build_failure() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path()).with_builders(vec![Box::new(Declining)]);
        assert!(matches!(
            registry.build_wheel(temp.path()),
            Err(Error::BuildFailure { .. })
        ));
    }
}
