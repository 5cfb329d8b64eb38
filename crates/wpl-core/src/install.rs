//! Installing requirements into an environment.
//!
//! Most projects are never copied into the environment: they are unpacked
//! into the pool once and linked. Only direct references are handed to the
//! installer chain, editable ones in editable mode.

use std::collections::BTreeSet;
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, info};
use wpl_schema::{ProjectKey, Requirement};

use crate::candidate::Candidate;
use crate::error::{Error, Result};
use crate::links;
use crate::registry::Registry;
use crate::solve::{Resolution, solve, solve_for_environment};

/// What an install changed.
#[derive(Debug, Default)]
pub struct InstallSummary {
    /// Projects newly linked from the pool.
    pub linked: Vec<Requirement>,
    /// Direct references handed to an installer.
    pub installed: Vec<Requirement>,
}

fn resolve(registry: &Registry, requirements: &[Requirement], no_deps: bool) -> Result<Resolution> {
    match solve_for_environment(registry, requirements, no_deps) {
        Err(Error::ResolutionImpossible(reason)) => {
            debug!("local resolution failed, consulting the index: {reason}");
            solve(registry, requirements, no_deps)
        }
        other => other,
    }
}

/// The artifact to hand to the installer: the source tree for an editable
/// install, otherwise the archive or tree itself.
fn direct_artifact<'c>(
    registry: &Registry,
    candidate: &'c Candidate,
    editable: bool,
) -> Result<&'c Path> {
    if editable {
        return candidate.source_tree(registry)?.ok_or_else(|| {
            Error::Usage(format!("{candidate} cannot be installed in editable mode"))
        });
    }
    candidate
        .local_path(registry)?
        .ok_or_else(|| Error::Usage(format!("{candidate} has no artifact to install")))
}

/// Install `requirements` and `editable` into the environment.
///
/// Every editable requirement must be a direct reference. The environment
/// and pool are tried first; the index is only consulted when they cannot
/// satisfy the request. Nothing is changed unless resolution succeeds and
/// every artifact is available.
pub fn install(
    registry: &Registry,
    requirements: &[Requirement],
    editable: &[Requirement],
    no_deps: bool,
) -> Result<InstallSummary> {
    if let Some(missing) = editable.iter().find(|r| r.url.is_none()) {
        return Err(Error::Usage(format!(
            "editable install needs a direct reference: {missing}"
        )));
    }
    let editable_keys: BTreeSet<ProjectKey> =
        editable.iter().map(Requirement::project_key).collect();
    let all: Vec<Requirement> = requirements.iter().chain(editable).cloned().collect();

    let resolution = resolve(registry, &all, no_deps)?;

    let (direct, linkable): (Vec<&Rc<Candidate>>, Vec<&Rc<Candidate>>) = resolution
        .candidates()
        .filter(|c| !c.is_in_environment() || c.is_direct())
        .partition(|c| c.is_direct());

    // Everything that can fail before touching the environment happens here.
    let mut planned = Vec::new();
    for candidate in direct {
        let as_editable = editable_keys.contains(candidate.project_key());
        let artifact = direct_artifact(registry, candidate, as_editable)?;
        planned.push((candidate, artifact, as_editable));
    }
    for candidate in &linkable {
        candidate.wheel_path(registry)?;
        candidate.metadata(registry)?;
    }

    let linked = links::add_candidates(registry, linkable.into_iter().map(Rc::as_ref))?;

    let mut installed = Vec::new();
    for (candidate, artifact, as_editable) in planned {
        registry.install(artifact, None, as_editable)?;
        info!(%candidate, editable = as_editable, "installed");
        installed.push(candidate.pinned_requirement());
    }
    Ok(InstallSummary { linked, installed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::maker::{Maker, wheel_identity_of};
    use crate::candidate::tests::{test_registry, write_wheel};
    use crate::installer::Installer;
    use crate::pool;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use url::Url;

    #[derive(Debug, Default)]
    struct RecordingInstaller {
        calls: Rc<RefCell<Vec<(PathBuf, bool, bool)>>>,
    }

    impl Installer for RecordingInstaller {
        fn install(
            &self,
            _registry: &Registry,
            artifact: &Path,
            target: Option<&Path>,
            editable: bool,
        ) -> Result<bool> {
            self.calls
                .borrow_mut()
                .push((artifact.to_path_buf(), target.is_some(), editable));
            Ok(true)
        }
    }

    fn pins(requirements: &[Requirement]) -> Vec<String> {
        requirements.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_editable_requires_direct_reference() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let error = install(&registry, &[], &["demo".parse().unwrap()], false).unwrap_err();
        assert!(error.is_usage());
    }

    #[test]
    fn test_pooled_projects_are_linked() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let wheel = write_wheel(temp.path(), "demo", "1.0", &[]);
        let url = Url::from_file_path(&wheel).unwrap();
        let candidate = Maker::BinaryArchive.make(
            wheel_identity_of(&wheel).unwrap(),
            &url,
            &BTreeSet::new(),
            false,
        );
        pool::promote(&registry, &candidate).unwrap();

        let summary = install(&registry, &["demo>=1".parse().unwrap()], &[], false).unwrap();
        assert_eq!(pins(&summary.linked), ["demo==1.0"]);
        assert!(summary.installed.is_empty());
        assert_eq!(pins(&links::list(&registry).unwrap()), ["demo==1.0"]);
    }

    #[test]
    fn test_direct_reference_goes_to_installer() {
        let temp = TempDir::new().unwrap();
        let recorder = RecordingInstaller::default();
        let calls = Rc::clone(&recorder.calls);
        let registry = test_registry(temp.path()).with_installers(vec![Box::new(recorder)]);
        let wheel = write_wheel(temp.path(), "demo", "1.0", &[]);
        let url = Url::from_file_path(&wheel).unwrap();
        let requirement: Requirement = format!("demo @ {url}").parse().unwrap();

        let summary = install(&registry, &[requirement], &[], true).unwrap();
        assert_eq!(pins(&summary.installed), ["demo==1.0"]);
        assert!(summary.linked.is_empty());
        assert_eq!(*calls.borrow(), [(wheel, false, false)]);
    }

    #[test]
    fn test_editable_wheel_is_refused() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let wheel = write_wheel(temp.path(), "demo", "1.0", &[]);
        let url = Url::from_file_path(&wheel).unwrap();
        let requirement: Requirement = format!("demo @ {url}").parse().unwrap();
        let error = install(&registry, &[], &[requirement], false).unwrap_err();
        assert!(error.is_usage());
    }

    #[test]
    fn test_refused_editable_leaves_links_untouched() {
        let temp = TempDir::new().unwrap();
        let recorder = RecordingInstaller::default();
        let calls = Rc::clone(&recorder.calls);
        let registry = test_registry(temp.path()).with_installers(vec![Box::new(recorder)]);
        let dep = write_wheel(temp.path(), "dep", "1.0", &[]);
        let dep_url = Url::from_file_path(&dep).unwrap();
        let dep_candidate = Maker::BinaryArchive.make(
            wheel_identity_of(&dep).unwrap(),
            &dep_url,
            &BTreeSet::new(),
            false,
        );
        pool::promote(&registry, &dep_candidate).unwrap();

        let wheel = write_wheel(temp.path(), "demo", "1.0", &["dep"]);
        let url = Url::from_file_path(&wheel).unwrap();
        let requirement: Requirement = format!("demo @ {url}").parse().unwrap();
        let error = install(&registry, &[], &[requirement], false).unwrap_err();

        assert!(error.is_usage());
        assert!(links::list(&registry).unwrap().is_empty());
        assert!(calls.borrow().is_empty());
    }
}
