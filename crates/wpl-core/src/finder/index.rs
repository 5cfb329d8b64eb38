use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use regex::Regex;
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;
use wpl_schema::{ProjectKey, Requirement, SpecifierSet, Version};

use super::CandidateFinder;
use crate::candidate::Candidate;
use crate::candidate::maker::Maker;
use crate::error::{Error, Result};
use crate::registry::Registry;

/// One anchor on a simple-index project page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLink {
    /// Absolute artifact URL, fragment included.
    pub url: Url,
    /// Unescaped `data-requires-python`, when present and non-empty.
    pub requires_python: Option<String>,
    /// Whether `data-yanked` is present.
    pub yanked: bool,
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Extract the artifact links from a project page.
pub fn parse_links(page_url: &Url, html: &str) -> Result<Vec<IndexLink>> {
    let anchor = Regex::new(r"(?is)<a\s([^>]*)>")?;
    let attribute = Regex::new(
        r#"(?i)([a-z][a-z0-9_:-]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#,
    )?;

    let mut links = Vec::new();
    for captures in anchor.captures_iter(html) {
        let mut href = None;
        let mut requires_python = None;
        let mut yanked = false;
        for attr in attribute.captures_iter(&captures[1]) {
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map(|m| unescape_html(m.as_str()));
            match attr[1].to_ascii_lowercase().as_str() {
                "href" => href = value,
                "data-requires-python" => {
                    requires_python = value.filter(|v| !v.trim().is_empty());
                }
                "data-yanked" => yanked = true,
                _ => {}
            }
        }
        let Some(href) = href else {
            continue;
        };
        match page_url.join(&href) {
            Ok(url) => links.push(IndexLink {
                url,
                requires_python,
                yanked,
            }),
            Err(e) => warn!(href, "skipping unparsable index link: {e}"),
        }
    }
    Ok(links)
}

/// Finds release artifacts on a PEP 503 simple index.
///
/// Each project page is fetched at most once per finder. Versions are
/// yielded newest first; for every version the wheels are offered, or the
/// source archives when there is no wheel.
#[derive(Debug, Default)]
pub struct RemoteIndexFinder {
    pages: RefCell<HashMap<ProjectKey, Rc<Vec<IndexLink>>>>,
}

impl RemoteIndexFinder {
    /// Create a finder with an empty page cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn links(&self, registry: &Registry, key: &ProjectKey) -> Result<Rc<Vec<IndexLink>>> {
        if let Some(links) = self.pages.borrow().get(key) {
            return Ok(Rc::clone(links));
        }
        let page_url = registry
            .settings()
            .index_url
            .join(&format!("{key}/"))
            .map_err(|e| Error::context("index URL", e))?;
        debug!(url = %page_url, "fetching project page");

        let response = registry.client().get(page_url.clone()).send()?;
        let links = if response.status() == StatusCode::NOT_FOUND {
            debug!(%key, "project not on index");
            Vec::new()
        } else {
            let html = response.error_for_status()?.text()?;
            parse_links(&page_url, &html)?
        };
        let links = Rc::new(links);
        self.pages
            .borrow_mut()
            .insert(key.clone(), Rc::clone(&links));
        Ok(links)
    }
}

/// Whether a link's `data-requires-python` admits the interpreter.
fn python_compatible(link: &IndexLink, python: &Version) -> bool {
    let Some(raw) = &link.requires_python else {
        return true;
    };
    match raw.parse::<SpecifierSet>() {
        Ok(specifier) => specifier.contains_with(python, true),
        Err(e) => {
            warn!(url = %link.url, "ignoring unparsable requires-python {raw:?}: {e}");
            true
        }
    }
}

/// Newest version first; wheels if a version has any, else its sources.
fn select_per_version(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut releases: BTreeMap<Version, (Vec<Candidate>, Vec<Candidate>)> = BTreeMap::new();
    for candidate in candidates {
        let release = releases.entry(candidate.version().clone()).or_default();
        if candidate.is_built() {
            release.0.push(candidate);
        } else {
            release.1.push(candidate);
        }
    }
    releases
        .into_values()
        .rev()
        .flat_map(|(built, unbuilt)| if built.is_empty() { unbuilt } else { built })
        .collect()
}

impl CandidateFinder for RemoteIndexFinder {
    fn find_candidates(
        &self,
        registry: &Registry,
        key: &ProjectKey,
        requirements: &[Requirement],
        extras: &BTreeSet<String>,
    ) -> Result<Vec<Candidate>> {
        let environment = registry.environment();
        let mut candidates = Vec::new();
        for link in self.links(registry, key)?.iter() {
            if link.yanked {
                debug!(url = %link.url, "skipping yanked link");
                continue;
            }
            if !python_compatible(link, &environment.python_version) {
                debug!(url = %link.url, "skipping link for another Python");
                continue;
            }
            for maker in Maker::ARCHIVES {
                if let Some(candidate) = maker.make_from_uri(registry, &link.url, extras, false)? {
                    if candidate.project_key() == key
                        && candidate.is_compatible(requirements, environment)
                    {
                        candidates.push(candidate);
                    }
                    break;
                }
            }
        }
        Ok(select_per_version(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::tests::test_registry;
    use crate::config::{Settings, parse_index_url};
    use crate::environment::tests::linux_env;
    use mockito::Server;
    use std::path::Path;
    use tempfile::TempDir;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><body>
<a href="../../packages/demo-1.0.tar.gz#sha256=aa">demo-1.0.tar.gz</a>
<a href="https://files.example/demo-1.0-py3-none-any.whl#sha256=bb" data-requires-python="&gt;=3.7">demo-1.0-py3-none-any.whl</a>
<a href="https://files.example/demo-2.0.tar.gz" data-requires-python="&gt;=4">demo-2.0.tar.gz</a>
<a href="https://files.example/demo-1.5.tar.gz" data-yanked="">demo-1.5.tar.gz</a>
<a href='https://files.example/demo-0.9.zip'>demo-0.9.zip</a>
<a name="no-href">nothing</a>
</body></html>"#;

    #[test]
    fn test_parse_links() {
        let page = Url::parse("https://index.example/simple/demo/").unwrap();
        let links = parse_links(&page, PAGE).unwrap();
        assert_eq!(links.len(), 5);
        assert_eq!(
            links[0].url.as_str(),
            "https://index.example/packages/demo-1.0.tar.gz#sha256=aa"
        );
        assert_eq!(links[1].requires_python.as_deref(), Some(">=3.7"));
        assert!(links[3].yanked);
        assert!(!links[4].yanked);
    }

    #[test]
    fn test_python_compatibility_filter() {
        let python: Version = "3.11.4".parse().unwrap();
        let page = Url::parse("https://index.example/simple/demo/").unwrap();
        let links = parse_links(&page, PAGE).unwrap();
        assert!(python_compatible(&links[0], &python));
        assert!(python_compatible(&links[1], &python));
        assert!(!python_compatible(&links[2], &python));
    }

    #[test]
    fn test_wheels_preferred_and_versions_descending() {
        let temp = TempDir::new().unwrap();
        let registry = test_registry(temp.path());
        let page = Url::parse("https://index.example/simple/demo/").unwrap();
        let extras = BTreeSet::new();
        let candidates: Vec<Candidate> = parse_links(&page, PAGE)
            .unwrap()
            .iter()
            .filter_map(|link| {
                Maker::ARCHIVES.iter().find_map(|maker| {
                    maker
                        .make_from_uri(&registry, &link.url, &extras, false)
                        .unwrap()
                })
            })
            .collect();
        assert_eq!(candidates.len(), 5);

        let selected = select_per_version(candidates);
        let shown: Vec<String> = selected
            .iter()
            .map(|c| format!("{} {}", c.version(), c.is_built()))
            .collect();
        assert_eq!(
            shown,
            ["2.0 false", "1.5 false", "1.0 true", "0.9 false"]
        );
    }

    fn index_registry(root: &Path, server: &Server) -> Registry {
        let mut settings = Settings::with_home(root).unwrap();
        settings.index_url = parse_index_url(&format!("{}/simple", server.url())).unwrap();
        Registry::new(settings, linux_env(root)).unwrap()
    }

    fn shown(candidates: &[Candidate]) -> Vec<String> {
        candidates
            .iter()
            .map(|c| format!("{} {}", c.version(), c.is_built()))
            .collect()
    }

    #[test]
    fn test_fetches_and_filters_project_page() {
        let mut server = Server::new();
        let page = format!(
            "{PAGE}\n<a href=\"https://files.example/demo-1.1-cp27-cp27m-win32.whl\">win32</a>"
        );
        let mock = server
            .mock("GET", "/simple/demo/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(page)
            .expect(1)
            .create();
        let temp = TempDir::new().unwrap();
        let registry = index_registry(temp.path(), &server);
        let finder = RemoteIndexFinder::new();
        let key = ProjectKey::new("demo");
        let extras = BTreeSet::new();

        let all = finder
            .find_candidates(&registry, &key, &["demo".parse().unwrap()], &extras)
            .unwrap();
        assert_eq!(shown(&all), ["1.0 true", "0.9 false"]);

        let older = finder
            .find_candidates(&registry, &key, &["demo<1".parse().unwrap()], &extras)
            .unwrap();
        assert_eq!(shown(&older), ["0.9 false"]);
        mock.assert();
    }

    #[test]
    fn test_missing_project_is_empty() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/simple/missing/")
            .with_status(404)
            .create();
        let temp = TempDir::new().unwrap();
        let registry = index_registry(temp.path(), &server);

        let found = RemoteIndexFinder::new()
            .find_candidates(
                &registry,
                &ProjectKey::new("missing"),
                &["missing".parse().unwrap()],
                &BTreeSet::new(),
            )
            .unwrap();
        assert!(found.is_empty());
        mock.assert();
    }

    #[test]
    fn test_server_error_is_reported() {
        let mut server = Server::new();
        let _mock = server
            .mock("GET", "/simple/demo/")
            .with_status(503)
            .create();
        let temp = TempDir::new().unwrap();
        let registry = index_registry(temp.path(), &server);

        let result = RemoteIndexFinder::new().find_candidates(
            &registry,
            &ProjectKey::new("demo"),
            &["demo".parse().unwrap()],
            &BTreeSet::new(),
        );
        assert!(matches!(result, Err(Error::Http(_))));
    }
}
