//! Canonical project names.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Canonicalize a distribution name.
///
/// Lower-cases the name and collapses every run of `-`, `_` and `.` into a
/// single `-`, so `Foo_Bar`, `foo.bar` and `FOO--bar` all compare equal.
pub fn canonicalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

/// A canonicalized project name, the only identity used when matching
/// requirements against candidates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectKey(String);

impl ProjectKey {
    /// Create a key from any spelling of a project name.
    pub fn new(name: &str) -> Self {
        Self(canonicalize(name))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as it appears in file and directory names (`-` replaced by `_`).
    pub fn as_filename_component(&self) -> String {
        self.0.replace('-', "_")
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ProjectKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ProjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProjectKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
