//! Description of the target interpreter.
//!
//! An [`Environment`] is built once per invocation and never changes. The
//! raw facts (paths, version, platform, marker variables) come from running
//! the interpreter once with a small introspection script; the compatible
//! wheel tag set is derived from those facts here, following the PEP 425
//! ordering rules used by installers.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;
use wpl_schema::{MarkerEnvironment, Tag, TagSet, Version};

use crate::error::{Error, Result};

const PROBE_SCRIPT: &str = r#"
import json, os, platform, sys, sysconfig
v = sys.version_info
impl = sys.implementation
def fmt(info):
    s = "%d.%d.%d" % (info.major, info.minor, info.micro)
    if info.releaselevel != "final":
        s += info.releaselevel[0] + str(info.serial)
    return s
libc = platform.libc_ver()
print(json.dumps({
    "purelib": sysconfig.get_paths()["purelib"],
    "implementation": impl.name,
    "processor": platform.machine(),
    "python_version": "%d.%d.%d" % (v.major, v.minor, v.micro),
    "search_path": [p for p in sys.path if p],
    "sys_platform": sys.platform,
    "glibc_version": libc[1] if libc[0] == "glibc" else None,
    "macos_version": platform.mac_ver()[0] or None,
    "abiflags": getattr(sys, "abiflags", ""),
    "markers": {
        "implementation_name": impl.name,
        "implementation_version": fmt(impl.version),
        "os_name": os.name,
        "platform_machine": platform.machine(),
        "platform_release": platform.release(),
        "platform_system": platform.system(),
        "platform_version": platform.version(),
        "python_full_version": platform.python_version(),
        "platform_python_implementation": platform.python_implementation(),
        "python_version": ".".join(platform.python_version_tuple()[:2]),
        "sys_platform": sys.platform,
    },
}))
"#;

/// Raw facts reported by the interpreter.
#[derive(Debug, Clone, Deserialize)]
pub struct InterpreterFacts {
    /// Pure-Python library directory (`site-packages`).
    pub purelib: PathBuf,
    /// `sys.implementation.name`, e.g. `cpython`.
    pub implementation: String,
    /// `platform.machine()`, e.g. `x86_64`.
    pub processor: String,
    /// `major.minor.micro`.
    pub python_version: String,
    /// `sys.path` without empty entries.
    pub search_path: Vec<PathBuf>,
    /// `sys.platform`, e.g. `linux`.
    pub sys_platform: String,
    /// glibc `major.minor`, when linked against glibc.
    #[serde(default)]
    pub glibc_version: Option<String>,
    /// macOS product version, on macOS.
    #[serde(default)]
    pub macos_version: Option<String>,
    /// `sys.abiflags` (empty on modern CPython).
    #[serde(default)]
    pub abiflags: String,
    /// PEP 508 marker variables.
    #[serde(default)]
    pub markers: MarkerEnvironment,
}

/// Immutable description of a target interpreter and platform.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Library directory installs and the links record go into.
    pub purelib: PathBuf,
    /// Interpreter implementation name.
    pub implementation: String,
    /// Processor architecture.
    pub processor: String,
    /// Interpreter version.
    pub python_version: Version,
    /// Directories searched for importable distributions.
    pub search_path: Vec<PathBuf>,
    /// Every wheel tag this interpreter can install.
    pub tags: TagSet,
    /// Marker variables for evaluating dependency conditions.
    pub markers: MarkerEnvironment,
}

impl Environment {
    /// Run `python` once and build the environment from what it reports.
    pub fn probe(python: &Path) -> Result<Self> {
        let command = format!("{} -c <probe>", python.display());
        let python = which::which(python).map_err(|e| Error::Process {
            command: command.clone(),
            message: e.to_string(),
        })?;
        let output = Command::new(&python)
            .arg("-c")
            .arg(PROBE_SCRIPT)
            .output()
            .map_err(|e| Error::Process {
                command: command.clone(),
                message: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(Error::Process {
                command,
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        let facts: InterpreterFacts =
            serde_json::from_slice(&output.stdout).map_err(|e| Error::Process {
                command,
                message: format!("unreadable probe output: {e}"),
            })?;
        let env = Self::from_facts(facts)?;
        debug!(
            implementation = %env.implementation,
            version = %env.python_version,
            tags = env.tags.len(),
            "probed interpreter"
        );
        Ok(env)
    }

    /// Build an environment from already-known facts.
    pub fn from_facts(facts: InterpreterFacts) -> Result<Self> {
        let python_version: Version = facts.python_version.parse()?;
        let tags = compatible_tags(&facts, &python_version);
        Ok(Self {
            purelib: facts.purelib,
            implementation: facts.implementation,
            processor: facts.processor,
            python_version,
            search_path: facts.search_path,
            tags,
            markers: facts.markers,
        })
    }

    /// `(major, minor)` of the interpreter.
    pub fn major_minor(&self) -> (u64, u64) {
        let release = self.python_version.release();
        (
            release.first().copied().unwrap_or(3),
            release.get(1).copied().unwrap_or(0),
        )
    }

    /// Directory name that partitions per-interpreter data:
    /// `<implementation>-<major>.<minor>-<processor>`.
    pub fn data_key(&self) -> String {
        let (major, minor) = self.major_minor();
        format!("{}-{major}.{minor}-{}", self.implementation, self.processor)
    }

    /// Whether any of `tags` is installable here.
    pub fn supports_any(&self, tags: &TagSet) -> bool {
        !self.tags.is_disjoint(tags)
    }
}

fn interpreter_abbreviation(implementation: &str) -> &str {
    match implementation {
        "cpython" => "cp",
        "pypy" => "pp",
        "ironpython" => "ip",
        "jython" => "jy",
        other => other,
    }
}

/// Platform tags for the probed platform, most specific first.
pub fn platform_tags(facts: &InterpreterFacts) -> Vec<String> {
    let arch = facts.processor.to_ascii_lowercase();
    if facts.sys_platform.starts_with("linux") {
        let arch = match arch.as_str() {
            "amd64" => "x86_64".to_string(),
            "arm64" => "aarch64".to_string(),
            _ => arch,
        };
        let mut tags = Vec::new();
        if let Some(minor) = facts
            .glibc_version
            .as_deref()
            .and_then(|v| v.split('.').nth(1))
            .and_then(|m| m.parse::<u32>().ok())
        {
            for glibc_minor in (5..=minor).rev() {
                tags.push(format!("manylinux_2_{glibc_minor}_{arch}"));
                match glibc_minor {
                    17 => tags.push(format!("manylinux2014_{arch}")),
                    12 => tags.push(format!("manylinux2010_{arch}")),
                    5 => tags.push(format!("manylinux1_{arch}")),
                    _ => {}
                }
            }
        }
        tags.push(format!("linux_{arch}"));
        tags
    } else if facts.sys_platform == "darwin" {
        let major = facts
            .macos_version
            .as_deref()
            .and_then(|v| v.split('.').next())
            .and_then(|m| m.parse::<u32>().ok())
            .unwrap_or(11);
        let arches = [arch.clone(), "universal2".to_string()];
        let mut tags = Vec::new();
        for macos_major in (11..=major.max(11)).rev() {
            for a in &arches {
                tags.push(format!("macosx_{macos_major}_0_{a}"));
            }
        }
        if arch == "x86_64" {
            for minor in (4..=16).rev() {
                for a in &arches {
                    tags.push(format!("macosx_10_{minor}_{a}"));
                }
            }
        }
        tags
    } else if facts.sys_platform == "win32" {
        match arch.as_str() {
            "amd64" | "x86_64" => vec!["win_amd64".to_string()],
            "arm64" => vec!["win_arm64".to_string()],
            _ => vec!["win32".to_string()],
        }
    } else {
        vec![format!("{}_{arch}", facts.sys_platform.replace(['.', '-'], "_"))]
    }
}

/// Every tag the interpreter can install: interpreter-specific tags,
/// stable-ABI tags, then generic `py3` tags and `any`.
pub fn compatible_tags(facts: &InterpreterFacts, python_version: &Version) -> TagSet {
    let release = python_version.release();
    let major = release.first().copied().unwrap_or(3);
    let minor = release.get(1).copied().unwrap_or(0);
    let platforms = platform_tags(facts);
    let abbrev = interpreter_abbreviation(&facts.implementation);
    let interpreter = format!("{abbrev}{major}{minor}");

    let mut tags = TagSet::new();
    let mut add = |interp: &str, abi: &str, platform: &str| {
        tags.insert(Tag::new(interp, abi, platform));
    };

    if facts.implementation == "cpython" {
        let abi = format!("cp{major}{minor}{}", facts.abiflags);
        for platform in &platforms {
            add(&interpreter, &abi, platform);
            add(&interpreter, "abi3", platform);
            add(&interpreter, "none", platform);
            for older in (2..minor).rev() {
                add(&format!("cp{major}{older}"), "abi3", platform);
            }
        }
    } else {
        for platform in &platforms {
            add(&interpreter, "none", platform);
        }
    }

    for platform in &platforms {
        add(&format!("py{major}{minor}"), "none", platform);
        add(&format!("py{major}"), "none", platform);
        for older in (0..minor).rev() {
            add(&format!("py{major}{older}"), "none", platform);
        }
    }

    add(&interpreter, "none", "any");
    add(&format!("py{major}{minor}"), "none", "any");
    add(&format!("py{major}"), "none", "any");
    for older in (0..minor).rev() {
        add(&format!("py{major}{older}"), "none", "any");
    }
    tags
}
