//! Error type shared by every wpl-core operation.

use std::path::PathBuf;

use thiserror::Error;
use wpl_schema::{MetadataError, RequirementError, VersionError};

use crate::io::download::DownloadError;
use crate::io::extract::ExtractError;

/// Everything that can go wrong while resolving or installing.
#[derive(Error, Debug)]
pub enum Error {
    /// The request itself is wrong: ambiguous direct references, editable
    /// installs without a reference, unparsable requirement strings.
    #[error("usage error: {0}")]
    Usage(String),

    /// A candidate's metadata could not be fetched or built.
    #[error("metadata unavailable for {0}")]
    MetadataUnavailable(String),

    /// A source tree could not be turned into a wheel.
    #[error("build failed for {}: {reason}", path.display())]
    BuildFailure {
        /// Source tree or archive that was being built.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The resolver proved there is no consistent assignment.
    #[error("no solution:\n{0}")]
    ResolutionImpossible(String),

    /// Index query failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Artifact download failure.
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive could not be read or unpacked.
    #[error("Archive error: {0}")]
    Extract(#[from] ExtractError),

    /// An external process (interpreter, pip) failed.
    #[error("`{command}` failed: {message}")]
    Process {
        /// The command line that was run.
        command: String,
        /// Exit status and captured stderr.
        message: String,
    },

    /// A requirement string did not parse.
    #[error(transparent)]
    Requirement(#[from] RequirementError),

    /// Core metadata was malformed.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// A version string did not parse.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Configuration file could not be read.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal resolver failure other than "no solution".
    #[error("resolver error: {0}")]
    Solver(String),

    /// Free-form failure with a context label.
    #[error("{context}: {message}")]
    Context {
        /// Which operation failed.
        context: &'static str,
        /// Details.
        message: String,
    },
}

impl Error {
    /// Create an error with context for better debugging.
    pub fn context(ctx: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::Context {
            context: ctx,
            message: msg.to_string(),
        }
    }

    /// Whether this error should be reported as a usage error (exit code 2).
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_) | Self::Requirement(_))
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::context("pattern", err)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
