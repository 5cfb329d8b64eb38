//! Filesystem and network I/O: archive extraction and artifact downloads.

pub mod download;
pub mod extract;
