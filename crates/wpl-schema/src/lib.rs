//! Shared data model for wpl.
//!
//! Everything in this crate is pure: parsing and comparison of package
//! names, PEP 440 versions, version specifiers, PEP 508 requirements and
//! environment markers, wheel compatibility tags, and the header block of
//! core metadata files. No filesystem or network access happens here.

pub mod marker;
pub mod metadata;
pub mod name;
pub mod requirement;
pub mod specifier;
pub mod tags;
pub mod version;

// Re-exports
pub use marker::{Marker, MarkerEnvironment, MarkerError};
pub use metadata::{Metadata, MetadataError};
pub use name::{ProjectKey, canonicalize};
pub use requirement::{Requirement, RequirementError, parse_extras};
pub use specifier::{Operator, Specifier, SpecifierError, SpecifierSet};
pub use tags::{Tag, TagError, TagSet, compress_tags, parse_tag};
pub use version::{Version, VersionError};
