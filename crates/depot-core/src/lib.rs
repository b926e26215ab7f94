//! Core data model for the depot artifact resolution engine.
//!
//! Everything here is pure: parsing layout-specific artifact paths into
//! [`Coordinate`]s, describing repositories, and the records the engine keeps
//! about each artifact it has seen.
//!
//! # Layouts
//!
//! - **npm**: `[@scope/]name/-/name-version.tgz`
//! - **maven2**: `group/path/artifactId/version/artifactId-version[-classifier].ext`
//! - **raw**: any safe relative path
//!
//! Every coordinate derives a storage path that is unique per coordinate and
//! never escapes the storage root.

pub mod coordinate;
pub mod entry;
pub mod error;
pub mod integrity;
pub mod repository;
pub mod search;

// Re-exports for convenience.
pub use coordinate::{Coordinate, Layout};
pub use entry::ArtifactEntry;
pub use error::{CoreError, Result};
pub use integrity::{Checksum, ChecksumBuilder};
pub use repository::{Repository, RepositoryKey, RepositoryKind};
pub use search::SearchResult;
