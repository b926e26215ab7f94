//! Storage for the depot resolution engine.
//!
//! Two stores back every repository:
//!
//! - **[`ContentStore`]**: artifact bytes on the filesystem. Writes are
//!   staged under a unique token and published with a single atomic rename,
//!   so readers observe either nothing or the complete artifact.
//! - **[`ArtifactEntryStore`]**: per-artifact metadata records (cache flag,
//!   checksum, size, timestamps). The engine consumes it through a narrow
//!   trait; [`MemoryEntryStore`] and [`FileEntryStore`] are provided.
//!
//! Layout:
//! ```text
//! <root>/
//!   .staging/<uuid>.part              # in-progress writes
//!   <storage>/<repository>/<path>     # published artifacts
//! ```

pub mod content;
pub mod entries;
pub mod error;

// Re-exports for convenience.
pub use content::{ContentStore, Published, WriteHandle};
pub use entries::{ArtifactEntryStore, FileEntryStore, MemoryEntryStore};
pub use error::{Result, StoreError};
