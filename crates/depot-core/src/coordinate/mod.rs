//! Layout-aware artifact coordinates.
//!
//! A [`Coordinate`] is the canonical identity of an artifact inside a
//! repository. It is derived from a raw request path by the layout's grammar
//! and carries:
//!
//! - the ordered semantic fields the layout extracted (name, version, ...),
//! - the *storage path*, used as the content store and entry store key,
//! - the *remote path*, the path requested from an upstream registry.
//!
//! Two coordinates are equal iff their storage paths are equal.

pub mod maven;
pub mod npm;
pub mod raw;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A repository layout: the grammar that maps paths to coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// npm registry layout (`name/-/name-version.tgz`).
    Npm,
    /// Maven 2 repository layout.
    Maven2,
    /// Opaque relative paths.
    Raw,
}

impl Layout {
    /// Return the identifier used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Npm => "npm",
            Layout::Maven2 => "maven2",
            Layout::Raw => "raw",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layout {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "npm" => Ok(Layout::Npm),
            "maven2" | "maven" => Ok(Layout::Maven2),
            "raw" => Ok(Layout::Raw),
            other => Err(CoreError::UnknownLayout(other.to_string())),
        }
    }
}

/// A canonical, comparable artifact identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordinate {
    layout: Layout,
    fields: Vec<(String, String)>,
    path: String,
    remote_path: String,
}

impl Coordinate {
    /// Parse a raw request path according to `layout`.
    ///
    /// Leading slashes are ignored. Fails with
    /// [`CoreError::MalformedCoordinate`] when the path does not match the
    /// layout's grammar.
    pub fn parse(layout: Layout, raw_path: &str) -> Result<Self> {
        let trimmed = raw_path.trim_start_matches('/');
        match layout {
            Layout::Npm => npm::parse(trimmed),
            Layout::Maven2 => maven::parse(trimmed),
            Layout::Raw => raw::parse(trimmed),
        }
    }

    /// Build an npm package tarball coordinate from its parts.
    pub fn npm(scope: Option<&str>, name: &str, version: &str) -> Result<Self> {
        npm::build(scope, name, version)
    }

    /// Layout this coordinate belongs to.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// The storage path: the lookup key inside a repository.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path to request from an upstream registry.
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Ordered semantic fields extracted by the layout.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Look up a semantic field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The artifact name (npm `name`, maven `artifactId`, raw file name).
    pub fn name(&self) -> &str {
        self.field("name")
            .or_else(|| self.field("artifactId"))
            .unwrap_or_else(|| self.path.rsplit('/').next().unwrap_or(&self.path))
    }

    /// The artifact version, when the layout has one.
    pub fn version(&self) -> Option<&str> {
        self.field("version")
    }

    pub(crate) fn from_parts(
        layout: Layout,
        fields: Vec<(String, String)>,
        path: String,
        remote_path: String,
    ) -> Self {
        Coordinate {
            layout,
            fields,
            path,
            remote_path,
        }
    }
}

/// Deterministic mapping from a coordinate to its storage path.
pub fn to_storage_path(coordinate: &Coordinate) -> &str {
    coordinate.path()
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for Coordinate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Coordinate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.cmp(&other.path)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.layout, self.path)
    }
}

/// Build a `MalformedCoordinate` error.
pub(crate) fn malformed(layout: Layout, path: &str, detail: impl Into<String>) -> CoreError {
    CoreError::MalformedCoordinate {
        layout: layout.to_string(),
        path: path.to_string(),
        detail: detail.into(),
    }
}

/// Reject paths that could escape a storage root or alias another path.
pub(crate) fn check_safe_path(layout: Layout, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(malformed(layout, path, "empty path"));
    }
    if path.contains('\\') || path.contains('\0') {
        return Err(malformed(layout, path, "path contains a forbidden character"));
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(malformed(
                layout,
                path,
                format!("invalid path segment '{segment}'"),
            ));
        }
    }
    Ok(())
}
