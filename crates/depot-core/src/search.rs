//! Search result records.

use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;

/// One hit returned by a repository search.
///
/// Results are de-duplicated by coordinate identity; the repository that
/// reported the first occurrence is the one kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub coordinate: Coordinate,
    pub repository_id: String,
    /// Name as reported by the source, casing untouched.
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the artifact's bytes were cached when the search ran.
    pub cached: bool,
}
