//! Maven 2 repository coordinates.
//!
//! ```text
//! org/apache/commons/commons-lang3/3.12.0/commons-lang3-3.12.0.jar
//! org/apache/commons/commons-lang3/3.12.0/commons-lang3-3.12.0-sources.jar
//! ```
//!
//! Storage and remote paths are the request path itself. Timestamped
//! snapshot file names and repository metadata files are not part of this
//! grammar; use a raw repository for those.

use super::{check_safe_path, malformed, Coordinate, Layout};
use crate::error::Result;

/// Parse a Maven 2 artifact path.
pub fn parse(path: &str) -> Result<Coordinate> {
    check_safe_path(Layout::Maven2, path)?;
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 4 {
        return Err(malformed(
            Layout::Maven2,
            path,
            "expected <group>/<artifactId>/<version>/<file>",
        ));
    }

    let n = segments.len();
    let file = segments[n - 1];
    let version = segments[n - 2];
    let artifact_id = segments[n - 3];
    let group_id = segments[..n - 3].join(".");

    let rest = file
        .strip_prefix(artifact_id)
        .and_then(|r| r.strip_prefix('-'))
        .and_then(|r| r.strip_prefix(version))
        .ok_or_else(|| {
            malformed(
                Layout::Maven2,
                path,
                format!("file name must start with {artifact_id}-{version}"),
            )
        })?;

    let (classifier, extension) = if let Some(ext) = rest.strip_prefix('.') {
        (None, ext)
    } else if let Some(tail) = rest.strip_prefix('-') {
        match tail.split_once('.') {
            Some((classifier, ext)) if !classifier.is_empty() => (Some(classifier), ext),
            _ => {
                return Err(malformed(
                    Layout::Maven2,
                    path,
                    "classifier must be followed by an extension",
                ))
            }
        }
    } else {
        return Err(malformed(Layout::Maven2, path, "missing extension"));
    };

    if extension.is_empty() {
        return Err(malformed(Layout::Maven2, path, "missing extension"));
    }

    let mut fields = vec![
        ("groupId".to_string(), group_id),
        ("artifactId".to_string(), artifact_id.to_string()),
        ("version".to_string(), version.to_string()),
    ];
    if let Some(c) = classifier {
        fields.push(("classifier".to_string(), c.to_string()));
    }
    fields.push(("extension".to_string(), extension.to_string()));

    Ok(Coordinate::from_parts(
        Layout::Maven2,
        fields,
        path.to_string(),
        path.to_string(),
    ))
}
