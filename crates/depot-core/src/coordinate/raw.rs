//! Raw layout: any safe relative path is its own coordinate.

use super::{check_safe_path, Coordinate, Layout};
use crate::error::Result;

/// Parse a raw path.
pub fn parse(path: &str) -> Result<Coordinate> {
    check_safe_path(Layout::Raw, path)?;
    Ok(Coordinate::from_parts(
        Layout::Raw,
        vec![("path".to_string(), path.to_string())],
        path.to_string(),
        path.to_string(),
    ))
}
