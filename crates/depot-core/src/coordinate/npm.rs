//! npm package tarball coordinates.
//!
//! Request paths follow the registry tarball convention:
//! ```text
//! compression/-/compression-1.7.2.tgz
//! @babel/core/-/core-7.0.0.tgz
//! ```
//! Stored artifacts are laid out by package and version:
//! ```text
//! compression/compression/1.7.2/compression-1.7.2.tgz
//! @babel/core/7.0.0/core-7.0.0.tgz
//! ```

use super::{check_safe_path, malformed, Coordinate, Layout};
use crate::error::Result;

const EXTENSION: &str = "tgz";

/// Parse a tarball request path.
pub fn parse(path: &str) -> Result<Coordinate> {
    check_safe_path(Layout::Npm, path)?;
    let segments: Vec<&str> = path.split('/').collect();

    let (scope, name, file) = match segments.as_slice() {
        [name, "-", file] => (None, *name, *file),
        [scope, name, "-", file] => (Some(*scope), *name, *file),
        _ => {
            return Err(malformed(
                Layout::Npm,
                path,
                "expected [@scope/]<name>/-/<name>-<version>.tgz",
            ))
        }
    };

    let version = file
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.strip_suffix(&format!(".{EXTENSION}")))
        .ok_or_else(|| {
            malformed(
                Layout::Npm,
                path,
                format!("tarball name must be {name}-<version>.{EXTENSION}"),
            )
        })?;

    if version.is_empty() {
        return Err(malformed(Layout::Npm, path, "missing version segment"));
    }

    build(scope, name, version).map_err(|_| malformed(Layout::Npm, path, "invalid package name or version"))
}

/// Build a coordinate from scope, name and version.
pub fn build(scope: Option<&str>, name: &str, version: &str) -> Result<Coordinate> {
    let display = match scope {
        Some(s) => format!("{s}/{name}@{version}"),
        None => format!("{name}@{version}"),
    };

    check_name(scope, name, &display)?;
    semver::Version::parse(version).map_err(|e| {
        malformed(
            Layout::Npm,
            &display,
            format!("invalid version '{version}': {e}"),
        )
    })?;

    let file = format!("{name}-{version}.{EXTENSION}");
    let (path, remote_path) = match scope {
        Some(s) => (
            format!("{s}/{name}/{version}/{file}"),
            format!("{s}/{name}/-/{file}"),
        ),
        None => (
            format!("{name}/{name}/{version}/{file}"),
            format!("{name}/-/{file}"),
        ),
    };
    check_safe_path(Layout::Npm, &path)?;

    let mut fields = Vec::with_capacity(4);
    if let Some(s) = scope {
        fields.push(("scope".to_string(), s.to_string()));
    }
    fields.push(("name".to_string(), name.to_string()));
    fields.push(("version".to_string(), version.to_string()));
    fields.push(("extension".to_string(), EXTENSION.to_string()));

    Ok(Coordinate::from_parts(Layout::Npm, fields, path, remote_path))
}

fn check_name(scope: Option<&str>, name: &str, display: &str) -> Result<()> {
    if let Some(s) = scope {
        if !s.starts_with('@') || s.len() < 2 || s.contains('/') {
            return Err(malformed(Layout::Npm, display, "scope must look like @scope"));
        }
    }
    if name.is_empty() || name.starts_with(['@', '.', '_']) || name.contains('/') {
        return Err(malformed(Layout::Npm, display, "invalid package name"));
    }
    Ok(())
}

/// Split a full package name such as `@types/node` into scope and name,
/// validating both.
pub fn split_package_name(package_name: &str) -> Result<(Option<&str>, &str)> {
    let (scope, name) = match package_name.split_once('/') {
        Some((scope, name)) => (Some(scope), name),
        None => (None, package_name),
    };
    check_name(scope, name, package_name)?;
    Ok((scope, name))
}

/// Build a coordinate from a full package name such as `@types/node`.
pub fn from_package(package_name: &str, version: &str) -> Result<Coordinate> {
    match package_name.split_once('/') {
        Some((scope, name)) => build(Some(scope), name, version),
        None => build(None, package_name, version),
    }
}
