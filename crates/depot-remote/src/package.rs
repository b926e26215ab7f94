//! npm package documents.
//!
//! `GET <registry>/<name>` answers a JSON document describing every
//! published version of a package. Scoped names travel with an encoded
//! slash: `@types%2Fnode`. The document is handed back byte for byte; only
//! the name and the version keys are read.

use std::collections::BTreeMap;

use serde::de::IgnoredAny;
use serde::Deserialize;

/// A package document as served by the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    pub name: String,
    /// Published versions, in ascending string order.
    pub versions: Vec<String>,
    /// The upstream response body, unmodified.
    pub document: Vec<u8>,
}

#[derive(Deserialize)]
struct Packument {
    name: String,
    #[serde(default)]
    versions: BTreeMap<String, IgnoredAny>,
}

/// URL of the package document for `package_name` under `base`.
pub fn package_url(base: &str, package_name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), package_name.replacen('/', "%2F", 1))
}

/// Read the name and versions out of a package document.
pub fn parse_document(body: Vec<u8>) -> Result<PackageMetadata, serde_json::Error> {
    let packument: Packument = serde_json::from_slice(&body)?;
    Ok(PackageMetadata {
        name: packument.name,
        versions: packument.versions.into_keys().collect(),
        document: body,
    })
}
