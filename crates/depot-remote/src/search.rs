//! Upstream search APIs.
//!
//! Only the npm layout defines one: `GET /-/v1/search?text=<q>&size=<n>`.
//! Results are passed through in upstream order and casing; ranking and
//! case handling are the upstream's business.

use serde::Deserialize;

use depot_core::Layout;

/// A package reported by an upstream search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePackage {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
struct NpmSearchResponse {
    #[serde(default)]
    objects: Vec<NpmSearchObject>,
}

#[derive(Deserialize)]
struct NpmSearchObject {
    package: NpmPackage,
}

#[derive(Deserialize)]
struct NpmPackage {
    name: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
}

/// Build the search URL for `layout`, or `None` if it has no search API.
pub fn search_url(base: &str, layout: Layout, query: &str, size: usize) -> Option<String> {
    match layout {
        Layout::Npm => {
            let mut url = url::Url::parse(&format!("{}/-/v1/search", base.trim_end_matches('/'))).ok()?;
            url.query_pairs_mut()
                .append_pair("text", query)
                .append_pair("size", &size.to_string());
            Some(url.into())
        }
        Layout::Maven2 | Layout::Raw => None,
    }
}

/// Parse an upstream search response body.
pub fn parse_response(layout: Layout, body: &[u8]) -> Result<Vec<RemotePackage>, serde_json::Error> {
    match layout {
        Layout::Npm => {
            let response: NpmSearchResponse = serde_json::from_slice(body)?;
            Ok(response
                .objects
                .into_iter()
                .map(|o| RemotePackage {
                    name: o.package.name,
                    version: o.package.version,
                    description: o.package.description,
                })
                .collect())
        }
        Layout::Maven2 | Layout::Raw => Ok(Vec::new()),
    }
}
