//! Per-request cycle detection.

use depot_core::RepositoryKey;

use crate::error::{ResolutionError, Result};

/// The chain of repositories a request has passed through.
///
/// Only ancestors count: two group members sharing a sub-member is a
/// diamond, not a cycle, because each branch carries its own path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionPath {
    chain: Vec<RepositoryKey>,
}

impl ResolutionPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descend into `key`, failing if it is already an ancestor.
    pub fn enter(&self, key: &RepositoryKey) -> Result<ResolutionPath> {
        let mut chain = self.chain.clone();
        chain.push(key.clone());
        if self.chain.contains(key) {
            return Err(ResolutionError::ConfigurationCycle { chain });
        }
        Ok(ResolutionPath { chain })
    }

    pub fn chain(&self) -> &[RepositoryKey] {
        &self.chain
    }
}
