//! Repository configuration lookup.

use std::collections::HashMap;

use depot_core::{Repository, RepositoryKey};

/// Source of repository configuration.
pub trait RepositoryProvider: Send + Sync {
    /// Look up one repository.
    fn repository(&self, key: &RepositoryKey) -> Option<Repository>;

    /// All configured repositories, in configuration order.
    fn repositories(&self) -> Vec<Repository>;
}

/// A fixed set of repositories, typically loaded from a config file.
#[derive(Debug, Clone, Default)]
pub struct StaticRepositories {
    repositories: Vec<Repository>,
    index: HashMap<RepositoryKey, usize>,
}

impl StaticRepositories {
    /// Later definitions of the same key replace earlier ones.
    pub fn new(repositories: impl IntoIterator<Item = Repository>) -> Self {
        let mut provider = StaticRepositories::default();
        for repository in repositories {
            provider.insert(repository);
        }
        provider
    }

    pub fn insert(&mut self, repository: Repository) {
        let key = repository.key();
        match self.index.get(&key) {
            Some(&i) => self.repositories[i] = repository,
            None => {
                self.index.insert(key, self.repositories.len());
                self.repositories.push(repository);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

impl RepositoryProvider for StaticRepositories {
    fn repository(&self, key: &RepositoryKey) -> Option<Repository> {
        self.index.get(key).map(|&i| self.repositories[i].clone())
    }

    fn repositories(&self) -> Vec<Repository> {
        self.repositories.clone()
    }
}
