//! `depot.toml` parsing and validation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use depot_core::{Repository, RepositoryKey, RepositoryKind};
use depot_remote::{RetryPolicy, TransportConfig};

pub const CONFIG_FILE: &str = "depot.toml";

/// The top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepotConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

/// Where blobs and entry records live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Relative paths are taken from the config file's directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Re-hash cached blobs before serving them.
    #[serde(default)]
    pub verify_on_hit: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            root: default_root(),
            verify_on_hit: false,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".depot")
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            user_agent: None,
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay() -> u64 {
    200
}

impl RemoteConfig {
    pub fn transport(&self) -> TransportConfig {
        let mut config = TransportConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            ..TransportConfig::default()
        };
        if let Some(agent) = &self.user_agent {
            config.user_agent = agent.clone();
        }
        config
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

impl DepotConfig {
    /// Search upward from `start_dir` for a `depot.toml` file, parse and return it
    /// along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Ok(Some((Self::load(&candidate)?, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("loading {}", path.display()))
    }

    /// Parse and validate a config from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        let config: DepotConfig = toml::from_str(s).context("parsing depot.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Check repository definitions.
    ///
    /// Membership cycles are not rejected here; they surface per request.
    pub fn validate(&self) -> Result<()> {
        let mut keys = HashSet::new();
        for repo in &self.repositories {
            if !keys.insert(repo.key()) {
                bail!("repository {} is defined more than once", repo.key());
            }
        }

        for repo in &self.repositories {
            match &repo.kind {
                RepositoryKind::Hosted => {}
                RepositoryKind::Proxy { url } => {
                    let parsed = url::Url::parse(url)
                        .with_context(|| format!("repository {}: invalid url '{url}'", repo.key()))?;
                    if !matches!(parsed.scheme(), "http" | "https") {
                        bail!("repository {}: url must be http or https, got '{url}'", repo.key());
                    }
                }
                RepositoryKind::Group { .. } => {
                    let members = repo
                        .member_keys()
                        .with_context(|| format!("repository {}", repo.key()))?;
                    for member in members {
                        if !keys.contains(&member) {
                            bail!("group {} references unknown repository {member}", repo.key());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Storage root, anchored at `base_dir` when relative.
    pub fn storage_root(&self, base_dir: &Path) -> PathBuf {
        if self.storage.root.is_absolute() {
            self.storage.root.clone()
        } else {
            base_dir.join(&self.storage.root)
        }
    }

    /// Resolve a command-line repository reference.
    ///
    /// `storage:repo` is taken literally; a bare `repo` must name exactly
    /// one configured repository.
    pub fn repository_key(&self, reference: &str) -> Result<RepositoryKey> {
        if reference.contains(':') {
            let key = RepositoryKey::parse_reference(reference, "")?;
            if !self.repositories.iter().any(|r| r.key() == key) {
                bail!("unknown repository {key}");
            }
            return Ok(key);
        }

        let matches: Vec<RepositoryKey> = self
            .repositories
            .iter()
            .filter(|r| r.id == reference)
            .map(Repository::key)
            .collect();
        match matches.as_slice() {
            [key] => Ok(key.clone()),
            [] => bail!("unknown repository '{reference}'"),
            _ => bail!("repository id '{reference}' exists in several storages; use <storage>:{reference}"),
        }
    }

    /// Generate the default template for `depot init`.
    pub fn template() -> String {
        r#"[storage]
root = ".depot"
verify_on_hit = false

[remote]
connect_timeout_secs = 10
read_timeout_secs = 60
max_retries = 2
retry_base_delay_ms = 200

[[repositories]]
storage = "storage-common"
id = "npm-hosted"
layout = "npm"
type = "hosted"

[[repositories]]
storage = "storage-common"
id = "npm-proxy"
layout = "npm"
type = "proxy"
url = "https://registry.npmjs.org"

[[repositories]]
storage = "storage-common"
id = "npm-group"
layout = "npm"
type = "group"
members = ["npm-hosted", "npm-proxy"]
"#
        .to_string()
    }
}
