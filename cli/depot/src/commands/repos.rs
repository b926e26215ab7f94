//! `depot repos`: list configured repositories.

use depot_core::{Repository, RepositoryKind};

use crate::config::DepotConfig;

pub fn run(config: &DepotConfig) {
    if config.repositories.is_empty() {
        println!("No repositories configured.");
        return;
    }
    for repo in &config.repositories {
        println!("{}", describe(repo));
    }
}

fn describe(repo: &Repository) -> String {
    let detail = match &repo.kind {
        RepositoryKind::Hosted => String::new(),
        RepositoryKind::Proxy { url } => format!("  -> {url}"),
        RepositoryKind::Group { members } => format!("  [{}]", members.join(", ")),
    };
    format!(
        "{:<32} {:<6} {:<7}{detail}",
        repo.key().to_string(),
        repo.kind_name(),
        repo.layout.as_str()
    )
}
