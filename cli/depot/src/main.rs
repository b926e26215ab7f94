//! depot CLI: resolve, search, view and deploy artifacts through configured repositories.

mod commands;
mod config;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use depot_resolve::Depot;
use tracing_subscriber::EnvFilter;

use config::DepotConfig;

#[derive(Parser)]
#[command(name = "depot", version, about = "Artifact repository resolution engine")]
struct Cli {
    /// Path to depot.toml (default: search upward from the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log engine activity (debug level unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter depot.toml into the current directory
    Init,
    /// Resolve an artifact, fetching it from upstream if needed
    Resolve {
        /// Repository id or <storage>:<id>
        repository: String,
        /// Artifact path in the repository's layout
        path: String,
        /// Copy the artifact's bytes to this file
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Print the artifact entry as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search a repository by name
    Search {
        /// Repository id or <storage>:<id>
        repository: String,
        /// Text to search for
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 20)]
        size: usize,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload a file into a hosted repository
    Deploy {
        /// Repository id or <storage>:<id>
        repository: String,
        /// Artifact path in the repository's layout
        path: String,
        /// File to upload
        file: PathBuf,
    },
    /// Check a cached artifact against its recorded checksum
    Verify {
        /// Repository id or <storage>:<id>
        repository: String,
        /// Artifact path in the repository's layout
        path: String,
    },
    /// Show an npm package document through a proxy repository
    View {
        /// Repository id or <storage>:<id>
        repository: String,
        /// Package name, e.g. react or @types/node
        package: String,
        /// Print only the published versions
        #[arg(long)]
        versions: bool,
    },
    /// List configured repositories
    Repos,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;

    if matches!(cli.command, Commands::Init) {
        return commands::init::run(&cwd);
    }

    let (config, base_dir) = load_config(&cwd, cli.config.as_deref())?;
    tracing::debug!(base_dir = %base_dir.display(), repositories = config.repositories.len(), "loaded configuration");

    if matches!(cli.command, Commands::Repos) {
        commands::repos::run(&config);
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let depot = commands::open_depot(&config, &base_dir)?;
    runtime.block_on(dispatch(cli.command, &config, &depot))
}

async fn dispatch(command: Commands, config: &DepotConfig, depot: &Depot) -> anyhow::Result<()> {
    match command {
        Commands::Resolve {
            repository,
            path,
            output,
            json,
        } => {
            let key = config.repository_key(&repository)?;
            commands::resolve::run(depot, &key, &path, output.as_deref(), json).await
        }
        Commands::Search {
            repository,
            query,
            size,
            json,
        } => {
            let key = config.repository_key(&repository)?;
            commands::search::run(depot, &key, &query, size, json).await
        }
        Commands::Deploy { repository, path, file } => {
            let key = config.repository_key(&repository)?;
            commands::deploy::run(depot, &key, &path, &file).await
        }
        Commands::Verify { repository, path } => {
            let key = config.repository_key(&repository)?;
            commands::verify::run(depot, &key, &path).await
        }
        Commands::View {
            repository,
            package,
            versions,
        } => {
            let key = config.repository_key(&repository)?;
            commands::view::run(depot, &key, &package, versions).await
        }
        Commands::Init | Commands::Repos => Ok(()),
    }
}

/// Load the config named by `--config`, or search upward from `cwd`.
///
/// Returns the config and the directory relative paths are anchored at.
fn load_config(cwd: &Path, explicit: Option<&Path>) -> anyhow::Result<(DepotConfig, PathBuf)> {
    if let Some(path) = explicit {
        let config = DepotConfig::load(path)?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());
        return Ok((config, base));
    }
    match DepotConfig::find_and_load(cwd)? {
        Some(found) => Ok(found),
        None => anyhow::bail!("no {} found (run `depot init` first)", config::CONFIG_FILE),
    }
}
