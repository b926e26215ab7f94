//! `depot init`: write a starter configuration.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::config::{DepotConfig, CONFIG_FILE};

pub fn run(dir: &Path) -> Result<()> {
    let path = dir.join(CONFIG_FILE);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    std::fs::write(&path, DepotConfig::template()).with_context(|| format!("writing {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}
