//! `mesa-loader clean` — Remove extracted libraries.

use mesa_loader::{LoaderConfig, Materializer};
use std::path::PathBuf;

pub fn execute(cache_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let root = match cache_dir {
        Some(dir) => dir,
        None => LoaderConfig::from_env()?.cache_root,
    };

    if !root.exists() {
        println!("No cache directory found.");
        return Ok(());
    }

    Materializer::new(&root).clear()?;
    println!("Removed {}", root.display());
    Ok(())
}
