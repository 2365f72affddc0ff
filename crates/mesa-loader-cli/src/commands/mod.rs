//! Subcommand implementations

pub mod activate;
pub mod clean;
pub mod info;
pub mod list;
pub mod materialize;
pub mod resolve;

use anyhow::Context;
use clap::Args;
use mesa_loader::{ActivationError, Bundle, LoaderConfig};
use std::path::{Path, PathBuf};

/// Options shared by the commands that pick a variant
#[derive(Args, Debug, Clone)]
pub struct VariantArgs {
    /// Gallium driver (llvmpipe, d3d12, zink) [env: MESA_LOADER_DRIVER]
    #[arg(long)]
    pub driver: Option<String>,

    /// Architecture instead of the host's [env: MESA_LOADER_ARCH]
    #[arg(long)]
    pub arch: Option<String>,

    /// Cache root for extracted libraries [env: MESA_LOADER_CACHE_DIR]
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Read an unpacked bundle directory instead of the embedded one
    #[arg(long)]
    pub bundle_dir: Option<PathBuf>,

    /// Resolve on hosts other than Windows
    #[arg(long)]
    pub foreign_os: bool,
}

impl VariantArgs {
    /// Environment configuration with the command-line flags applied on top
    pub fn config(&self) -> Result<LoaderConfig, ActivationError> {
        let mut config = LoaderConfig::from_env()?;

        if let Some(driver) = &self.driver {
            config = config.with_driver(driver.parse()?);
        }
        if let Some(arch) = &self.arch {
            config = config.with_arch(arch.parse()?);
        }
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_root(dir);
        }
        if self.foreign_os {
            config = config.allow_foreign_os(true);
        }

        Ok(config)
    }

    /// Like [`load_bundle`], keeping the error's status code
    pub fn bundle(&self) -> Result<Bundle, ActivationError> {
        let bundle = match &self.bundle_dir {
            Some(dir) => Bundle::from_dir(dir)?,
            None => Bundle::embedded()?,
        };
        Ok(bundle)
    }
}

/// The bundle in `dir`, or the embedded one
pub fn load_bundle(dir: Option<&Path>) -> anyhow::Result<Bundle> {
    match dir {
        Some(dir) => Bundle::from_dir(dir)
            .with_context(|| format!("Failed to read bundle directory {}", dir.display())),
        None => Bundle::embedded().context("Embedded bundle is corrupt"),
    }
}
