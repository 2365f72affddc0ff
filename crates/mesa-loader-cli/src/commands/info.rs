//! `mesa-loader info` — Display versions, platform and configuration.

use mesa_loader::config::{
    default_cache_root, ARCH_VAR, CACHE_DIR_VAR, DRIVER_VAR, FOREIGN_OS_VAR, LOG_VAR,
};
use mesa_loader::{Bundle, LoaderConfig};

pub fn execute() -> anyhow::Result<()> {
    let bundle = Bundle::embedded()?;

    // Versions
    println!("mesa-loader v{}", env!("CARGO_PKG_VERSION"));
    println!("Mesa3D:       {}", bundle.version().mesa);
    println!("Bundle:       {} files for {}", bundle.file_count(), bundle.target_os());
    println!();

    // Platform
    println!("Platform:     {} ({})", std::env::consts::OS, std::env::consts::ARCH);

    // Cache
    let cache_root = LoaderConfig::from_env()
        .map(|config| config.cache_root)
        .unwrap_or_else(|_| default_cache_root());
    println!("Cache:        {}", cache_root.display());

    // Environment
    println!();
    println!("Environment:");
    for var in [DRIVER_VAR, ARCH_VAR, CACHE_DIR_VAR, FOREIGN_OS_VAR, LOG_VAR] {
        print_env(var);
    }

    Ok(())
}

fn print_env(var: &str) {
    match std::env::var(var) {
        Ok(val) => println!("  {} = {}", var, val),
        Err(_) => println!("  {} = (default)", var),
    }
}
