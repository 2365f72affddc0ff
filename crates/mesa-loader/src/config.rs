//! Loader configuration
//!
//! Built from environment variables, with builder methods for programmatic
//! use. Empty variables count as unset.

use std::path::PathBuf;
use thiserror::Error;

use crate::platform::{Arch, Driver};

/// Gallium driver to use (`llvmpipe`, `d3d12`, `zink`)
pub const DRIVER_VAR: &str = "MESA_LOADER_DRIVER";
/// Force an architecture instead of the host's
pub const ARCH_VAR: &str = "MESA_LOADER_ARCH";
/// Cache root for extracted libraries
pub const CACHE_DIR_VAR: &str = "MESA_LOADER_CACHE_DIR";
/// `1`/`true` to resolve on hosts other than Windows
pub const FOREIGN_OS_VAR: &str = "MESA_LOADER_ALLOW_FOREIGN_OS";
/// Log filter, `tracing-subscriber` syntax
pub const LOG_VAR: &str = "MESA_LOADER_LOG";

/// Errors that can occur while reading configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// `None` means the default driver
    pub driver: Option<Driver>,
    /// `None` means the host architecture
    pub arch: Option<Arch>,
    pub cache_root: PathBuf,
    pub allow_foreign_os: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            driver: None,
            arch: None,
            cache_root: default_cache_root(),
            allow_foreign_os: false,
        }
    }
}

impl LoaderConfig {
    /// Read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let invalid = |var: &'static str, value: String| ConfigError::InvalidValue { var, value };

        let mut config = Self::default();

        if let Some(value) = get(DRIVER_VAR) {
            config.driver = Some(value.parse().map_err(|_| invalid(DRIVER_VAR, value))?);
        }

        if let Some(value) = get(ARCH_VAR) {
            config.arch = Some(Arch::from_alias(&value).ok_or_else(|| invalid(ARCH_VAR, value))?);
        }

        if let Some(value) = get(CACHE_DIR_VAR) {
            config.cache_root = PathBuf::from(value);
        }

        if let Some(value) = get(FOREIGN_OS_VAR) {
            config.allow_foreign_os = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid(FOREIGN_OS_VAR, value)),
            };
        }

        Ok(config)
    }

    pub fn with_driver(mut self, driver: Driver) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = Some(arch);
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    pub fn allow_foreign_os(mut self, allow: bool) -> Self {
        self.allow_foreign_os = allow;
        self
    }
}

/// `<user cache dir>/mesa-loader`, or `<temp dir>/mesa-loader` when the
/// platform has no cache directory.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("mesa-loader")
}
