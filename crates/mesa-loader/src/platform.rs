//! Host platform detection and variant resolution
//!
//! The embedded bundle is laid out by `(arch, driver)`. This module maps the
//! running process onto one of those keys.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::bundle::Bundle;
use crate::config::LoaderConfig;

/// Operating system the bundled Mesa3D libraries are built for
pub const TARGET_OS: &str = "windows";

/// Errors that can occur while picking a variant
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Host operating system is not the bundle's target
    #[error("Unsupported operating system: {0}")]
    UnsupportedOs(String),

    /// Architecture name not recognized
    #[error("Unsupported architecture: {0}")]
    UnsupportedArch(String),

    /// Driver name not recognized
    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    /// No embedded files for the resolved key
    #[error("No embedded libraries for {0}")]
    NoBundle(VariantKey),
}

/// CPU architecture of a bundle variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86,
    X64,
    Arm64,
}

impl Arch {
    pub const ALL: [Arch; 3] = [Arch::X86, Arch::X64, Arch::Arm64];

    /// Directory name used in the bundle layout
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
        }
    }

    /// Normalize any of the common spellings of an architecture
    /// (`amd64`, `x86_64`, `i686`, `aarch64`, ...).
    pub fn from_alias(name: &str) -> Option<Arch> {
        match name.trim().to_ascii_lowercase().as_str() {
            "x8664" | "x86-64" | "x86_64" | "amd64" | "ia32e" | "em64t" | "x64" => Some(Arch::X64),
            "x8632" | "x86-32" | "x86_32" | "x86" | "i86pc" | "i386" | "i486" | "i586"
            | "i686" | "ia32" | "x32" => Some(Arch::X86),
            "aarch64" | "arm64" | "armv9" | "armv8" => Some(Arch::Arm64),
            _ => None,
        }
    }
}

impl FromStr for Arch {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Arch::from_alias(s).ok_or_else(|| ResolveError::UnsupportedArch(s.to_string()))
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gallium driver backend of a bundle variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[default]
    Llvmpipe,
    D3d12,
    Zink,
}

impl Driver {
    pub const ALL: [Driver; 3] = [Driver::Llvmpipe, Driver::D3d12, Driver::Zink];

    /// Directory name used in the bundle layout
    pub fn as_str(self) -> &'static str {
        match self {
            Driver::Llvmpipe => "llvmpipe",
            Driver::D3d12 => "d3d12",
            Driver::Zink => "zink",
        }
    }

    /// Libraries bound explicitly, in order. Their own dependencies
    /// (`libglapi.dll`, `libgallium_wgl.dll`) are resolved by the OS loader
    /// from the same directory.
    pub fn primary_libraries(self) -> &'static [&'static str] {
        match self {
            Driver::D3d12 => &["dxil.dll", "opengl32.dll"],
            Driver::Llvmpipe | Driver::Zink => &["opengl32.dll"],
        }
    }
}

impl FromStr for Driver {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llvmpipe" => Ok(Driver::Llvmpipe),
            "d3d12" => Ok(Driver::D3d12),
            "zink" => Ok(Driver::Zink),
            _ => Err(ResolveError::UnknownDriver(s.to_string())),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which bundle applies to the current process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VariantKey {
    pub arch: Arch,
    pub driver: Driver,
}

impl VariantKey {
    pub fn new(arch: Arch, driver: Driver) -> Self {
        Self { arch, driver }
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.arch, self.driver)
    }
}

/// Operating system and architecture names as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: String,
    pub arch: String,
}

impl HostPlatform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this process was compiled for
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }
}

/// Pick the variant for `host`.
///
/// Pure function of its inputs; nothing is written to disk. The driver
/// defaults to `llvmpipe` and the architecture to the host's unless the
/// configuration overrides them.
pub fn resolve_variant(
    bundle: &Bundle,
    host: &HostPlatform,
    config: &LoaderConfig,
) -> Result<VariantKey, ResolveError> {
    if !config.allow_foreign_os && !host.os.eq_ignore_ascii_case(bundle.target_os()) {
        return Err(ResolveError::UnsupportedOs(host.os.clone()));
    }

    let arch = match config.arch {
        Some(arch) => arch,
        None => host.arch.parse()?,
    };
    let key = VariantKey::new(arch, config.driver.unwrap_or_default());

    if !bundle.contains_variant(key) {
        return Err(ResolveError::NoBundle(key));
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::BundleVersion;

    fn bundle() -> Bundle {
        let mut bundle = Bundle::new(BundleVersion::new("0.1.0", "22.3.5-msvc"));
        for arch in Arch::ALL {
            for driver in Driver::ALL {
                bundle = bundle.with_file(VariantKey::new(arch, driver), "opengl32.dll", b"gl".to_vec());
            }
        }
        bundle
    }

    #[test]
    fn test_arch_aliases() {
        assert_eq!(Arch::from_alias("amd64"), Some(Arch::X64));
        assert_eq!(Arch::from_alias("x86_64"), Some(Arch::X64));
        assert_eq!(Arch::from_alias("EM64T"), Some(Arch::X64));
        assert_eq!(Arch::from_alias("i686"), Some(Arch::X86));
        assert_eq!(Arch::from_alias("x86"), Some(Arch::X86));
        assert_eq!(Arch::from_alias("aarch64"), Some(Arch::Arm64));
        assert_eq!(Arch::from_alias("armv8"), Some(Arch::Arm64));
        assert_eq!(Arch::from_alias("riscv64"), None);
        assert_eq!(Arch::from_alias(""), None);
    }

    #[test]
    fn test_driver_parse() {
        assert_eq!("llvmpipe".parse::<Driver>(), Ok(Driver::Llvmpipe));
        assert_eq!("D3D12".parse::<Driver>(), Ok(Driver::D3d12));
        assert_eq!(" zink ".parse::<Driver>(), Ok(Driver::Zink));
        assert!(matches!(
            "softpipe".parse::<Driver>(),
            Err(ResolveError::UnknownDriver(_))
        ));
        assert_eq!(Driver::default(), Driver::Llvmpipe);
    }

    #[test]
    fn test_variant_display() {
        let key = VariantKey::new(Arch::X64, Driver::D3d12);
        assert_eq!(key.to_string(), "x64/d3d12");
    }

    #[test]
    fn test_resolve_deterministic() {
        let bundle = bundle();
        for arch in Arch::ALL {
            for driver in Driver::ALL {
                let host = HostPlatform::new("windows", arch.as_str());
                let config = LoaderConfig::default().with_driver(driver);
                let first = resolve_variant(&bundle, &host, &config).unwrap();
                let second = resolve_variant(&bundle, &host, &config).unwrap();
                assert_eq!(first, second);
                assert_eq!(first, VariantKey::new(arch, driver));
            }
        }
    }

    #[test]
    fn test_resolve_default_driver() {
        let host = HostPlatform::new("windows", "x86_64");
        let key = resolve_variant(&bundle(), &host, &LoaderConfig::default()).unwrap();
        assert_eq!(key, VariantKey::new(Arch::X64, Driver::Llvmpipe));
    }

    #[test]
    fn test_resolve_arch_override() {
        let host = HostPlatform::new("windows", "x86_64");
        let config = LoaderConfig::default().with_arch(Arch::X86);
        let key = resolve_variant(&bundle(), &host, &config).unwrap();
        assert_eq!(key.arch, Arch::X86);
    }

    #[test]
    fn test_resolve_unknown_arch() {
        let host = HostPlatform::new("windows", "riscv64");
        let result = resolve_variant(&bundle(), &host, &LoaderConfig::default());
        assert_eq!(result, Err(ResolveError::UnsupportedArch("riscv64".to_string())));
    }

    #[test]
    fn test_resolve_foreign_os() {
        let host = HostPlatform::new("linux", "x86_64");
        let result = resolve_variant(&bundle(), &host, &LoaderConfig::default());
        assert!(matches!(result, Err(ResolveError::UnsupportedOs(_))));

        let config = LoaderConfig::default().allow_foreign_os(true);
        assert!(resolve_variant(&bundle(), &host, &config).is_ok());
    }

    #[test]
    fn test_resolve_missing_variant() {
        let bundle = Bundle::new(BundleVersion::new("0.1.0", "22.3.5")).with_file(
            VariantKey::new(Arch::X64, Driver::Llvmpipe),
            "opengl32.dll",
            b"gl".to_vec(),
        );
        let host = HostPlatform::new("windows", "aarch64");
        let result = resolve_variant(&bundle, &host, &LoaderConfig::default());
        assert_eq!(
            result,
            Err(ResolveError::NoBundle(VariantKey::new(Arch::Arm64, Driver::Llvmpipe)))
        );
    }
}
