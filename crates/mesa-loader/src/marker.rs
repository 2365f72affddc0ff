//! Version marker
//!
//! A small properties file written next to the extracted libraries. It records
//! which loader and which Mesa3D release produced the directory, so a cache
//! left behind by another release is never mistaken for a valid one.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::platform::VariantKey;
use crate::properties::Properties;

/// File name of the marker inside a materialized directory
pub const MARKER_FILE: &str = "mesa-loader.properties";

pub const LOADER_VERSION_KEY: &str = "loader.version";
pub const MESA_VERSION_KEY: &str = "mesa.version";
pub const VARIANT_KEY: &str = "variant";

/// Errors that can occur during marker operations
#[derive(Debug, Error)]
pub enum MarkerError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// A required key is absent
    #[error("Missing required property: {0}")]
    MissingKey(&'static str),
}

/// Version of a bundle: the loader that embeds it plus the upstream Mesa3D
/// release (optionally suffixed with the compiler, e.g. `22.3.5-msvc`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BundleVersion {
    pub loader: String,
    pub mesa: String,
}

impl BundleVersion {
    pub fn new(loader: impl Into<String>, mesa: impl Into<String>) -> Self {
        Self {
            loader: loader.into(),
            mesa: mesa.into(),
        }
    }

    /// Read from `version.properties`. `loader.version` is required;
    /// a missing `mesa.version` is reported as `unknown`.
    pub fn from_properties(props: &Properties) -> Result<Self, MarkerError> {
        let loader = props
            .get(LOADER_VERSION_KEY)
            .filter(|v| !v.is_empty())
            .ok_or(MarkerError::MissingKey(LOADER_VERSION_KEY))?;
        let mesa = props
            .get(MESA_VERSION_KEY)
            .filter(|v| !v.is_empty())
            .unwrap_or("unknown");

        Ok(Self::new(loader, mesa))
    }

    /// Path segment for this version inside the cache root.
    ///
    /// A readable prefix with characters outside `[A-Za-z0-9._+-]` replaced by
    /// `_`, followed by a digest of the exact version pair. Distinct versions
    /// never share a directory.
    pub fn dir_name(&self) -> String {
        let readable: String = format!("{}-{}", self.loader, self.mesa)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let mut hasher = Sha256::new();
        hasher.update((self.loader.len() as u64).to_le_bytes());
        hasher.update(self.loader.as_bytes());
        hasher.update(self.mesa.as_bytes());
        let digest = hasher.finalize();

        format!("{}-{}", readable, hex::encode(&digest[..6]))
    }
}

impl fmt::Display for BundleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesa {} (loader {})", self.mesa, self.loader)
    }
}

/// Contents of the marker file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker {
    pub version: BundleVersion,
    /// Keys this loader does not know about, kept as read
    pub extra: Properties,
}

impl VersionMarker {
    pub fn new(version: BundleVersion, variant: VariantKey) -> Self {
        let mut extra = Properties::new();
        extra.set(VARIANT_KEY, variant.to_string());
        Self { version, extra }
    }

    /// Parse marker text; both version keys are required.
    pub fn parse(text: &str) -> Result<Self, MarkerError> {
        let mut props = Properties::parse(text);
        let loader = props
            .remove(LOADER_VERSION_KEY)
            .ok_or(MarkerError::MissingKey(LOADER_VERSION_KEY))?;
        let mesa = props
            .remove(MESA_VERSION_KEY)
            .ok_or(MarkerError::MissingKey(MESA_VERSION_KEY))?;

        Ok(Self {
            version: BundleVersion::new(loader, mesa),
            extra: props,
        })
    }

    /// Path of the marker inside `dir`
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MARKER_FILE)
    }

    /// Load the marker from `dir`, `Ok(None)` when there is none.
    pub fn load(dir: &Path) -> Result<Option<Self>, MarkerError> {
        match fs::read_to_string(Self::path(dir)) {
            Ok(text) => Self::parse(&text).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn variant(&self) -> Option<&str> {
        self.extra.get(VARIANT_KEY)
    }
}

impl fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut props = self.extra.clone();
        props.set(LOADER_VERSION_KEY, self.version.loader.as_str());
        props.set(MESA_VERSION_KEY, self.version.mesa.as_str());
        write!(f, "{}", props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Driver};
    use tempfile::TempDir;

    #[test]
    fn test_version_from_properties() {
        let props = Properties::parse("loader.version=0.1.0\nmesa.version=22.3.5-msvc\n");
        let version = BundleVersion::from_properties(&props).unwrap();
        assert_eq!(version, BundleVersion::new("0.1.0", "22.3.5-msvc"));
    }

    #[test]
    fn test_version_missing_loader() {
        let props = Properties::parse("mesa.version=22.3.5\n");
        let result = BundleVersion::from_properties(&props);
        assert!(matches!(result, Err(MarkerError::MissingKey(LOADER_VERSION_KEY))));
    }

    #[test]
    fn test_version_missing_mesa() {
        let props = Properties::parse("loader.version=0.1.0\n");
        let version = BundleVersion::from_properties(&props).unwrap();
        assert_eq!(version.mesa, "unknown");
    }

    #[test]
    fn test_dir_name() {
        let version = BundleVersion::new("0.1.0-SNAPSHOT", "22.3.5-msvc");
        let name = version.dir_name();
        assert!(name.starts_with("0.1.0-SNAPSHOT-22.3.5-msvc-"));
        assert_eq!(name.len(), "0.1.0-SNAPSHOT-22.3.5-msvc-".len() + 12);
        assert_eq!(name, version.clone().dir_name());

        let odd = BundleVersion::new("1.0/../x", "a b:c");
        assert!(odd.dir_name().starts_with("1.0_.._x-a_b_c-"));
        assert!(!odd.dir_name().contains('/'));
    }

    #[test]
    fn test_dir_name_distinguishes_versions() {
        // Same readable prefix, different version pairs
        let pairs = [
            (BundleVersion::new("1.0-a", "b"), BundleVersion::new("1.0", "a-b")),
            (BundleVersion::new("1.0", "a b"), BundleVersion::new("1.0", "a_b")),
            (BundleVersion::new("1.0", "x/y"), BundleVersion::new("1.0", "x:y")),
        ];
        for (a, b) in pairs {
            assert_ne!(a.dir_name(), b.dir_name(), "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn test_marker_parse_ignores_unknown_keys() {
        let text = "loader.version=0.1.0\nmesa.version=22.3.5\nfuture.key=yes\n";
        let marker = VersionMarker::parse(text).unwrap();
        assert_eq!(marker.version, BundleVersion::new("0.1.0", "22.3.5"));
        assert_eq!(marker.extra.get("future.key"), Some("yes"));
    }

    #[test]
    fn test_marker_parse_requires_both_versions() {
        assert!(matches!(
            VersionMarker::parse("loader.version=0.1.0\n"),
            Err(MarkerError::MissingKey(MESA_VERSION_KEY))
        ));
        assert!(matches!(
            VersionMarker::parse("mesa.version=22.3.5\n"),
            Err(MarkerError::MissingKey(LOADER_VERSION_KEY))
        ));
    }

    #[test]
    fn test_marker_write_and_load() {
        let temp = TempDir::new().unwrap();
        let marker = VersionMarker::new(
            BundleVersion::new("0.1.0", "22.3.5-msvc"),
            VariantKey::new(Arch::X64, Driver::D3d12),
        );

        std::fs::write(VersionMarker::path(temp.path()), marker.to_string()).unwrap();
        let loaded = VersionMarker::load(temp.path()).unwrap().unwrap();

        assert_eq!(loaded, marker);
        assert_eq!(loaded.variant(), Some("x64/d3d12"));

        let text = std::fs::read_to_string(VersionMarker::path(temp.path())).unwrap();
        assert!(text.contains("mesa.version=22.3.5-msvc"));
        assert!(text.contains("loader.version=0.1.0"));
    }

    #[test]
    fn test_marker_load_missing() {
        let temp = TempDir::new().unwrap();
        assert!(VersionMarker::load(temp.path()).unwrap().is_none());
    }
}
