//! Native library bundles
//!
//! A bundle is the versioned set of files shipped for every `(arch, driver)`
//! variant, addressed by `<arch>/<driver>/<file>` paths. Each entry carries
//! its expected size and SHA-256 so corrupt data is caught before it reaches
//! the disk.

mod dir;
mod embedded;
pub mod layout;

use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io;
use thiserror::Error;

use crate::marker::{BundleVersion, MarkerError, MARKER_FILE};
use crate::platform::{Arch, Driver, VariantKey, TARGET_OS};

/// Errors that can occur while building or reading a bundle
#[derive(Debug, Error)]
pub enum BundleError {
    /// IO error (reading a bundle directory)
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// Entry path is not `<arch>/<driver>/<file>`
    #[error("Invalid bundle path: {0}")]
    InvalidPath(String),

    /// Manifest lists a file whose bytes are absent
    #[error("Missing data for {0}")]
    MissingData(String),

    /// Size mismatch against the manifest
    #[error("Size mismatch for {path}: expected {expected}, got {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// Checksum mismatch against the manifest
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Bundle version properties are unusable
    #[error("Invalid version properties: {0}")]
    Version(#[from] MarkerError),
}

/// One file of a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    /// Expected size in bytes
    pub size: u64,
    /// Expected SHA-256 (hex-encoded)
    pub sha256: String,
    data: Option<Cow<'static, [u8]>>,
}

impl BundleEntry {
    /// Entry whose manifest is computed from its bytes
    pub fn from_bytes(data: impl Into<Cow<'static, [u8]>>) -> Self {
        let data = data.into();
        Self {
            size: data.len() as u64,
            sha256: hex::encode(Sha256::digest(&data)),
            data: Some(data),
        }
    }

    /// Entry with an explicit manifest; `data` may disagree with it or be
    /// absent, which is reported when the entry is read.
    pub fn new(
        size: u64,
        sha256: impl Into<String>,
        data: Option<Cow<'static, [u8]>>,
    ) -> Self {
        Self {
            size,
            sha256: sha256.into(),
            data,
        }
    }

    /// The bytes of this entry, checked against the manifest.
    ///
    /// `path` is only used in error messages.
    pub fn verified_data(&self, path: &str) -> Result<&[u8], BundleError> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| BundleError::MissingData(path.to_string()))?;

        if data.len() as u64 != self.size {
            return Err(BundleError::SizeMismatch {
                path: path.to_string(),
                expected: self.size,
                actual: data.len() as u64,
            });
        }

        let actual = hex::encode(Sha256::digest(data));
        if !actual.eq_ignore_ascii_case(&self.sha256) {
            return Err(BundleError::ChecksumMismatch {
                path: path.to_string(),
                expected: self.sha256.clone(),
                actual,
            });
        }

        Ok(data)
    }
}

/// Files of one variant, by file name
pub type VariantFiles = BTreeMap<String, BundleEntry>;

/// Immutable, versioned set of native library files per variant
#[derive(Debug, Clone)]
pub struct Bundle {
    version: BundleVersion,
    target_os: String,
    variants: BTreeMap<VariantKey, VariantFiles>,
}

impl Bundle {
    /// Empty bundle targeting Windows
    pub fn new(version: BundleVersion) -> Self {
        Self {
            version,
            target_os: TARGET_OS.to_string(),
            variants: BTreeMap::new(),
        }
    }

    pub fn with_target_os(mut self, os: impl Into<String>) -> Self {
        self.target_os = os.into();
        self
    }

    /// Add a file computed from its bytes
    pub fn with_file(
        mut self,
        variant: VariantKey,
        name: &str,
        data: impl Into<Cow<'static, [u8]>>,
    ) -> Self {
        self.variants
            .entry(variant)
            .or_default()
            .insert(name.to_string(), BundleEntry::from_bytes(data));
        self
    }

    /// Insert an entry under a `<arch>/<driver>/<file>` path
    pub fn insert(&mut self, path: &str, entry: BundleEntry) -> Result<(), BundleError> {
        let (variant, name) = parse_entry_path(path)?;
        self.variants.entry(variant).or_default().insert(name, entry);
        Ok(())
    }

    pub fn version(&self) -> &BundleVersion {
        &self.version
    }

    pub fn target_os(&self) -> &str {
        &self.target_os
    }

    /// Variants that have at least one file
    pub fn variants(&self) -> impl Iterator<Item = VariantKey> + '_ {
        self.variants
            .iter()
            .filter(|(_, files)| !files.is_empty())
            .map(|(key, _)| *key)
    }

    pub fn contains_variant(&self, variant: VariantKey) -> bool {
        self.files(variant).is_some()
    }

    /// Files of `variant`, `None` if the bundle has none
    pub fn files(&self, variant: VariantKey) -> Option<&VariantFiles> {
        self.variants.get(&variant).filter(|files| !files.is_empty())
    }

    pub fn entry(&self, variant: VariantKey, name: &str) -> Option<&BundleEntry> {
        self.variants.get(&variant)?.get(name)
    }

    pub fn file_count(&self) -> usize {
        self.variants.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }
}

/// Split `<arch>/<driver>/<file>` (either slash direction) into its parts.
pub fn parse_entry_path(path: &str) -> Result<(VariantKey, String), BundleError> {
    let invalid = || BundleError::InvalidPath(path.to_string());

    let normalized = path.replace('\\', "/");
    let mut parts = normalized.split('/');
    let (Some(arch), Some(driver), Some(name), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let arch = arch_dir(arch).ok_or_else(invalid)?;
    let driver = driver_dir(driver).ok_or_else(invalid)?;

    if !is_valid_file_name(name) {
        return Err(invalid());
    }

    Ok((VariantKey::new(arch, driver), name.to_string()))
}

/// Exact directory name of an architecture (no aliases)
fn arch_dir(name: &str) -> Option<Arch> {
    Arch::ALL.into_iter().find(|arch| arch.as_str() == name)
}

/// Exact directory name of a driver
fn driver_dir(name: &str) -> Option<Driver> {
    Driver::ALL.into_iter().find(|driver| driver.as_str() == name)
}

fn is_valid_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.eq_ignore_ascii_case(MARKER_FILE)
        && !name.contains(['/', '\\', ':'])
}
