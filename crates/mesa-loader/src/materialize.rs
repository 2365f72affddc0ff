//! On-disk materialization of bundle variants
//!
//! Extracted libraries live in a version-keyed cache shared by every process
//! on the machine:
//!
//! ```text
//! <cache-root>/
//! └── <loader.version>-<mesa.version>-<digest>/
//!     └── <arch>/
//!         ├── <driver>/
//!         │   ├── opengl32.dll
//!         │   ├── ...
//!         │   └── mesa-loader.properties
//!         └── .<driver>.tmp-XXXXXX/      (staging, short-lived)
//! ```
//!
//! A variant directory is written under a temporary sibling name and renamed
//! into place in one step, so a reader never observes a partial directory.
//! No locks are taken: racing processes write identical content, and a lost
//! rename is fine as long as the winner's directory is valid.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;

use crate::bundle::{Bundle, BundleError, VariantFiles};
use crate::marker::{BundleVersion, VersionMarker};
use crate::platform::VariantKey;

/// Errors that can occur during materialization
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// Embedded data missing or corrupt
    #[error("Extraction failed: {0}")]
    ExtractionFailed(#[from] BundleError),

    /// The bundle has no files for the variant
    #[error("No embedded libraries for {0}")]
    UnknownVariant(VariantKey),

    /// Filesystem error
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MaterializeError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> MaterializeError + '_ {
        move |source| MaterializeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Suffix source for directories moved out of the way
static STALE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Extracts bundle variants under a cache root
#[derive(Debug)]
pub struct Materializer {
    root: PathBuf,
    extractions: AtomicUsize,
}

impl Materializer {
    /// A relative `root` is taken against the current directory, so returned
    /// paths stay valid if the process changes directory later.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: absolute(root.into()),
            extractions: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of extractions this materializer has performed
    pub fn extractions(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    /// Deterministic location of a variant for a bundle version
    pub fn target_dir(&self, version: &BundleVersion, variant: VariantKey) -> PathBuf {
        self.root
            .join(version.dir_name())
            .join(variant.arch.as_str())
            .join(variant.driver.as_str())
    }

    /// Whether `variant` is already extracted and valid
    pub fn is_materialized(&self, bundle: &Bundle, variant: VariantKey) -> bool {
        match bundle.files(variant) {
            Some(files) => is_valid(&self.target_dir(bundle.version(), variant), bundle.version(), files),
            None => false,
        }
    }

    /// Make sure `variant` of `bundle` is extracted and return its directory.
    ///
    /// A valid existing directory is returned after metadata reads only.
    /// Otherwise every file is checked against the bundle manifest, written to
    /// a staging directory together with the version marker, and the staging
    /// directory is renamed into place.
    pub fn ensure_materialized(
        &self,
        bundle: &Bundle,
        variant: VariantKey,
    ) -> Result<PathBuf, MaterializeError> {
        let files = bundle
            .files(variant)
            .ok_or(MaterializeError::UnknownVariant(variant))?;
        let version = bundle.version();
        let target = self.target_dir(version, variant);

        if is_valid(&target, version, files) {
            tracing::debug!("Using cached {} at {}", variant, target.display());
            return Ok(target);
        }

        // Verify everything before touching the disk
        let verified = files
            .iter()
            .map(|(name, entry)| {
                let path = format!("{}/{}", variant, name);
                entry.verified_data(&path).map(|data| (name.as_str(), data))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let parent = target
            .parent()
            .ok_or_else(|| MaterializeError::Io {
                path: target.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "cache root has no parent"),
            })?;
        fs::create_dir_all(parent).map_err(MaterializeError::io(parent))?;

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}.tmp-", variant.driver))
            .tempdir_in(parent)
            .map_err(MaterializeError::io(parent))?;

        for (name, data) in &verified {
            tracing::info!("Extract {} to {}", name, target.display());
            let path = staging.path().join(name);
            write_synced(&path, data).map_err(MaterializeError::io(&path))?;
        }

        // Marker last: a directory with a marker is complete
        let marker = VersionMarker::new(version.clone(), variant);
        let marker_path = VersionMarker::path(staging.path());
        write_synced(&marker_path, marker.to_string().as_bytes())
            .map_err(MaterializeError::io(&marker_path))?;

        self.extractions.fetch_add(1, Ordering::SeqCst);

        publish(staging.path(), &target, version, files)?;
        Ok(target)
    }

    /// Remove every materialized variant under the root.
    ///
    /// **Warning:** libraries still loaded by running processes may prevent
    /// removal on Windows.
    pub fn clear(&self) -> Result<(), MaterializeError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MaterializeError::Io {
                path: self.root.clone(),
                source: e,
            }),
        }
    }
}

/// Move a fully written staging directory to `target`.
///
/// Another process may publish the same version concurrently; its directory
/// is as good as ours, so losing the rename to a valid directory is success.
/// A stale or incomplete directory in the way is moved aside first.
fn publish(
    staging: &Path,
    target: &Path,
    version: &BundleVersion,
    files: &VariantFiles,
) -> Result<(), MaterializeError> {
    let first_err = match fs::rename(staging, target) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    if is_valid(target, version, files) {
        tracing::debug!("{} was published by another process", target.display());
        return Ok(());
    }

    if target.exists() {
        return replace_stale(staging, target, version, files);
    }

    Err(MaterializeError::io(target)(first_err))
}

/// Swap the invalid directory at `target` for `staging`.
///
/// The directory moved aside is checked again: a racing process may have
/// published a valid one after our check. That directory is put back and
/// ours is dropped, since the other process may already have handed its path
/// out.
fn replace_stale(
    staging: &Path,
    target: &Path,
    version: &BundleVersion,
    files: &VariantFiles,
) -> Result<(), MaterializeError> {
    let stale = stale_path(target);

    match fs::rename(target, &stale) {
        Ok(()) => {}
        Err(_) if is_valid(target, version, files) => return Ok(()),
        Err(_) if !target.exists() => {}
        Err(e) => return Err(MaterializeError::io(target)(e)),
    }

    if is_valid(&stale, version, files) {
        tracing::debug!("{} was published by another process", target.display());
        return match fs::rename(&stale, target) {
            Ok(()) => Ok(()),
            Err(_) if is_valid(target, version, files) => {
                let _ = fs::remove_dir_all(&stale);
                Ok(())
            }
            Err(e) => Err(MaterializeError::io(target)(e)),
        };
    }

    tracing::warn!("Replacing stale {}", target.display());
    let result = match fs::rename(staging, target) {
        Ok(()) => Ok(()),
        Err(_) if is_valid(target, version, files) => Ok(()),
        Err(e) => Err(MaterializeError::io(target)(e)),
    };
    let _ = fs::remove_dir_all(&stale);
    result
}

/// Marker matches `version` and every file exists with its manifest size.
fn is_valid(dir: &Path, version: &BundleVersion, files: &VariantFiles) -> bool {
    match VersionMarker::load(dir) {
        Ok(Some(marker)) if marker.version == *version => {}
        _ => return false,
    }

    files.iter().all(|(name, entry)| {
        fs::metadata(dir.join(name))
            .map(|meta| meta.is_file() && meta.len() == entry.size)
            .unwrap_or(false)
    })
}

fn stale_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = STALE_SEQ.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{}.stale-{}-{}", name, std::process::id(), seq))
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(e) => {
            tracing::warn!("Cannot resolve cache root {}: {}", path.display(), e);
            path
        }
    }
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}
