//! Loading materialized libraries into the process
//!
//! Binding goes through [`NativeBinder`] so the load sequence can be driven
//! against the real OS loader or a recording double.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::library::{Library, Residency};
use crate::platform::Driver;

/// Errors that can occur while loading a library
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum LoadError {
    /// Another file with the same name is already mapped by the host;
    /// not fatal, the host's copy keeps serving
    #[error("{library} is already provided by {provider}")]
    AlreadyProvided { library: String, provider: String },

    /// The OS loader rejected the file
    #[error("Failed to load {path}: {reason}")]
    Incompatible { path: String, reason: String },
}

impl LoadError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LoadError::AlreadyProvided { .. })
    }
}

/// Maps libraries into the process
pub trait NativeBinder {
    /// Whether a library named like `path` is already mapped
    fn residency(&self, path: &Path) -> Residency;

    /// Map `path` into the process
    fn bind(&mut self, path: &Path) -> Result<(), LoadError>;
}

/// Binder backed by the OS loader. Keeps every library it bound.
#[derive(Debug, Default)]
pub struct SystemBinder {
    libraries: Vec<Library>,
}

impl SystemBinder {
    pub const fn new() -> Self {
        Self {
            libraries: Vec::new(),
        }
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }
}

impl NativeBinder for SystemBinder {
    fn residency(&self, path: &Path) -> Residency {
        Library::residency(path)
    }

    fn bind(&mut self, path: &Path) -> Result<(), LoadError> {
        self.libraries.push(Library::open(path)?);
        Ok(())
    }
}

/// Outcome of loading one variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Libraries bound (or found already bound from the same path), in order
    pub loaded: Vec<PathBuf>,
    /// Non-fatal conditions encountered on the way
    pub warnings: Vec<LoadError>,
}

/// Which files of a variant to bind, in order.
///
/// The driver's primary libraries that are present, matched
/// case-insensitively; if none are, every file in name order.
pub fn load_order<'a>(driver: Driver, available: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let available: BTreeSet<&str> = available.into_iter().collect();

    let primary: Vec<String> = driver
        .primary_libraries()
        .iter()
        .filter_map(|wanted| {
            available
                .iter()
                .find(|name| name.eq_ignore_ascii_case(wanted))
                .map(|name| name.to_string())
        })
        .collect();

    if !primary.is_empty() {
        return primary;
    }

    available.into_iter().map(String::from).collect()
}

/// Bind `plan` (file names inside `dir`) in order.
///
/// A file whose name is already mapped from elsewhere is still bound from
/// `dir`; if the OS refuses because of that conflict, the condition is
/// recorded as a warning and loading carries on. Any other failure is fatal.
pub fn load(
    dir: &Path,
    plan: &[String],
    binder: &mut dyn NativeBinder,
) -> Result<LoadReport, LoadError> {
    let mut report = LoadReport::default();

    for name in plan {
        let path = dir.join(name);

        let conflict = match binder.residency(&path) {
            Residency::Ours => {
                tracing::debug!("{} is already loaded", path.display());
                report.loaded.push(path);
                continue;
            }
            Residency::Other(provider) => Some(LoadError::AlreadyProvided {
                library: name.clone(),
                provider,
            }),
            Residency::NotLoaded => None,
        };

        tracing::info!("Loading {}", path.display());
        match (binder.bind(&path), conflict) {
            (Ok(()), conflict) => {
                if let Some(warning) = conflict {
                    tracing::warn!("{}", warning);
                    report.warnings.push(warning);
                }
                report.loaded.push(path);
            }
            (Err(err), Some(conflict)) => {
                tracing::warn!("{} ({}), continuing", conflict, err);
                report.warnings.push(conflict);
            }
            (Err(err), None) => {
                tracing::error!("{}", err);
                return Err(err);
            }
        }
    }

    Ok(report)
}
