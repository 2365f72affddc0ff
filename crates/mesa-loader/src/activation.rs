//! Process-wide activation
//!
//! Ties resolution, materialization and loading together and keeps the
//! outcome in a process-global state. [`ensure_loaded`] runs the sequence at
//! most once per process; later calls report the recorded outcome.

use parking_lot::{const_mutex, Mutex};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::binder::{load, load_order, LoadError, LoadReport, NativeBinder, SystemBinder};
use crate::bundle::{Bundle, BundleError};
use crate::config::{ConfigError, LoaderConfig};
use crate::marker::BundleVersion;
use crate::materialize::{MaterializeError, Materializer};
use crate::platform::{resolve_variant, Driver, HostPlatform, ResolveError, VariantKey};
use crate::state::{Failure, LoaderState, StateError};

/// Failure category, stable across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedPlatform,
    ExtractionFailed,
    IoFailure,
    LoadFailed,
    InvalidConfig,
    Internal,
}

impl ErrorKind {
    /// Integer returned by the activation hook
    pub fn status_code(self) -> i32 {
        match self {
            ErrorKind::UnsupportedPlatform => 1,
            ErrorKind::ExtractionFailed => 2,
            ErrorKind::IoFailure => 3,
            ErrorKind::LoadFailed => 4,
            ErrorKind::InvalidConfig => 5,
            ErrorKind::Internal => -1,
        }
    }
}

/// Errors that can occur during activation
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    /// An earlier activation in this process failed
    #[error("{}", .0.message)]
    PreviouslyFailed(Failure),
}

impl ActivationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActivationError::Resolve(_) => ErrorKind::UnsupportedPlatform,
            ActivationError::Bundle(BundleError::IoError(_)) => ErrorKind::IoFailure,
            ActivationError::Bundle(_) => ErrorKind::ExtractionFailed,
            ActivationError::Materialize(MaterializeError::Io { .. }) => ErrorKind::IoFailure,
            ActivationError::Materialize(_) => ErrorKind::ExtractionFailed,
            ActivationError::Load(_) => ErrorKind::LoadFailed,
            ActivationError::Config(_) => ErrorKind::InvalidConfig,
            ActivationError::State(_) => ErrorKind::Internal,
            ActivationError::PreviouslyFailed(failure) => failure.kind,
        }
    }

    pub fn status_code(&self) -> i32 {
        self.kind().status_code()
    }

    fn to_failure(&self) -> Failure {
        Failure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// What a successful activation did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub variant: VariantKey,
    pub version: BundleVersion,
    /// Materialized directory the libraries were bound from
    pub path: PathBuf,
    pub load: LoadReport,
}

/// Run resolve, materialize and load against `state`.
///
/// `state` must be [`LoaderState::Unresolved`]. On error the state is moved
/// to `Failed` and the error returned.
pub fn activate(
    state: &mut LoaderState,
    bundle: &Bundle,
    host: &HostPlatform,
    config: &LoaderConfig,
    binder: &mut dyn NativeBinder,
) -> Result<ActivationReport, ActivationError> {
    if let LoaderState::Failed(failure) = &*state {
        return Err(ActivationError::PreviouslyFailed(failure.clone()));
    }

    tracing::info!(
        "Mesa3D {} (loader {})",
        bundle.version().mesa,
        bundle.version().loader
    );

    let result = run(state, bundle, host, config, binder);
    if let Err(err) = &result {
        fail(state, err);
    }
    result
}

fn run(
    state: &mut LoaderState,
    bundle: &Bundle,
    host: &HostPlatform,
    config: &LoaderConfig,
    binder: &mut dyn NativeBinder,
) -> Result<ActivationReport, ActivationError> {
    let variant = resolve_variant(bundle, host, config)?;
    state.resolve(variant)?;
    tracing::debug!("Resolved variant {}", variant);

    let materializer = Materializer::new(&config.cache_root);
    let path = materializer.ensure_materialized(bundle, variant)?;
    state.materialize(path.clone())?;

    let files = bundle
        .files(variant)
        .ok_or(MaterializeError::UnknownVariant(variant))?;
    let plan = load_order(variant.driver, files.keys().map(String::as_str));
    let loaded = load(&path, &plan, binder)?;

    let report = ActivationReport {
        variant,
        version: bundle.version().clone(),
        path,
        load: loaded,
    };
    state.finish(report.clone())?;

    tracing::info!("Mesa3D {} active from {}", variant, report.path.display());
    Ok(report)
}

fn fail(state: &mut LoaderState, err: &ActivationError) {
    tracing::error!("Mesa3D activation failed: {}", err);
    if state.fail(err.to_failure()).is_err() {
        tracing::debug!("State already terminal ({})", state.name());
    }
}

struct Global {
    state: LoaderState,
    binder: SystemBinder,
}

static GLOBAL: Mutex<Global> = const_mutex(Global {
    state: LoaderState::Unresolved,
    binder: SystemBinder::new(),
});

/// Activate the embedded Mesa3D libraries for this process, once.
///
/// `driver` overrides `MESA_LOADER_DRIVER`; `None` or an empty name keeps the
/// configured driver. The first call does the work; every later call returns
/// the first call's outcome without touching the disk.
pub fn ensure_loaded(driver: Option<&str>) -> Result<ActivationReport, ActivationError> {
    let mut global = GLOBAL.lock();
    let Global { state, binder } = &mut *global;

    match &*state {
        LoaderState::Loaded(report) => return Ok(report.clone()),
        LoaderState::Failed(failure) => {
            return Err(ActivationError::PreviouslyFailed(failure.clone()))
        }
        _ => {}
    }

    let prelude = || -> Result<(Bundle, LoaderConfig), ActivationError> {
        let mut config = LoaderConfig::from_env()?;
        if let Some(name) = driver.filter(|name| !name.trim().is_empty()) {
            config.driver = Some(name.parse::<Driver>()?);
        }
        Ok((Bundle::embedded()?, config))
    };

    let (bundle, config) = match prelude() {
        Ok(inputs) => inputs,
        Err(err) => {
            fail(state, &err);
            return Err(err);
        }
    };

    activate(state, &bundle, &HostPlatform::current(), &config, binder)
}

/// Snapshot of the process-wide activation state
pub fn state() -> LoaderState {
    GLOBAL.lock().state.clone()
}
