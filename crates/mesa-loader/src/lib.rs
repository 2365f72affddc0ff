//! Mesa3D native library loader
//!
//! This crate makes the Mesa3D OpenGL implementation embedded in the binary
//! available to the running process:
//! - Variant resolution (architecture + Gallium driver)
//! - Bundle model with size/SHA-256 manifest, embedded at build time
//! - Version-keyed on-disk cache with atomic directory publication
//! - Native library binding (`LoadLibraryExW` / `dlopen`)
//! - One-shot, process-wide activation

pub mod activation;
pub mod binder;
pub mod bundle;
pub mod config;
pub mod library;
pub mod logging;
pub mod marker;
pub mod materialize;
pub mod platform;
pub mod properties;
pub mod state;

pub use activation::{
    activate, ensure_loaded, state, ActivationError, ActivationReport, ErrorKind,
};
pub use binder::{load, load_order, LoadError, LoadReport, NativeBinder, SystemBinder};
pub use bundle::{Bundle, BundleEntry, BundleError};
pub use config::{ConfigError, LoaderConfig};
pub use library::{Library, Residency};
pub use marker::{BundleVersion, MarkerError, VersionMarker};
pub use materialize::{MaterializeError, Materializer};
pub use platform::{resolve_variant, Arch, Driver, HostPlatform, ResolveError, VariantKey};
pub use properties::Properties;
pub use state::{Failure, LoaderState, StateError};
