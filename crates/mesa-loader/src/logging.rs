//! Log output for the loader
//!
//! Installs a compact `tracing-subscriber` formatter on stderr. The filter is
//! read from `MESA_LOADER_LOG` (e.g. `MESA_LOADER_LOG=mesa_loader=debug`).
//! A subscriber installed earlier by the host wins.

use tracing_subscriber::EnvFilter;

use crate::config::LOG_VAR;

pub fn init() {
    init_with_default("info");
}

/// Like [`init`], with `default` as the filter when `MESA_LOADER_LOG` is unset.
pub fn init_with_default(default: &str) {
    let filter = EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
