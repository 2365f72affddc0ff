//! `mesa-loader activate` — Resolve, extract and load in this process.

use mesa_loader::{activate, ActivationError, ActivationReport, HostPlatform, LoaderState, SystemBinder};

use super::VariantArgs;

/// Returns the activation status code
pub fn execute(args: &VariantArgs) -> anyhow::Result<i32> {
    match run(args) {
        Ok(report) => {
            println!("Activated Mesa3D {} ({})", report.version.mesa, report.variant);
            println!("Directory:    {}", report.path.display());
            for path in &report.load.loaded {
                println!("Loaded:       {}", path.display());
            }
            for warning in &report.load.warnings {
                println!("Warning:      {}", warning);
            }
            Ok(0)
        }
        Err(err) => {
            match (&err, &args.bundle_dir) {
                (ActivationError::Bundle(_), Some(dir)) => {
                    eprintln!("Error: Failed to read bundle directory {}: {}", dir.display(), err)
                }
                _ => eprintln!("Error: {}", err),
            }
            Ok(err.status_code())
        }
    }
}

fn run(args: &VariantArgs) -> Result<ActivationReport, ActivationError> {
    let config = args.config()?;
    let bundle = args.bundle()?;

    let mut state = LoaderState::default();
    let mut binder = SystemBinder::new();
    activate(&mut state, &bundle, &HostPlatform::current(), &config, &mut binder)
}
