//! `mesa-loader materialize` — Extract a variant without loading it.

use mesa_loader::{resolve_variant, HostPlatform, Materializer};

use super::{load_bundle, VariantArgs};

pub fn execute(args: &VariantArgs) -> anyhow::Result<()> {
    let config = args.config()?;
    let bundle = load_bundle(args.bundle_dir.as_deref())?;

    let variant = resolve_variant(&bundle, &HostPlatform::current(), &config)?;
    let materializer = Materializer::new(&config.cache_root);
    let path = materializer.ensure_materialized(&bundle, variant)?;

    if materializer.extractions() == 0 {
        tracing::info!("{} was already extracted", variant);
    }
    println!("{}", path.display());
    Ok(())
}
