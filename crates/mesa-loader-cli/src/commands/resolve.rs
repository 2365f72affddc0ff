//! `mesa-loader resolve` — Print the variant for this host.

use mesa_loader::{resolve_variant, HostPlatform};

use super::{load_bundle, VariantArgs};

pub fn execute(args: &VariantArgs) -> anyhow::Result<()> {
    let config = args.config()?;
    let bundle = load_bundle(args.bundle_dir.as_deref())?;

    let variant = resolve_variant(&bundle, &HostPlatform::current(), &config)?;
    println!("{}", variant);
    Ok(())
}
