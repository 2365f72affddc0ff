//! `mesa-loader list` — Show bundled variants and their files.

use serde::Serialize;
use std::path::Path;

use super::load_bundle;

#[derive(Serialize)]
struct Listing {
    loader_version: String,
    mesa_version: String,
    target_os: String,
    variants: Vec<VariantListing>,
}

#[derive(Serialize)]
struct VariantListing {
    variant: String,
    files: Vec<FileListing>,
}

#[derive(Serialize)]
struct FileListing {
    name: String,
    size: u64,
    sha256: String,
}

pub fn execute(bundle_dir: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let bundle = load_bundle(bundle_dir)?;

    let listing = Listing {
        loader_version: bundle.version().loader.clone(),
        mesa_version: bundle.version().mesa.clone(),
        target_os: bundle.target_os().to_string(),
        variants: bundle
            .variants()
            .map(|variant| VariantListing {
                variant: variant.to_string(),
                files: bundle
                    .files(variant)
                    .into_iter()
                    .flatten()
                    .map(|(name, entry)| FileListing {
                        name: name.clone(),
                        size: entry.size,
                        sha256: entry.sha256.clone(),
                    })
                    .collect(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("Mesa3D {} (loader {})", listing.mesa_version, listing.loader_version);
    if listing.variants.is_empty() {
        println!("No embedded libraries.");
        return Ok(());
    }

    for variant in &listing.variants {
        println!();
        println!("{}:", variant.variant);
        for file in &variant.files {
            println!("  {:<24} {:>10}  {}", file.name, file.size, file.sha256);
        }
    }

    Ok(())
}
