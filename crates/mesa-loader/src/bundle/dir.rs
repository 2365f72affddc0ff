//! Bundles read from an unpacked directory at runtime
//!
//! Same layout the build script embeds: `version.properties` plus
//! `<arch>/<driver>/<file>`.

use std::fs;
use std::path::Path;

use super::layout::{classify, EntryKind, VERSION_FILE};
use super::{Bundle, BundleEntry, BundleError};
use crate::marker::BundleVersion;
use crate::properties::Properties;

impl Bundle {
    /// Read a bundle directory.
    ///
    /// Entries outside the `<arch>/<driver>/<file>` layout are skipped.
    /// Without a `version.properties`, `loader.version` is this crate's
    /// version.
    pub fn from_dir(root: &Path) -> Result<Self, BundleError> {
        let mut props = match fs::read_to_string(root.join(VERSION_FILE)) {
            Ok(text) => Properties::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Properties::new(),
            Err(e) => return Err(e.into()),
        };
        if props.get(crate::marker::LOADER_VERSION_KEY).is_none() {
            props.set(crate::marker::LOADER_VERSION_KEY, env!("CARGO_PKG_VERSION"));
        }

        let mut bundle = Bundle::new(BundleVersion::from_properties(&props)?);
        read_entries(root, &mut Vec::new(), &mut bundle)?;
        Ok(bundle)
    }
}

fn read_entries(dir: &Path, rel: &mut Vec<String>, bundle: &mut Bundle) -> Result<(), BundleError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        rel.push(entry.file_name().to_string_lossy().into_owned());

        let kind = {
            let components: Vec<&str> = rel.iter().map(String::as_str).collect();
            classify(&components, path.is_dir())
        };
        let key = rel.join("/");

        match kind {
            EntryKind::Version => {}
            EntryKind::Container => read_entries(&path, rel, bundle)?,
            EntryKind::Library => bundle.insert(&key, BundleEntry::from_bytes(fs::read(&path)?))?,
            EntryKind::Unexpected(what) => tracing::debug!("Skipping unknown {} {}", what, key),
        }

        rel.pop();
    }
    Ok(())
}
