//! Bundle compiled into the binary by `build.rs`

use std::borrow::Cow;

use super::{Bundle, BundleEntry, BundleError};
use crate::marker::BundleVersion;
use crate::properties::Properties;

/// Index entry generated by the build script
struct EmbeddedFile {
    path: &'static str,
    size: u64,
    sha256: &'static str,
    data: &'static [u8],
}

include!(concat!(env!("OUT_DIR"), "/embedded_bundle.rs"));

impl Bundle {
    /// The bundle embedded in this binary.
    ///
    /// Fails only if the generated index is inconsistent; a build without any
    /// native libraries yields an empty bundle.
    pub fn embedded() -> Result<Self, BundleError> {
        let props = Properties::parse(VERSION_PROPERTIES);
        let mut bundle = Bundle::new(BundleVersion::from_properties(&props)?);

        for file in EMBEDDED_FILES {
            let entry = BundleEntry::new(file.size, file.sha256, Some(Cow::Borrowed(file.data)));
            bundle.insert(file.path, entry)?;
        }

        Ok(bundle)
    }
}
