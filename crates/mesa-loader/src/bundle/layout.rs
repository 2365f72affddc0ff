//! Unpacked bundle layout
//!
//! Shared with the build script, which includes this file directly, so it
//! must not refer to the rest of the crate.

/// Architecture directory names
pub const ARCHES: &[&str] = &["x86", "x64", "arm64"];

/// Driver directory names
pub const DRIVERS: &[&str] = &["llvmpipe", "d3d12", "zink"];

pub const VERSION_FILE: &str = "version.properties";

/// Role of an entry in an unpacked bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// `version.properties` at the root
    Version,
    /// `<arch>` or `<arch>/<driver>` directory
    Container,
    /// `<arch>/<driver>/<file>`
    Library,
    /// Anything else, with a short description for warnings
    Unexpected(&'static str),
}

/// Classify an entry by its path components relative to the bundle root.
pub fn classify(components: &[&str], is_dir: bool) -> EntryKind {
    match (components, is_dir) {
        ([name], false) if *name == VERSION_FILE => EntryKind::Version,
        ([_], false) => EntryKind::Unexpected("file"),
        ([arch], true) if ARCHES.contains(arch) => EntryKind::Container,
        ([_], true) => EntryKind::Unexpected("architecture directory"),
        ([_, driver], true) if DRIVERS.contains(driver) => EntryKind::Container,
        ([_, _], true) => EntryKind::Unexpected("driver directory"),
        ([_, _], false) => EntryKind::Unexpected("file"),
        ([_, _, _], false) => EntryKind::Library,
        _ => EntryKind::Unexpected("directory"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Driver};

    #[test]
    fn test_names_match_platform() {
        let arches: Vec<_> = Arch::ALL.iter().map(|a| a.as_str()).collect();
        let drivers: Vec<_> = Driver::ALL.iter().map(|d| d.as_str()).collect();
        assert_eq!(arches, ARCHES);
        assert_eq!(drivers, DRIVERS);
    }

    #[test]
    fn test_classify_layout() {
        assert_eq!(classify(&["version.properties"], false), EntryKind::Version);
        assert_eq!(classify(&["x64"], true), EntryKind::Container);
        assert_eq!(classify(&["x64", "zink"], true), EntryKind::Container);
        assert_eq!(classify(&["x64", "zink", "opengl32.dll"], false), EntryKind::Library);
    }

    #[test]
    fn test_classify_unexpected_entries() {
        assert_eq!(classify(&["README.txt"], false), EntryKind::Unexpected("file"));
        assert_eq!(
            classify(&["riscv64"], true),
            EntryKind::Unexpected("architecture directory")
        );
        assert_eq!(
            classify(&["x64", "softpipe"], true),
            EntryKind::Unexpected("driver directory")
        );
        assert_eq!(classify(&["x64", "opengl32.dll"], false), EntryKind::Unexpected("file"));
        assert_eq!(
            classify(&["x64", "zink", "debug"], true),
            EntryKind::Unexpected("directory")
        );
    }
}
