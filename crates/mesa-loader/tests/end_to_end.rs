//! End-to-end activation against a recording binder
//!
//! Runs resolve, materialize and load with a hand-built bundle so the whole
//! sequence can be checked on any host.

use std::fs;
use std::path::{Path, PathBuf};

use mesa_loader::marker::{VersionMarker, MARKER_FILE};
use mesa_loader::{
    activate, Arch, Bundle, BundleVersion, Driver, ErrorKind, HostPlatform, LoadError,
    LoaderConfig, LoaderState, NativeBinder, Residency, VariantKey,
};
use tempfile::TempDir;

/// Records bound paths instead of touching the OS loader
#[derive(Default)]
struct RecordingBinder {
    resident: Vec<(String, Residency)>,
    bound: Vec<PathBuf>,
}

impl NativeBinder for RecordingBinder {
    fn residency(&self, path: &Path) -> Residency {
        let name = path.file_name().unwrap().to_string_lossy();
        self.resident
            .iter()
            .find(|(resident, _)| *resident == name)
            .map(|(_, residency)| residency.clone())
            .unwrap_or(Residency::NotLoaded)
    }

    fn bind(&mut self, path: &Path) -> Result<(), LoadError> {
        assert!(path.exists(), "{} is bound before it exists", path.display());
        self.bound.push(path.to_path_buf());
        Ok(())
    }
}

const MESA_VERSION: &str = "22.3.5-msvc";

fn bundle() -> Bundle {
    let llvmpipe = VariantKey::new(Arch::X64, Driver::Llvmpipe);
    let d3d12 = VariantKey::new(Arch::X64, Driver::D3d12);

    Bundle::new(BundleVersion::new("0.1.0", MESA_VERSION))
        .with_file(llvmpipe, "a.dll", b"llvmpipe a".to_vec())
        .with_file(llvmpipe, "b.dll", b"llvmpipe b".to_vec())
        .with_file(d3d12, "a.dll", b"d3d12 a".to_vec())
        .with_file(d3d12, "b.dll", b"d3d12 b".to_vec())
}

fn windows(arch: &str) -> HostPlatform {
    HostPlatform::new("windows", arch)
}

#[test]
fn test_d3d12_variant_end_to_end() {
    let temp = TempDir::new().unwrap();
    let config = LoaderConfig::default()
        .with_cache_root(temp.path())
        .with_driver(Driver::D3d12);
    let mut state = LoaderState::default();
    let mut binder = RecordingBinder::default();

    let report = activate(&mut state, &bundle(), &windows("amd64"), &config, &mut binder).unwrap();

    let expected = temp
        .path()
        .join(BundleVersion::new("0.1.0", MESA_VERSION).dir_name())
        .join("x64")
        .join("d3d12");
    assert_eq!(report.variant, VariantKey::new(Arch::X64, Driver::D3d12));
    assert_eq!(report.path, expected);

    // Exactly the d3d12 files plus the marker
    let mut names: Vec<String> = fs::read_dir(&expected)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.dll", "b.dll", MARKER_FILE]);
    assert_eq!(fs::read(expected.join("a.dll")).unwrap(), b"d3d12 a");
    assert_eq!(fs::read(expected.join("b.dll")).unwrap(), b"d3d12 b");

    let marker = fs::read_to_string(expected.join(MARKER_FILE)).unwrap();
    assert!(marker.contains(&format!("mesa.version={}", MESA_VERSION)));
    assert_eq!(
        VersionMarker::load(&expected).unwrap().unwrap().version.mesa,
        MESA_VERSION
    );

    // No primary library present: every file in name order
    assert_eq!(binder.bound, vec![expected.join("a.dll"), expected.join("b.dll")]);
    assert_eq!(report.load.loaded, binder.bound);
    assert!(report.load.warnings.is_empty());

    // The llvmpipe set is never touched
    assert!(!expected.parent().unwrap().join("llvmpipe").exists());
    assert!(matches!(state, LoaderState::Loaded(_)));
}

#[test]
fn test_primary_libraries_bound_in_order() {
    let temp = TempDir::new().unwrap();
    let d3d12 = VariantKey::new(Arch::X64, Driver::D3d12);
    let bundle = Bundle::new(BundleVersion::new("0.1.0", MESA_VERSION))
        .with_file(d3d12, "libgallium_wgl.dll", b"gallium".to_vec())
        .with_file(d3d12, "libglapi.dll", b"glapi".to_vec())
        .with_file(d3d12, "opengl32.dll", b"opengl32".to_vec())
        .with_file(d3d12, "dxil.dll", b"dxil".to_vec());
    let config = LoaderConfig::default()
        .with_cache_root(temp.path())
        .with_driver(Driver::D3d12);
    let mut state = LoaderState::default();
    let mut binder = RecordingBinder::default();

    let report = activate(&mut state, &bundle, &windows("x86_64"), &config, &mut binder).unwrap();

    assert_eq!(
        binder.bound,
        vec![report.path.join("dxil.dll"), report.path.join("opengl32.dll")]
    );
    // Dependencies are extracted for the OS loader to find
    assert!(report.path.join("libglapi.dll").exists());
}

#[test]
fn test_already_provided_is_reported() {
    let temp = TempDir::new().unwrap();
    let llvmpipe = VariantKey::new(Arch::X64, Driver::Llvmpipe);
    let bundle = Bundle::new(BundleVersion::new("0.1.0", MESA_VERSION)).with_file(
        llvmpipe,
        "opengl32.dll",
        b"opengl32".to_vec(),
    );
    let config = LoaderConfig::default().with_cache_root(temp.path());
    let mut state = LoaderState::default();
    let mut binder = RecordingBinder {
        resident: vec![(
            "opengl32.dll".to_string(),
            Residency::Other("C:\\Windows\\System32\\opengl32.dll".to_string()),
        )],
        ..Default::default()
    };

    let report = activate(&mut state, &bundle, &windows("x64"), &config, &mut binder).unwrap();

    assert_eq!(report.load.warnings.len(), 1);
    assert!(matches!(
        &report.load.warnings[0],
        LoadError::AlreadyProvided { library, .. } if library == "opengl32.dll"
    ));
}

#[test]
fn test_second_process_reuses_cache() {
    let temp = TempDir::new().unwrap();
    let config = LoaderConfig::default()
        .with_cache_root(temp.path())
        .with_driver(Driver::D3d12);

    let mut first_state = LoaderState::default();
    let first = activate(
        &mut first_state,
        &bundle(),
        &windows("x64"),
        &config,
        &mut RecordingBinder::default(),
    )
    .unwrap();
    let written = fs::metadata(first.path.join("a.dll")).unwrap().modified().unwrap();

    let mut second_state = LoaderState::default();
    let second = activate(
        &mut second_state,
        &bundle(),
        &windows("x64"),
        &config,
        &mut RecordingBinder::default(),
    )
    .unwrap();

    assert_eq!(first.path, second.path);
    assert_eq!(
        fs::metadata(second.path.join("a.dll")).unwrap().modified().unwrap(),
        written
    );
}

#[test]
fn test_unknown_arch_touches_nothing() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("cache");
    let config = LoaderConfig::default().with_cache_root(&root);
    let mut state = LoaderState::default();
    let mut binder = RecordingBinder::default();

    let err = activate(&mut state, &bundle(), &windows("riscv64"), &config, &mut binder).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedPlatform);
    assert_eq!(err.status_code(), 1);
    assert!(!root.exists());
    assert!(binder.bound.is_empty());
    assert!(matches!(state, LoaderState::Failed(ref f) if f.kind == ErrorKind::UnsupportedPlatform));
}

#[test]
fn test_foreign_os_rejected_unless_allowed() {
    let temp = TempDir::new().unwrap();
    let linux = HostPlatform::new("linux", "x86_64");

    let config = LoaderConfig::default().with_cache_root(temp.path());
    let err = activate(
        &mut LoaderState::default(),
        &bundle(),
        &linux,
        &config,
        &mut RecordingBinder::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedPlatform);

    let config = config.allow_foreign_os(true);
    let report = activate(
        &mut LoaderState::default(),
        &bundle(),
        &linux,
        &config,
        &mut RecordingBinder::default(),
    )
    .unwrap();
    assert_eq!(report.variant, VariantKey::new(Arch::X64, Driver::Llvmpipe));
}
