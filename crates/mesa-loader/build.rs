//! Build script for embedding the Mesa3D native libraries
//!
//! Walks the bundle directory (`natives/` inside this crate, or the directory
//! named by `MESA_LOADER_BUNDLE_DIR`) laid out as `<arch>/<driver>/<file>`,
//! records the size and SHA-256 of every file and generates an index that
//! embeds the bytes with `include_bytes!`.

use sha2::{Digest, Sha256};
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

#[path = "src/bundle/layout.rs"]
mod layout;

use layout::{classify, EntryKind, VERSION_FILE};

struct BundleFile {
    key: String,
    path: PathBuf,
    size: u64,
    sha256: String,
}

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src/bundle/layout.rs");
    println!("cargo:rerun-if-env-changed=MESA_LOADER_BUNDLE_DIR");
    let bundle_dir = env::var_os("MESA_LOADER_BUNDLE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(&manifest_dir).join("natives"));
    // Cargo scans a watched directory recursively
    if bundle_dir.is_dir() {
        println!("cargo:rerun-if-changed={}", bundle_dir.display());
    }

    let version = version_properties(&bundle_dir);
    let files = collect_files(&bundle_dir);

    let index_path = Path::new(&out_dir).join("embedded_bundle.rs");
    fs::write(&index_path, generate_index(&version, &files)).expect("Failed to write index");

    if files.is_empty() {
        println!(
            "cargo:warning=No native libraries found under {}; the embedded bundle is empty",
            bundle_dir.display()
        );
    }
}

/// Read `version.properties`, stamping `loader.version` with the crate
/// version when the file does not set it.
fn version_properties(bundle_dir: &Path) -> String {
    let path = bundle_dir.join(VERSION_FILE);
    let mut text = fs::read_to_string(&path).unwrap_or_default();
    let has_loader_version = text.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("loader.version")
            && line["loader.version".len()..]
                .trim_start()
                .starts_with(['=', ':'])
    });

    if !has_loader_version {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        let _ = writeln!(text, "loader.version={}", env::var("CARGO_PKG_VERSION").unwrap());
    }

    text
}

fn collect_files(bundle_dir: &Path) -> Vec<BundleFile> {
    let mut files = Vec::new();
    walk(bundle_dir, &mut Vec::new(), &mut files);
    files
}

/// Collect `<arch>/<driver>/<file>` entries below `dir`, warning about
/// anything else.
fn walk(dir: &Path, rel: &mut Vec<String>, files: &mut Vec<BundleFile>) {
    for path in sorted_entries(dir) {
        rel.push(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        let kind = {
            let components: Vec<&str> = rel.iter().map(String::as_str).collect();
            classify(&components, path.is_dir())
        };
        let key = rel.join("/");

        match kind {
            EntryKind::Version => {}
            EntryKind::Container => walk(&path, rel, files),
            EntryKind::Library => {
                let bytes = fs::read(&path)
                    .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
                files.push(BundleFile {
                    key,
                    size: bytes.len() as u64,
                    sha256: hex::encode(Sha256::digest(&bytes)),
                    path: fs::canonicalize(&path).unwrap_or(path),
                });
            }
            EntryKind::Unexpected(what) => {
                println!("cargo:warning=Skipping unknown {} '{}' in the bundle", what, key);
            }
        }

        rel.pop();
    }
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|entry| entry.ok().map(|e| e.path())).collect(),
        Err(_) => Vec::new(),
    };
    paths.sort();
    paths
}

fn generate_index(version: &str, files: &[BundleFile]) -> String {
    let mut code = String::new();

    code.push_str("/// `version.properties` of the embedded bundle\n");
    let _ = writeln!(code, "static VERSION_PROPERTIES: &str = {:?};\n", version);

    code.push_str("/// Embedded native library files\n");
    code.push_str("static EMBEDDED_FILES: &[EmbeddedFile] = &[\n");
    for file in files {
        let _ = writeln!(
            code,
            "    EmbeddedFile {{ path: {:?}, size: {}, sha256: {:?}, data: include_bytes!({:?}) }},",
            file.key,
            file.size,
            file.sha256,
            file.path.to_string_lossy()
        );
    }
    code.push_str("];\n");

    code
}
