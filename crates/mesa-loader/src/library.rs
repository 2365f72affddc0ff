//! Dynamic library binding
//!
//! Cross-platform support for mapping shared libraries into the process.
//! A `Library` is never closed: binding is irreversible for the lifetime of
//! the process, which is what a replacement `opengl32.dll` needs.

use std::path::{Path, PathBuf};

use crate::binder::LoadError;

/// Whether a library with a given file name is already mapped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Residency {
    /// Nothing with that name is loaded
    NotLoaded,
    /// The exact file we would load is already mapped
    Ours,
    /// A different file with the same name is mapped
    Other(String),
}

/// Handle to a bound dynamic library
pub struct Library {
    #[allow(dead_code)]
    handle: LibraryHandle,
    path: PathBuf,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("path", &self.path).finish()
    }
}

impl Library {
    /// Bind the library at `path`.
    ///
    /// # Platform-specific behavior
    ///
    /// - **Windows**: `LoadLibraryExW` with `LOAD_WITH_ALTERED_SEARCH_PATH`, so
    ///   the library's own dependencies resolve from its directory first
    /// - **Unix**: `dlopen(RTLD_NOW | RTLD_GLOBAL)`
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        let handle = LibraryHandle::load(path)?;

        Ok(Library {
            handle,
            path: path.to_path_buf(),
        })
    }

    /// Path this library was bound from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a library named like `path`'s file name is already mapped,
    /// and whether it is `path` itself.
    pub fn residency(path: &Path) -> Residency {
        LibraryHandle::residency(path)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn incompatible(path: &Path, reason: impl Into<String>) -> LoadError {
    LoadError::Incompatible {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

// Platform-specific implementations

#[cfg(unix)]
type LibraryHandle = UnixLibrary;

#[cfg(windows)]
type LibraryHandle = WindowsLibrary;

// ============================================================================
// Unix Implementation (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
struct UnixLibrary {
    handle: *mut std::ffi::c_void,
}

#[cfg(unix)]
impl UnixLibrary {
    fn load(path: &Path) -> Result<Self, LoadError> {
        use std::os::unix::ffi::OsStrExt;

        let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
            .map_err(|e| incompatible(path, format!("Invalid path: {}", e)))?;

        let handle = unsafe {
            // RTLD_GLOBAL: libraries loaded later resolve GL symbols through it
            libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL)
        };

        if handle.is_null() {
            return Err(incompatible(path, dl_error()));
        }

        Ok(UnixLibrary { handle })
    }

    fn residency(path: &Path) -> Residency {
        use std::os::unix::ffi::OsStrExt;

        let probe = |bytes: &[u8]| -> bool {
            let Ok(c_name) = std::ffi::CString::new(bytes) else {
                return false;
            };
            unsafe {
                let handle = libc::dlopen(c_name.as_ptr(), libc::RTLD_NOW | libc::RTLD_NOLOAD);
                if handle.is_null() {
                    libc::dlerror();
                    false
                } else {
                    // RTLD_NOLOAD still takes a reference
                    libc::dlclose(handle);
                    true
                }
            }
        };

        if probe(path.as_os_str().as_bytes()) {
            return Residency::Ours;
        }

        let name = file_name(path);
        if !name.is_empty() && probe(name.as_bytes()) {
            return Residency::Other(name);
        }

        Residency::NotLoaded
    }
}

#[cfg(unix)]
fn dl_error() -> String {
    unsafe {
        let err_ptr = libc::dlerror();
        if err_ptr.is_null() {
            "Unknown error".to_string()
        } else {
            std::ffi::CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
        }
    }
}

#[cfg(unix)]
unsafe impl Send for UnixLibrary {}
#[cfg(unix)]
unsafe impl Sync for UnixLibrary {}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
struct WindowsLibrary {
    handle: *mut std::ffi::c_void,
}

#[cfg(windows)]
const LOAD_WITH_ALTERED_SEARCH_PATH: u32 = 0x0000_0008;

#[cfg(windows)]
const MAX_MODULE_PATH: usize = 32 * 1024;

#[cfg(windows)]
fn to_wide(s: &std::ffi::OsStr) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    s.encode_wide().chain(std::iter::once(0)).collect()
}

#[cfg(windows)]
impl WindowsLibrary {
    fn load(path: &Path) -> Result<Self, LoadError> {
        let wide = to_wide(path.as_os_str());

        let handle = unsafe {
            LoadLibraryExW(wide.as_ptr(), std::ptr::null_mut(), LOAD_WITH_ALTERED_SEARCH_PATH)
        };

        if handle.is_null() {
            let error = unsafe { GetLastError() };
            return Err(incompatible(path, format!("error code: {}", error)));
        }

        Ok(WindowsLibrary { handle })
    }

    fn residency(path: &Path) -> Residency {
        let name = file_name(path);
        if name.is_empty() {
            return Residency::NotLoaded;
        }

        let wide = to_wide(std::ffi::OsStr::new(&name));
        let module = unsafe { GetModuleHandleW(wide.as_ptr()) };
        if module.is_null() {
            return Residency::NotLoaded;
        }

        let mut buf = vec![0u16; MAX_MODULE_PATH];
        let len = unsafe { GetModuleFileNameW(module, buf.as_mut_ptr(), buf.len() as u32) };
        let loaded = String::from_utf16_lossy(&buf[..len as usize]);

        // Windows paths compare case-insensitively
        if loaded.eq_ignore_ascii_case(&path.display().to_string()) {
            Residency::Ours
        } else if loaded.is_empty() {
            Residency::Other(name)
        } else {
            Residency::Other(loaded)
        }
    }
}

#[cfg(windows)]
unsafe impl Send for WindowsLibrary {}
#[cfg(windows)]
unsafe impl Sync for WindowsLibrary {}

// Windows FFI declarations
#[cfg(windows)]
#[link(name = "kernel32")]
extern "system" {
    fn LoadLibraryExW(
        filename: *const u16,
        file: *mut std::ffi::c_void,
        flags: u32,
    ) -> *mut std::ffi::c_void;
    fn GetModuleHandleW(module_name: *const u16) -> *mut std::ffi::c_void;
    fn GetModuleFileNameW(module: *mut std::ffi::c_void, filename: *mut u16, size: u32) -> u32;
    fn GetLastError() -> u32;
}
