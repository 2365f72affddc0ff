//! C activation hook for the Mesa3D loader
//!
//! Exposes the one-shot activation as plain C functions so any host (a
//! launcher, a JVM agent shim, a plugin loader) can trigger it:
//! - No inputs beyond an optional driver name
//! - Integer status output, never an unwinding panic
//! - Failure message retrievable after the fact

use mesa_loader::{ActivationError, ErrorKind};
use parking_lot::{const_mutex, Mutex};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

/// Activation succeeded
pub const MESA_LOADER_OK: c_int = 0;

/// Message of the most recent failure, if any
static LAST_ERROR: Mutex<Option<CString>> = const_mutex(None);

// ============================================================================
// Helper Functions
// ============================================================================

fn set_last_error(message: &str) {
    // CString cannot hold interior NULs
    let message = CString::new(message.replace('\0', " ")).ok();
    *LAST_ERROR.lock() = message;
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run activation, converting the outcome into a status code
fn activate(driver: Option<&str>) -> c_int {
    mesa_loader::logging::init();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| mesa_loader::ensure_loaded(driver)));

    match outcome {
        Ok(Ok(_)) => {
            *LAST_ERROR.lock() = None;
            MESA_LOADER_OK
        }
        Ok(Err(err)) => report(&err),
        Err(payload) => {
            let message = format!("Internal error: {}", panic_message(&*payload));
            tracing::error!("{}", message);
            set_last_error(&message);
            ErrorKind::Internal.status_code()
        }
    }
}

fn report(err: &ActivationError) -> c_int {
    set_last_error(&err.to_string());
    err.status_code()
}

// ============================================================================
// Activation Hook
// ============================================================================

/// Activate the embedded Mesa3D libraries for this process
///
/// The driver is read from `MESA_LOADER_DRIVER` (default `llvmpipe`). Only the
/// first call does any work; later calls return the first call's status.
///
/// # Returns
/// * `0` on success
/// * `1` unsupported platform, `2` extraction failed, `3` I/O failure,
///   `4` load failed, `5` invalid configuration
/// * `-1` internal error
///
/// # Example (C)
/// ```c
/// if (mesa_loader_activate() != 0) {
///     fprintf(stderr, "Mesa3D unavailable: %s\n", mesa_loader_last_error());
/// }
/// ```
#[no_mangle]
pub extern "C" fn mesa_loader_activate() -> c_int {
    activate(None)
}

/// Activate with an explicit driver name (`llvmpipe`, `d3d12`, `zink`)
///
/// A NULL or empty `driver` behaves like [`mesa_loader_activate`].
///
/// # Safety
/// `driver` must be NULL or point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn mesa_loader_activate_driver(driver: *const c_char) -> c_int {
    if driver.is_null() {
        return activate(None);
    }

    let driver = CStr::from_ptr(driver).to_string_lossy();
    activate(Some(driver.as_ref()))
}

/// Current activation state
///
/// `0` unresolved, `1` resolved, `2` materialized, `3` loaded, `4` failed.
#[no_mangle]
pub extern "C" fn mesa_loader_state() -> c_int {
    panic::catch_unwind(|| mesa_loader::state().code()).unwrap_or(ErrorKind::Internal.status_code())
}

/// Message of the last failed activation, or NULL
///
/// The string is owned by the library and stays valid until the next
/// activation call.
#[no_mangle]
pub extern "C" fn mesa_loader_last_error() -> *const c_char {
    LAST_ERROR
        .lock()
        .as_ref()
        .map_or(ptr::null(), |message| message.as_ptr())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }

    #[test]
    fn test_set_last_error_strips_nul() {
        set_last_error("bad\0message");
        let message = unsafe { CStr::from_ptr(mesa_loader_last_error()) };
        assert_eq!(message.to_str().unwrap(), "bad message");
    }
}
