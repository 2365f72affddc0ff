//! Integration tests for the C activation hook
//!
//! All tests share one process-wide activation, so they only assert
//! properties that hold whichever test runs first.

use mesa_loader_ffi::{
    mesa_loader_activate, mesa_loader_activate_driver, mesa_loader_last_error, mesa_loader_state,
};
use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;

#[test]
#[cfg(not(windows))]
fn test_activate_on_foreign_host_fails_cleanly() {
    let status = mesa_loader_activate();
    assert_eq!(status, 1, "unsupported platform");

    let message = mesa_loader_last_error();
    assert!(!message.is_null());
    let message = unsafe { CStr::from_ptr(message) }.to_str().unwrap();
    assert!(!message.is_empty());

    // Failed
    assert_eq!(mesa_loader_state(), 4);
}

#[test]
fn test_status_is_sticky() {
    let first = mesa_loader_activate();
    let second = mesa_loader_activate();
    let third = unsafe { mesa_loader_activate_driver(b"zink\0".as_ptr() as *const c_char) };

    assert_eq!(first, second);
    assert_eq!(first, third);
    assert!(matches!(mesa_loader_state(), 3 | 4), "activation reached a terminal state");
}

#[test]
fn test_null_driver_is_default() {
    let with_null = unsafe { mesa_loader_activate_driver(ptr::null()) };
    let without = mesa_loader_activate();
    assert_eq!(with_null, without);

    if with_null == 0 {
        assert!(mesa_loader_last_error().is_null());
    } else {
        assert!(!mesa_loader_last_error().is_null());
    }
}
