//! C ABI exports of the `cdylib`.
//!
//! Ownership: the input of `rustdemo` stays owned by the caller and is only
//! read during the call. The returned buffer is allocated here and owned by
//! the caller, who must hand it back to `rustdemo_free` exactly once.

use log::{info, warn};
use std::ffi::{c_char, CStr, CString};
use std::ptr;

pub const GREETING_SUFFIX: &str = " Rust say: Hello Go ";

/// Appends the greeting to `input`. This is the text behind `rustdemo`.
pub fn greet(input: &str) -> String {
    let mut greeting = String::with_capacity(input.len() + GREETING_SUFFIX.len());
    greeting.push_str(input);
    greeting.push_str(GREETING_SUFFIX);
    greeting
}

/// Returns a new NUL-terminated string, or null when `name` is null or not
/// UTF-8. Release the result with [`rustdemo_free`].
///
/// # Safety
///
/// `name` must be null or point to a NUL-terminated buffer that stays valid
/// for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn rustdemo(name: *const c_char) -> *mut c_char {
    if name.is_null() {
        warn!("rustdemo called with a null input");
        return ptr::null_mut();
    }

    let Ok(input) = CStr::from_ptr(name).to_str() else {
        warn!("rustdemo input is not valid UTF-8");
        return ptr::null_mut();
    };
    info!("Rust get Input:  \"{}\"", input);

    // The input came from a CStr, so the only NUL is the terminator.
    match CString::new(greet(input)) {
        Ok(output) => output.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Releases a buffer returned by [`rustdemo`]. Null is ignored.
///
/// # Safety
///
/// `ptr` must be null or a pointer obtained from `rustdemo` that has not been
/// released yet.
#[no_mangle]
pub unsafe extern "C" fn rustdemo_free(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    drop(CString::from_raw(ptr));
}
