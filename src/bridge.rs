//! The calling side of the native bridge.
//!
//! A [`Bridge`] holds two foreign functions: `call`, which takes a borrowed
//! NUL-terminated string and returns a new one, and `release`, which frees
//! what `call` returned. Every buffer that comes back from `call` is released
//! exactly once, whether or not it decodes.

use crate::error::BridgeError;
use crate::export::{rustdemo, rustdemo_free};
use crate::load::{load_resolved, resolve_for_this_platform, Function, NativeLibrary};
use crate::manifest::Symbols;
use crate::resolve::resolve;
use anyhow::Result;
use log::{debug, trace};
use std::ffi::{c_char, CStr, CString};
use std::path::Path;

pub type CallFunction = Function<(*const c_char,), *mut c_char>;
pub type ReleaseFunction = Function<(*mut c_char,), ()>;

pub struct Bridge {
    symbols: Symbols,
    call: CallFunction,
    release: ReleaseFunction,
    // Declared last so the symbols above are gone before the library unloads.
    _library: Option<NativeLibrary>,
}

/// A buffer returned by the foreign `call`, released on drop.
struct ForeignString<'a> {
    ptr: *mut c_char,
    release: &'a ReleaseFunction,
}

impl ForeignString<'_> {
    fn as_c_str(&self) -> &CStr {
        // Non-null by construction; the callee promises NUL termination.
        unsafe { CStr::from_ptr(self.ptr) }
    }
}

impl Drop for ForeignString<'_> {
    fn drop(&mut self) {
        trace!("releasing foreign buffer {:p}", self.ptr);
        self.release.call((self.ptr,));
    }
}

impl Bridge {
    /// Binds to this crate's own `rustdemo` and `rustdemo_free` exports.
    pub fn linked() -> Self {
        let call: unsafe extern "C" fn(*const c_char) -> *mut c_char = rustdemo;
        let release: unsafe extern "C" fn(*mut c_char) = rustdemo_free;

        Self {
            symbols: Symbols::default(),
            call: Function::Linked(call),
            release: Function::Linked(release),
            _library: None,
        }
    }

    /// Binds to foreign functions that are already in hand.
    ///
    /// `release` must free exactly the buffers `call` returns.
    pub fn from_functions(symbols: Symbols, call: CallFunction, release: ReleaseFunction) -> Self {
        Self {
            symbols,
            call,
            release,
            _library: None,
        }
    }

    /// Resolves `symbols` in `library` and takes ownership of it.
    pub fn from_library(library: NativeLibrary, symbols: Symbols) -> Result<Self> {
        let call = library.get_function(&symbols.call)?;
        let release = library.get_function(&symbols.release)?;

        debug!("bridge bound to {} / {}", symbols.call, symbols.release);

        Ok(Self {
            symbols,
            call,
            release,
            _library: Some(library),
        })
    }

    /// Loads the library described by `manifest_path` for the build target,
    /// falling back to the manifest's `any` entry.
    pub fn open(manifest_path: &Path) -> Result<Self> {
        let resolved = resolve_for_this_platform(manifest_path)?;
        let library = load_resolved(&resolved)?;
        Self::from_library(library, resolved.symbols)
    }

    pub fn open_with_platform(manifest_path: &Path, platform: &str) -> Result<Self> {
        let resolved = resolve(manifest_path, platform)?;
        let library = load_resolved(&resolved)?;
        Self::from_library(library, resolved.symbols)
    }

    pub fn symbols(&self) -> &Symbols {
        &self.symbols
    }

    /// Passes `input` across the boundary and decodes the answer.
    pub fn call(&self, input: &str) -> Result<String, BridgeError> {
        let input = CString::new(input).map_err(|e| BridgeError::InteriorNul {
            position: e.nul_position(),
        })?;

        trace!("calling {} with {} bytes", self.symbols.call, input.as_bytes().len());
        let ptr = self.call.call((input.as_ptr(),));
        drop(input);

        if ptr.is_null() {
            return Err(BridgeError::NullReturn {
                symbol: self.symbols.call.clone(),
            });
        }

        let output = ForeignString {
            ptr,
            release: &self.release,
        };

        match output.as_c_str().to_str() {
            Ok(text) => Ok(text.to_owned()),
            Err(_) => Err(BridgeError::InvalidUtf8 {
                symbol: self.symbols.call.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn linked_bridge_greets() {
        let bridge = Bridge::linked();

        assert_eq!(bridge.call("golang").unwrap(), "golang Rust say: Hello Go ");

        let output = bridge.call("Go say: Hello Rust").unwrap();
        assert!(!output.is_empty());
        assert!(output.starts_with("Go say: Hello Rust"));
    }

    #[test]
    fn linked_bridge_handles_empty_and_unicode_input() {
        let bridge = Bridge::linked();

        assert_eq!(bridge.call("").unwrap(), " Rust say: Hello Go ");
        assert_eq!(bridge.call("héllo 世界").unwrap(), "héllo 世界 Rust say: Hello Go ");
    }

    #[test]
    fn interior_nul_is_rejected_before_calling() {
        let err = Bridge::linked().call("go\0lang").unwrap_err();
        assert!(matches!(err, BridgeError::InteriorNul { position: 2 }));
    }

    static RELEASED: AtomicUsize = AtomicUsize::new(0);
    static INVALID: [u8; 3] = [0xc3, 0x28, 0x00];
    static VALID: [u8; 7] = *b"golang\0";

    unsafe extern "C" fn null_call(_: *const c_char) -> *mut c_char {
        ptr::null_mut()
    }

    unsafe extern "C" fn invalid_call(_: *const c_char) -> *mut c_char {
        INVALID.as_ptr() as *mut c_char
    }

    unsafe extern "C" fn valid_call(_: *const c_char) -> *mut c_char {
        VALID.as_ptr() as *mut c_char
    }

    unsafe extern "C" fn counting_release(_: *mut c_char) {
        RELEASED.fetch_add(1, Ordering::SeqCst);
    }

    fn counting_bridge(call: unsafe extern "C" fn(*const c_char) -> *mut c_char) -> Bridge {
        let release: unsafe extern "C" fn(*mut c_char) = counting_release;
        Bridge::from_functions(Symbols::default(), Function::Linked(call), Function::Linked(release))
    }

    #[test]
    fn foreign_failures_are_typed() {
        let before = RELEASED.load(Ordering::SeqCst);

        let null_bridge = counting_bridge(null_call);
        assert!(matches!(
            null_bridge.call("x").unwrap_err(),
            BridgeError::NullReturn { .. }
        ));

        let invalid_bridge = counting_bridge(invalid_call);
        assert!(matches!(
            invalid_bridge.call("x").unwrap_err(),
            BridgeError::InvalidUtf8 { .. }
        ));
        // Null is never released; the undecodable buffer is released once.
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 1);

        let valid_bridge = counting_bridge(valid_call);
        assert_eq!(valid_bridge.call("x").unwrap(), "golang");
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 2);
        assert_eq!(valid_bridge.call("y").unwrap(), "golang");
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 3);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn bridges_through_a_loaded_library() {
        let library = crate::load::load_library("libc.so.6").unwrap();
        let bridge = Bridge::from_library(
            library,
            Symbols {
                call: "strdup".to_string(),
                release: "free".to_string(),
            },
        )
        .unwrap();

        assert_eq!(bridge.call("Go say: Hello Rust").unwrap(), "Go say: Hello Rust");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn opens_from_manifest_with_any_fallback() {
        let dir = tempfile::TempDir::new().unwrap();
        let manifest = dir.path().join("libc.json");
        std::fs::write(
            &manifest,
            r#"{
                "spec-version": "1.0.0",
                "symbols": { "call": "strdup", "release": "free" },
                "platforms": { "any": { "path": "libc.so.6" } }
            }"#,
        )
        .unwrap();

        let bridge = Bridge::open(&manifest).unwrap();
        assert_eq!(bridge.symbols().call, "strdup");
        assert_eq!(bridge.call("golang").unwrap(), "golang");
    }
}
