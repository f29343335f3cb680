//! C FFI for jitsort.
//!
//! This module provides a C-compatible API for generating sort routines
//! from host applications. All public functions use `extern "C"` ABI.
//!
//! # Safety
//!
//! All FFI functions that take raw pointers require:
//! - Element memory laid out as the size/count/sizing arguments describe
//! - Source elements that outlive, unchanged, every call of a generated routine
//! - Routine handles created by `jitsort_routine_new()` and freed at most once

mod routine;
mod types;

// Re-export all FFI types and functions for public use
#[allow(unused_imports)]
pub use routine::*;
#[allow(unused_imports)]
pub use types::*;

/// Version information
pub const JITSORT_VERSION_MAJOR: u32 = 0;
pub const JITSORT_VERSION_MINOR: u32 = 1;
pub const JITSORT_VERSION_PATCH: u32 = 0;

/// Get the version string
#[unsafe(no_mangle)]
pub extern "C" fn jitsort_version() -> *const std::ffi::c_char {
    static VERSION: &[u8] = b"0.1.0\0";
    VERSION.as_ptr() as *const std::ffi::c_char
}

/// Number of buckets generated routines sort into; keys at or above this
/// value are left out of the output.
#[unsafe(no_mangle)]
pub extern "C" fn jitsort_bucket_count() -> usize {
    crate::classify::BUCKET_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(JITSORT_VERSION_MAJOR, 0);
        assert_eq!(JITSORT_VERSION_MINOR, 1);

        let version = unsafe { std::ffi::CStr::from_ptr(jitsort_version()).to_str().unwrap() };
        assert_eq!(version, "0.1.0");
    }

    #[test]
    fn test_bucket_count() {
        assert_eq!(jitsort_bucket_count(), 256);
    }
}
