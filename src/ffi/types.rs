//! FFI type definitions for the C API.

use std::ffi::c_void;

use crate::routine::SortRoutine;

/// Sizing callback: byte length of the element at `elem`, or 0 for
/// "invalid or end of sequence".
pub type JitsortSizeFn = Option<unsafe extern "C" fn(elem: *const c_void) -> usize>;

/// A generated routine: returns a `malloc`'d buffer holding the sorted
/// elements. Release it with `free()` or `jitsort_output_free()`.
pub type JitsortFn = Option<unsafe extern "C" fn() -> *mut c_void>;

/// Opaque routine handle.
///
/// Unlike the bare function pointer returned by `jitsort()`, a handle owns
/// its code region and unmaps it in `jitsort_routine_free()`.
#[repr(C)]
pub struct JitsortRoutine {
    _private: [u8; 0],
}

/// Internal wrapper behind a `JitsortRoutine` pointer.
pub(crate) struct RoutineWrapper {
    pub routine: SortRoutine<'static>,
}

/// Borrow the wrapper behind a handle, if non-null.
pub(crate) unsafe fn get_wrapper<'a>(routine: *const JitsortRoutine) -> Option<&'a RoutineWrapper> {
    if routine.is_null() {
        None
    } else {
        Some(unsafe { &*(routine as *const RoutineWrapper) })
    }
}
