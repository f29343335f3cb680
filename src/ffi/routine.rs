//! Routine generation FFI functions.

#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::c_void;

use log::debug;

use super::types::{JitsortFn, JitsortRoutine, JitsortSizeFn, RoutineWrapper, get_wrapper};
use crate::generate::Generator;
use crate::routine::SortRoutine;

unsafe fn generate_routine(
    ptr: *const c_void,
    size: usize,
    len: usize,
    func: JitsortSizeFn,
) -> Option<SortRoutine<'static>> {
    let sizing = func.map(|f| move |elem: *const u8| unsafe { f(elem as *const c_void) });
    let sizing_ref = sizing.as_ref().map(|f| f as &dyn Fn(*const u8) -> usize);

    match Generator::default().generate_raw(ptr as *const u8, size, len, sizing_ref) {
        Ok(routine) => Some(routine),
        Err(e) => {
            debug!("jitsort: {}", e);
            None
        }
    }
}

/// Generate a routine that returns a sorted copy of the array at `ptr`.
///
/// `size` and `len` describe `len` elements of `size` bytes. When `func` is
/// given it supplies each element's length instead; with `size` or `len`
/// zero the elements are taken to be packed back to back. Returns NULL for
/// invalid arguments or when no code memory is available.
///
/// The routine's code memory is never released.
///
/// # Example (C)
/// ```c
/// int ints[] = {3, 1, 2};
/// void *(*f)(void) = jitsort(ints, sizeof(int), 3, NULL);
/// int *sorted = f();
/// free(sorted);
/// ```
///
/// # Safety
///
/// - `ptr` must address elements laid out as described
/// - The elements must stay valid and unchanged while `f` may be called
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitsort(
    ptr: *const c_void,
    size: usize,
    len: usize,
    func: JitsortSizeFn,
) -> JitsortFn {
    generate_routine(ptr, size, len, func).map(SortRoutine::leak)
}

/// Generate a routine and return an owning handle, or NULL on failure.
///
/// The handle must be freed with `jitsort_routine_free()`.
///
/// # Safety
///
/// Same as `jitsort()`; the elements must outlive the handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitsort_routine_new(
    ptr: *const c_void,
    size: usize,
    len: usize,
    func: JitsortSizeFn,
) -> *mut JitsortRoutine {
    match generate_routine(ptr, size, len, func) {
        Some(routine) => {
            let wrapper = Box::new(RoutineWrapper { routine });
            Box::into_raw(wrapper) as *mut JitsortRoutine
        }
        None => std::ptr::null_mut(),
    }
}

/// Get the entry point of a routine handle.
///
/// The returned pointer is valid until `jitsort_routine_free()`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitsort_routine_entry(routine: *const JitsortRoutine) -> JitsortFn {
    get_wrapper(routine).map(|w| w.routine.entry_point())
}

/// Run a routine, returning a new sorted buffer (or NULL if allocation
/// failed or `routine` is NULL).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitsort_routine_call(routine: *const JitsortRoutine) -> *mut c_void {
    match get_wrapper(routine) {
        Some(wrapper) => (wrapper.routine.entry_point())(),
        None => std::ptr::null_mut(),
    }
}

/// Byte length of the buffers a routine returns: the sum of the lengths of
/// all valid elements, whether or not their key is in range.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitsort_routine_output_len(routine: *const JitsortRoutine) -> usize {
    get_wrapper(routine).map_or(0, |w| w.routine.output_len())
}

/// Leading bytes of each returned buffer that hold sorted elements. Less
/// than `jitsort_routine_output_len()` when some keys are 256 or more; the
/// rest of the buffer is uninitialized.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitsort_routine_placed_len(routine: *const JitsortRoutine) -> usize {
    get_wrapper(routine).map_or(0, |w| w.routine.placed_len())
}

/// Free a routine handle and unmap its code.
///
/// # Safety
///
/// - `routine` must come from `jitsort_routine_new()` and not be freed already
/// - No call of its entry point may be in progress or happen afterwards
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitsort_routine_free(routine: *mut JitsortRoutine) {
    if routine.is_null() {
        return;
    }
    let _ = Box::from_raw(routine as *mut RoutineWrapper);
}

/// Release a buffer returned by a routine.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn jitsort_output_free(output: *mut c_void) {
    libc::free(output);
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn never_size(_: *const c_void) -> usize {
        0
    }

    #[test]
    fn test_invalid_arguments() {
        unsafe {
            assert!(jitsort(std::ptr::null(), 4, 5, None).is_none());
            let ints = [3i32, 1, 2];
            assert!(jitsort(ints.as_ptr() as *const c_void, 0, 0, None).is_none());
            assert!(jitsort_routine_new(std::ptr::null(), 4, 3, None).is_null());
        }
    }

    #[test]
    fn test_null_handle() {
        unsafe {
            assert!(jitsort_routine_entry(std::ptr::null()).is_none());
            assert!(jitsort_routine_call(std::ptr::null()).is_null());
            assert_eq!(jitsort_routine_output_len(std::ptr::null()), 0);
            assert_eq!(jitsort_routine_placed_len(std::ptr::null()), 0);
            // Should not crash
            jitsort_routine_free(std::ptr::null_mut());
            jitsort_output_free(std::ptr::null_mut());
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_jitsort_ints() {
        let ints = [3i32, 1, 2];
        unsafe {
            let f = jitsort(ints.as_ptr() as *const c_void, 4, 3, None).unwrap();
            let sorted = f() as *mut i32;
            assert!(!sorted.is_null());
            assert_eq!(std::slice::from_raw_parts(sorted, 3), &[1, 2, 3]);
            jitsort_output_free(sorted as *mut c_void);
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_routine_handle_lifecycle() {
        let chars = *b"cab";
        unsafe {
            let routine = jitsort_routine_new(chars.as_ptr() as *const c_void, 1, 3, None);
            assert!(!routine.is_null());
            assert!(jitsort_routine_entry(routine).is_some());
            assert_eq!(jitsort_routine_output_len(routine), 3);

            let first = jitsort_routine_call(routine) as *mut u8;
            let second = jitsort_routine_call(routine) as *mut u8;
            assert_ne!(first, second);
            assert_eq!(std::slice::from_raw_parts(first, 3), b"abc");
            assert_eq!(std::slice::from_raw_parts(second, 3), b"abc");

            jitsort_output_free(first as *mut c_void);
            jitsort_output_free(second as *mut c_void);
            jitsort_routine_free(routine);
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_output_len_counts_out_of_range_elements() {
        let ints = [5u32, 1000, 3];
        unsafe {
            let routine = jitsort_routine_new(ints.as_ptr() as *const c_void, 4, 3, None);
            assert!(!routine.is_null());
            assert_eq!(jitsort_routine_output_len(routine), 12);
            assert_eq!(jitsort_routine_placed_len(routine), 8);

            let sorted = jitsort_routine_call(routine) as *mut u32;
            assert_eq!(std::slice::from_raw_parts(sorted, 2), &[3, 5]);
            jitsort_output_free(sorted as *mut c_void);
            jitsort_routine_free(routine);
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_sizing_zero_first_gives_empty_routine() {
        let data = [9u8; 4];
        unsafe {
            let routine =
                jitsort_routine_new(data.as_ptr() as *const c_void, 0, 0, Some(never_size));
            assert!(!routine.is_null());
            assert_eq!(jitsort_routine_output_len(routine), 0);
            jitsort_output_free(jitsort_routine_call(routine));
            jitsort_routine_free(routine);
        }
    }
}
