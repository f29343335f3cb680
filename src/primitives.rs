//! External allocation and copy primitives called from generated code.
//!
//! Their addresses are baked into every routine as 64-bit immediates, so
//! they must stay mapped at the same address for as long as any routine
//! that references them can run.

use std::ffi::c_void;

/// `void *alloc(size_t)`
pub type AllocFn = unsafe extern "C" fn(usize) -> *mut c_void;
/// `void *copy(void *dst, const void *src, size_t n)`
pub type CopyFn = unsafe extern "C" fn(*mut c_void, *const c_void, usize) -> *mut c_void;
/// `void free(void *)`, releasing what `AllocFn` returned
pub type FreeFn = unsafe extern "C" fn(*mut c_void);

/// One allocation family plus the byte copy used by generated routines.
#[derive(Debug, Clone, Copy)]
pub struct Primitives {
    alloc: AllocFn,
    copy: CopyFn,
    free: FreeFn,
}

impl Primitives {
    /// Use a custom allocation family.
    ///
    /// # Safety
    /// `alloc` must return either null or a block of at least the requested
    /// size that `free` accepts, and `copy` must behave like `memcpy`. All
    /// three must remain mapped for the life of every routine built with them.
    pub unsafe fn new(alloc: AllocFn, copy: CopyFn, free: FreeFn) -> Self {
        Self { alloc, copy, free }
    }

    /// The libc `malloc` / `memcpy` / `free` family.
    pub fn libc() -> Self {
        Self {
            alloc: libc::malloc,
            copy: libc::memcpy,
            free: libc::free,
        }
    }

    pub fn alloc_addr(&self) -> u64 {
        self.alloc as usize as u64
    }

    pub fn copy_addr(&self) -> u64 {
        self.copy as usize as u64
    }

    pub fn free_fn(&self) -> FreeFn {
        self.free
    }
}

impl Default for Primitives {
    fn default() -> Self {
        Self::libc()
    }
}
