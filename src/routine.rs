//! Finalized sort routines and the buffers they return.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::jit::{BodyStats, ExecutableMemory, Image};
use crate::primitives::FreeFn;

/// Signature of a generated routine: no arguments, returns the output base.
pub type EntryPoint = unsafe extern "C" fn() -> *mut c_void;

/// A generated sort routine.
///
/// The routine embeds the absolute addresses of the source elements, so it
/// borrows the source for `'src`. Dropping the routine unmaps its code
/// region; `leak` keeps the region mapped for the rest of the process.
pub struct SortRoutine<'src> {
    memory: ExecutableMemory,
    code_len: usize,
    stats: BodyStats,
    output_len: usize,
    placed_len: usize,
    free: FreeFn,
    _source: PhantomData<&'src [u8]>,
}

impl<'src> SortRoutine<'src> {
    pub(crate) fn new(image: Image, free: FreeFn) -> Self {
        Self {
            memory: image.memory,
            code_len: image.code_len,
            stats: image.stats,
            output_len: image.output_len,
            placed_len: image.placed_len,
            free,
            _source: PhantomData,
        }
    }

    /// Raw entry point. Calling it is only sound while this routine is alive
    /// and the source elements are unchanged.
    pub fn entry_point(&self) -> EntryPoint {
        // SAFETY: the region is executable and starts with a complete routine.
        unsafe { std::mem::transmute::<*const u8, EntryPoint>(self.memory.as_ptr()) }
    }

    /// Run the routine, producing a freshly allocated sorted copy.
    ///
    /// Returns `None` when the allocation primitive returned null for a
    /// non-empty output.
    pub fn run(&self) -> Option<SortedOutput> {
        let ptr = unsafe { (self.entry_point())() } as *mut u8;
        if ptr.is_null() && self.output_len > 0 {
            return None;
        }
        Some(SortedOutput::from_raw(ptr, self.placed_len, self.free))
    }

    /// Size in bytes of every output buffer this routine allocates: the sum
    /// of all valid element lengths, including elements whose key is out of
    /// range.
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    /// Leading bytes of each output buffer that hold sorted elements. Equal
    /// to `output_len` unless some keys are out of range; the bytes past it
    /// are left as the allocator returned them.
    pub fn placed_len(&self) -> usize {
        self.placed_len
    }

    /// Number of copy groups in the routine body.
    pub fn groups(&self) -> usize {
        self.stats.groups
    }

    /// The generated machine code, without NOP padding.
    pub fn code(&self) -> &[u8] {
        &self.memory.bytes()[..self.code_len]
    }

    /// Size of the mapped code region.
    pub fn region_size(&self) -> usize {
        self.memory.size()
    }

    /// Keep the code region mapped forever and return its entry point.
    pub fn leak(self) -> EntryPoint {
        let entry = self.entry_point();
        let _ = self.memory.leak();
        entry
    }
}

impl std::fmt::Debug for SortRoutine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortRoutine")
            .field("entry", &self.memory.as_ptr())
            .field("code_len", &self.code_len)
            .field("groups", &self.stats.groups)
            .field("output_len", &self.output_len)
            .field("placed_len", &self.placed_len)
            .finish()
    }
}

/// The sorted elements at the start of a routine's output buffer. The buffer
/// is released through the routine's allocation family on drop.
pub struct SortedOutput {
    ptr: Option<NonNull<u8>>,
    len: usize,
    free: FreeFn,
}

impl SortedOutput {
    fn from_raw(ptr: *mut u8, len: usize, free: FreeFn) -> Self {
        Self {
            ptr: NonNull::new(ptr),
            len,
            free,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.ptr {
            // SAFETY: the routine wrote exactly `len` bytes into this block.
            Some(ptr) if self.len > 0 => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), self.len)
            },
            _ => &[],
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.map_or(std::ptr::null(), |p| p.as_ptr() as *const u8)
    }

    /// Hand the buffer to the caller, who must release it with the same
    /// allocation family.
    pub fn into_raw(self) -> *mut u8 {
        let ptr = self.ptr.map_or(std::ptr::null_mut(), NonNull::as_ptr);
        std::mem::forget(self);
        ptr
    }
}

impl std::ops::Deref for SortedOutput {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::fmt::Debug for SortedOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedOutput")
            .field("ptr", &self.as_ptr())
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for SortedOutput {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr {
            unsafe { (self.free)(ptr.as_ptr() as *mut c_void) };
        }
    }
}
