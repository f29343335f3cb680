//! Executable memory management using mmap.
//!
//! A region starts out readable and writable, is filled with NOP padding,
//! and is flipped to read+execute exactly once. It is never writable and
//! executable at the same time, and never goes back to writable.

use std::ptr::NonNull;

use thiserror::Error;

/// Single-byte x86 NOP used to pad unused space in a region.
pub const NOP_FILL: u8 = 0x90;

/// Error type for memory operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("memory allocation failed")]
    AllocationFailed,
    #[error("memory protection change failed")]
    ProtectionFailed,
    #[error("invalid memory size")]
    InvalidSize,
    #[error("unresolved code label: {0}")]
    UnresolvedLabel(&'static str),
}

/// A block of memory allocated via mmap that will hold generated code.
///
/// The memory is initially writable. Call `make_executable()` to make it
/// executable (and read-only) before calling the generated code.
pub struct ExecutableMemory {
    ptr: NonNull<u8>,
    size: usize,
    executable: bool,
}

impl ExecutableMemory {
    /// Map a new region of at least `size` bytes, filled with NOPs.
    pub fn new(size: usize) -> Result<Self, MemoryError> {
        if size == 0 {
            return Err(MemoryError::InvalidSize);
        }

        let page_size = page_size();
        let aligned_size = size
            .checked_add(page_size - 1)
            .ok_or(MemoryError::InvalidSize)?
            & !(page_size - 1);

        let ptr = mmap_alloc(aligned_size)?;

        // SAFETY: the mapping is RW and exactly `aligned_size` bytes long.
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), NOP_FILL, aligned_size);
        }

        Ok(Self {
            ptr,
            size: aligned_size,
            executable: false,
        })
    }

    /// Get a pointer to the start of the region.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Size of the mapping, rounded up to whole pages.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Write bytes to the memory at the given offset.
    /// Fails once the region is executable or if the write would overflow.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        if self.executable {
            return Err(MemoryError::ProtectionFailed);
        }

        let end = offset
            .checked_add(data.len())
            .ok_or(MemoryError::InvalidSize)?;
        if end > self.size {
            return Err(MemoryError::InvalidSize);
        }

        // SAFETY: bounds checked above and the region is still writable.
        unsafe {
            let dest = self.ptr.as_ptr().add(offset);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dest, data.len());
        }

        Ok(())
    }

    /// Make the memory executable (and read-only).
    /// After this call, the memory can no longer be written to.
    pub fn make_executable(&mut self) -> Result<(), MemoryError> {
        if self.executable {
            return Ok(());
        }

        let result = unsafe {
            libc::mprotect(
                self.ptr.as_ptr() as *mut libc::c_void,
                self.size,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };

        if result != 0 {
            return Err(MemoryError::ProtectionFailed);
        }

        self.executable = true;
        Ok(())
    }

    /// Check if the memory is executable.
    pub fn is_executable(&self) -> bool {
        self.executable
    }

    /// Read back the region contents.
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: the mapping is readable in both protection states.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    /// Give up ownership without unmapping. The region stays mapped for
    /// the rest of the process.
    pub fn leak(self) -> NonNull<u8> {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }
}

impl Drop for ExecutableMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
        }
    }
}

// The region is owned exclusively and immutable once executable.
unsafe impl Send for ExecutableMemory {}
unsafe impl Sync for ExecutableMemory {}

/// Get the page size for the current system.
pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 { 4096 } else { size as usize }
}

fn mmap_alloc(size: usize) -> Result<NonNull<u8>, MemoryError> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(MemoryError::AllocationFailed);
    }

    NonNull::new(ptr as *mut u8).ok_or(MemoryError::AllocationFailed)
}
