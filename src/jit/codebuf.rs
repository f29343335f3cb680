//! Code buffer for building sort routines.
//!
//! Machine code is assembled into an ordinary `Vec` first and copied into an
//! mmap'd region only once its final length is known.

use std::collections::HashMap;

use super::memory::{ExecutableMemory, MemoryError};

/// A buffer for building machine code.
pub struct CodeBuffer {
    code: Vec<u8>,
    /// Label name -> offset
    labels: HashMap<&'static str, usize>,
    /// Pending rel32 references (offset of the displacement, label name)
    forward_refs: Vec<(usize, &'static str)>,
}

impl CodeBuffer {
    /// Create a new empty code buffer.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a new code buffer with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            code: Vec::with_capacity(capacity),
            labels: HashMap::new(),
            forward_refs: Vec::new(),
        }
    }

    /// Get the current size of the code.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Emit a single byte.
    pub fn emit_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    /// Emit a 32-bit value (little-endian).
    pub fn emit_u32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit value (little-endian).
    pub fn emit_u64(&mut self, value: u64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit multiple bytes.
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    /// Define a label at the current position.
    pub fn define_label(&mut self, name: &'static str) {
        self.labels.insert(name, self.code.len());
    }

    /// Get the offset of a label (if defined).
    pub fn get_label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// Emit a 32-bit placeholder for a displacement to `label`, measured from
    /// the end of the displacement. Filled in by `patch_forward_refs`.
    pub fn emit_forward_ref(&mut self, label: &'static str) {
        self.forward_refs.push((self.code.len(), label));
        self.emit_u32(0);
    }

    /// Patch all forward references.
    /// Returns an error if any label is undefined.
    pub fn patch_forward_refs(&mut self) -> Result<(), MemoryError> {
        for (offset, label) in self.forward_refs.drain(..) {
            let target = *self
                .labels
                .get(label)
                .ok_or(MemoryError::UnresolvedLabel(label))?;
            let rel = i32::try_from(target as i64 - (offset as i64 + 4))
                .map_err(|_| MemoryError::UnresolvedLabel(label))?;
            self.code[offset..offset + 4].copy_from_slice(&rel.to_le_bytes());
        }
        Ok(())
    }

    /// Patch forward references, copy the code into a fresh region of at
    /// least `region_size` bytes and make it executable. The region grows to
    /// fit the code if needed.
    pub fn finalize(mut self, region_size: usize) -> Result<ExecutableMemory, MemoryError> {
        self.patch_forward_refs()?;

        let mut mem = ExecutableMemory::new(region_size.max(self.code.len()))?;
        mem.write(0, &self.code)?;
        mem.make_executable()?;
        Ok(mem)
    }

    /// Get the code bytes (for inspection).
    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

impl Default for CodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_bytes() {
        let mut buf = CodeBuffer::new();
        buf.emit_u8(0x90);
        buf.emit_u32(0xDEADBEEF);
        buf.emit_bytes(&[0xFF, 0xD0]);

        assert_eq!(buf.len(), 7);
        assert_eq!(buf.code(), &[0x90, 0xEF, 0xBE, 0xAD, 0xDE, 0xFF, 0xD0]);
    }

    #[test]
    fn test_emit_u64_little_endian() {
        let mut buf = CodeBuffer::with_capacity(8);
        buf.emit_u64(0x0102030405060708);
        assert_eq!(buf.code(), &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_labels() {
        let mut buf = CodeBuffer::new();
        buf.emit_u8(0x90);
        buf.define_label("test");
        buf.emit_u8(0x90);

        assert_eq!(buf.get_label("test"), Some(1));
        assert_eq!(buf.get_label("missing"), None);
    }

    #[test]
    fn test_forward_ref_patched_from_end_of_displacement() {
        let mut buf = CodeBuffer::new();
        buf.emit_bytes(&[0x0F, 0x84]);
        buf.emit_forward_ref("done");
        buf.emit_bytes(&[0x90; 5]);
        buf.define_label("done");
        buf.emit_u8(0xC3);

        buf.patch_forward_refs().unwrap();
        assert_eq!(&buf.code()[2..6], &5i32.to_le_bytes());
    }

    #[test]
    fn test_undefined_label_fails_finalize() {
        let mut buf = CodeBuffer::new();
        buf.emit_forward_ref("nowhere");
        assert_eq!(
            buf.finalize(1024).err(),
            Some(MemoryError::UnresolvedLabel("nowhere"))
        );
    }

    #[test]
    fn test_finalize_pads_with_nops() {
        let mut buf = CodeBuffer::new();
        buf.emit_u8(0xC3);
        let mem = buf.finalize(1024).unwrap();

        assert!(mem.is_executable());
        assert!(mem.size() >= 1024);
        assert_eq!(mem.bytes()[0], 0xC3);
        assert!(mem.bytes()[1..].iter().all(|&b| b == 0x90));
    }

    #[test]
    fn test_finalize_grows_past_region_size() {
        let mut buf = CodeBuffer::new();
        buf.emit_bytes(&vec![0xCC; 10_000]);
        let mem = buf.finalize(16).unwrap();
        assert!(mem.size() >= 10_000);
    }
}
