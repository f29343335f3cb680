//! Executable image assembly: frames the copy groups with a prologue and an
//! epilogue and places the result in an executable region.

use log::debug;

use super::codebuf::CodeBuffer;
use super::emitter::{BodyStats, CopyEmitter, X86_64CopyEmitter, emit_body};
use super::memory::{ExecutableMemory, MemoryError};
use crate::classify::Classification;
use crate::config::GenerateConfig;

/// A finalized sort routine image.
pub struct Image {
    pub memory: ExecutableMemory,
    pub code_len: usize,
    pub stats: BodyStats,
    /// Bytes requested from the allocation primitive.
    pub output_len: usize,
    /// Leading bytes of the output the copy groups fill.
    pub placed_len: usize,
}

/// Builds executable images from classified input.
pub struct ImageBuilder<'c> {
    config: &'c GenerateConfig,
}

impl<'c> ImageBuilder<'c> {
    pub fn new(config: &'c GenerateConfig) -> Self {
        Self { config }
    }

    /// Region size requested for `code_len` bytes of code.
    ///
    /// Starts from the configured minimum. If any element is longer than that
    /// minimum the region grows to `max_len * growth_factor`, and it is always
    /// at least as large as the code itself.
    pub fn region_size(&self, classification: &Classification, code_len: usize) -> usize {
        let mut size = self.config.min_region_size;
        let max_len = classification.max_len();
        if max_len > size {
            size = max_len.saturating_mul(self.config.growth_factor);
        }
        size.max(code_len)
    }

    /// Assemble prologue, body and epilogue into a code buffer.
    pub fn assemble(&self, classification: &Classification) -> (CodeBuffer, BodyStats) {
        let primitives = &self.config.primitives;
        let groups = classification.elements().len() - classification.dropped();
        let mut buf = CodeBuffer::with_capacity(X86_64CopyEmitter::estimate_len(groups));

        let mut emitter = X86_64CopyEmitter::new(&mut buf);
        emitter.prologue(classification.valid_bytes() as u64, primitives.alloc_addr());
        let stats = emit_body(&mut emitter, classification, primitives.copy_addr());
        emitter.epilogue();

        (buf, stats)
    }

    /// Assemble and finalize into an executable region.
    pub fn build(&self, classification: &Classification) -> Result<Image, MemoryError> {
        let (buf, stats) = self.assemble(classification);
        let code_len = buf.len();
        let region_size = self.region_size(classification, code_len);

        let memory = buf.finalize(region_size)?;
        debug!(
            "built sort routine: {} groups, {} code bytes, {} byte region at {:p}",
            stats.groups,
            code_len,
            memory.size(),
            memory.as_ptr()
        );

        Ok(Image {
            memory,
            code_len,
            stats,
            output_len: classification.valid_bytes(),
            placed_len: classification.placed_bytes(),
        })
    }
}
