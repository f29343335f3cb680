//! Machine code generation for sort routines.
//!
//! - Executable memory allocation (`memory`)
//! - Code buffer for building machine code (`codebuf`)
//! - x86-64 instruction encoding (`x86_64`)
//! - Copy-call emission behind the `CopyEmitter` seam (`emitter`)
//! - Prologue/epilogue framing and finalization (`image`)

mod codebuf;
pub mod emitter;
pub mod image;
mod memory;
pub mod x86_64;

pub use codebuf::CodeBuffer;
pub use emitter::{BodyStats, CopyEmitter, X86_64CopyEmitter};
pub use image::{Image, ImageBuilder};
pub use memory::{ExecutableMemory, MemoryError, NOP_FILL, page_size};
