//! jitsort - sorting by generating straight-line copy code
//!
//! The sort order of an input is decided once, at generation time, by a
//! 256-bucket counting sort over each element's byte key. The result is an
//! x86-64 routine that allocates an output buffer and copies every element
//! to its precomputed offset, with no comparisons or branches.
//! For C/C++ embedding, use the FFI module functions.

pub mod classify;
pub mod config;
pub mod error;
pub mod ffi;
pub mod generate;
pub mod jit;
pub mod primitives;
pub mod routine;

// Re-export commonly used types
pub use classify::{BUCKET_COUNT, Layout, SizeFn};
pub use config::{ConfigFile, GenerateConfig, KeyMode};
pub use error::{ConfigError, GenerateError, GenerateResult};
pub use generate::{Generator, PlainBytes, generate, sort_slice};
pub use primitives::Primitives;
pub use routine::{EntryPoint, SortRoutine, SortedOutput};
