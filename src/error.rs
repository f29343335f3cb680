//! Error types for sort routine generation and configuration loading.

use std::path::PathBuf;

use thiserror::Error;

pub use crate::jit::MemoryError;

/// Why a sort routine could not be generated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// Null base address, or neither a usable size/count pair nor a sizing
    /// function.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: &'static str },

    /// The code region could not be mapped or made executable.
    #[error("code region unavailable: {0}")]
    Memory(#[from] MemoryError),

    /// Generated routines only run on x86-64.
    #[error("unsupported target architecture: {arch}")]
    UnsupportedTarget { arch: &'static str },
}

/// Result type alias for generation.
pub type GenerateResult<T> = Result<T, GenerateError>;

/// Errors reading or writing `jitsort.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}
