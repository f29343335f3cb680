//! Generation configuration and the `jitsort.toml` file format.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::primitives::Primitives;

/// File name looked up by `ConfigFile::load`.
pub const CONFIG_FILE_NAME: &str = "jitsort.toml";

/// Default code region size in bytes before page rounding.
pub const DEFAULT_MIN_REGION_SIZE: usize = 1024;

/// Region multiplier applied when a single element is longer than the
/// default region.
pub const DEFAULT_GROWTH_FACTOR: usize = 64;

/// How an element's bucket key is derived from its bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyMode {
    /// Leading bytes (up to 8) read as a little-endian unsigned integer.
    #[default]
    Integer,
    /// The element's first byte.
    LeadingByte,
}

/// Configuration for a generator.
#[derive(Debug, Clone, Copy)]
pub struct GenerateConfig {
    pub min_region_size: usize,
    pub growth_factor: usize,
    pub key_mode: KeyMode,
    pub primitives: Primitives,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            min_region_size: DEFAULT_MIN_REGION_SIZE,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            key_mode: KeyMode::Integer,
            primitives: Primitives::libc(),
        }
    }
}

/// On-disk configuration (`jitsort.toml`).
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub generate: GenerateSection,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GenerateSection {
    #[serde(default = "default_min_region_size")]
    pub min_region_size: usize,
    #[serde(default = "default_growth_factor")]
    pub growth_factor: usize,
    #[serde(default)]
    pub key_mode: KeyMode,
}

fn default_min_region_size() -> usize {
    DEFAULT_MIN_REGION_SIZE
}

fn default_growth_factor() -> usize {
    DEFAULT_GROWTH_FACTOR
}

impl Default for GenerateSection {
    fn default() -> Self {
        Self {
            min_region_size: DEFAULT_MIN_REGION_SIZE,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            key_mode: KeyMode::Integer,
        }
    }
}

impl ConfigFile {
    /// Load `jitsort.toml` from a directory.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        Self::load_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Load a config file from an explicit path.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save `jitsort.toml` into a directory.
    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content).map_err(|source| ConfigError::Write { path, source })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.generate.min_region_size == 0 {
            return Err(ConfigError::Invalid(
                "min-region-size must be greater than 0".to_string(),
            ));
        }
        if self.generate.growth_factor == 0 {
            return Err(ConfigError::Invalid(
                "growth-factor must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a generator configuration using the libc primitives.
    pub fn to_generate_config(&self) -> GenerateConfig {
        GenerateConfig {
            min_region_size: self.generate.min_region_size,
            growth_factor: self.generate.growth_factor,
            key_mode: self.generate.key_mode,
            primitives: Primitives::libc(),
        }
    }
}
