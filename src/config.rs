//! Size-class configuration
//!
//! Loaded from TOML, overridden from the environment, or built in code.
//! All three knobs are fixed for the lifetime of a registry.

use crate::allocator::{min_block_size, slot_stride};
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Byte step between adjacent size classes
pub const DEFAULT_GRANULARITY: usize = 8;
/// Number of size classes
pub const DEFAULT_CLASS_COUNT: usize = 64;
/// Bytes requested from the system per block
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Class `i` serves requests up to `(i + 1) * granularity` bytes
    #[serde(default = "default_granularity")]
    pub granularity: usize,

    #[serde(default = "default_class_count")]
    pub class_count: usize,

    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            granularity: DEFAULT_GRANULARITY,
            class_count: DEFAULT_CLASS_COUNT,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

fn default_granularity() -> usize {
    DEFAULT_GRANULARITY
}

fn default_class_count() -> usize {
    DEFAULT_CLASS_COUNT
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

impl PoolConfig {
    pub fn new(granularity: usize, class_count: usize, block_size: usize) -> Self {
        Self {
            granularity,
            class_count,
            block_size,
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SLABPOOL_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `SLABPOOL_GRANULARITY`, `SLABPOOL_CLASS_COUNT` and
    /// `SLABPOOL_BLOCK_SIZE` on top of `self`
    pub fn with_env_overrides(mut self) -> Result<Self> {
        for var in ENV_VARS {
            if let Ok(value) = std::env::var(var) {
                self.apply_override(var, &value)?;
            }
        }
        self.validate()?;
        Ok(self)
    }

    fn apply_override(&mut self, var: &'static str, value: &str) -> Result<()> {
        let parsed = value
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidEnv {
                var,
                value: value.to_string(),
            })?;

        match var {
            "SLABPOOL_GRANULARITY" => self.granularity = parsed,
            "SLABPOOL_CLASS_COUNT" => self.class_count = parsed,
            "SLABPOOL_BLOCK_SIZE" => self.block_size = parsed,
            _ => {}
        }
        Ok(())
    }

    /// Largest request served from a pool; anything bigger goes to the system
    #[inline]
    pub fn max_pooled_size(&self) -> usize {
        self.granularity * self.class_count
    }

    /// Check that every class can be built
    pub fn validate(&self) -> Result<()> {
        if self.granularity == 0 {
            return Err(ConfigError::ZeroGranularity);
        }
        if self.class_count == 0 {
            return Err(ConfigError::ZeroClassCount);
        }

        let overflow = ConfigError::SizeOverflow {
            granularity: self.granularity,
            class_count: self.class_count,
        };
        let largest = match self.granularity.checked_mul(self.class_count) {
            Some(largest) => largest,
            None => return Err(overflow),
        };

        // Strides grow with the slot size only up to the word-alignment
        // factor, so check every class rather than just the largest.
        let mut required = 0;
        for class in 1..=self.class_count {
            let slot_size = class * self.granularity;
            let Some(stride) = slot_stride(slot_size) else {
                return Err(overflow);
            };
            required = required.max(min_block_size(stride));
        }

        if self.block_size < required {
            return Err(ConfigError::BlockTooSmall {
                block_size: self.block_size,
                slot_size: largest,
                required,
            });
        }

        Ok(())
    }
}

const ENV_VARS: [&str; 3] = [
    "SLABPOOL_GRANULARITY",
    "SLABPOOL_CLASS_COUNT",
    "SLABPOOL_BLOCK_SIZE",
];
