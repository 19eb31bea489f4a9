//! Error types
//!
//! Only configuration is fallible. Allocation failures are fatal and go
//! through `std::alloc::handle_alloc_error`.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("granularity must be non-zero")]
    ZeroGranularity,

    #[error("class count must be non-zero")]
    ZeroClassCount,

    #[error("{class_count} classes of {granularity} bytes overflow usize")]
    SizeOverflow { granularity: usize, class_count: usize },

    #[error("block size {block_size} cannot hold a {slot_size}-byte slot (need at least {required})")]
    BlockTooSmall {
        block_size: usize,
        slot_size: usize,
        required: usize,
    },

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
