//! slabpool - size-class slab allocation for small objects
//!
//! Requests are routed by byte size to one of a fixed set of pools. Each
//! pool hands out equal-size slots carved from large blocks, recycling freed
//! slots through a lock-free LIFO free list. Requests above the largest
//! class go straight to the system allocator.
//!
//! ```
//! use slabpool::{PoolConfig, SizeClassRegistry};
//!
//! let registry = SizeClassRegistry::new(PoolConfig::default()).unwrap();
//! let ptr = registry.allocate(32).unwrap();
//! unsafe { registry.deallocate(ptr.as_ptr(), 32) };
//! ```

pub mod allocator;
pub mod config;
pub mod error;
pub mod logging;

// Re-export core types
pub use allocator::{Pool, PoolBox, PoolStats, RegistryStats, SizeClassRegistry};
pub use config::PoolConfig;
pub use error::{ConfigError, Result};
