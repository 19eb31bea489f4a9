//! Memory allocator - size-class pools over carved blocks
//!
//! Design: Three-layer architecture:
//! 1. Free list pop (fast path, lock-free)
//! 2. Bump allocation through the current block (slow path, mutex-guarded)
//! 3. System memory (rare, one block at a time or oversized requests)
//!
//! Slot memory is reinterpreted as a free-list link only inside `free_node`;
//! every other module treats slots as opaque bytes.

mod block;
mod boxed;
mod free_list;
mod free_node;
mod pool;
mod registry;


pub use boxed::PoolBox;
pub use pool::Pool;
pub use registry::SizeClassRegistry;

pub(crate) use block::min_block_size;
pub(crate) use free_node::slot_stride;

/// Pool statistics for monitoring and debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured slot size in bytes
    pub slot_size: usize,
    /// Bytes requested from the system per block
    pub block_size: usize,
    /// Blocks currently owned by the pool
    pub blocks: usize,
    /// Total bytes held in blocks
    pub reserved_bytes: usize,
}

/// Registry-wide statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub pools: Vec<PoolStats>,
    /// Oversized allocations served by the system allocator and not yet freed
    pub live_large_allocations: usize,
}

impl RegistryStats {
    /// Total bytes reserved across every pool
    pub fn reserved_bytes(&self) -> usize {
        self.pools.iter().map(|p| p.reserved_bytes).sum()
    }

    /// Total blocks across every pool
    pub fn blocks(&self) -> usize {
        self.pools.iter().map(|p| p.blocks).sum()
    }
}
