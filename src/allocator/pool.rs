//! Fixed-size slot pool - lock-free reuse over mutex-guarded bump carving
//!
//! Fast path: pop a reclaimed slot from the free list (CAS, never blocks).
//! Slow path: take the pool mutex and bump the cursor through the current
//! block, carving a new block when the high-water mark is reached.
//!
//! Both paths produce a slot through a single linearizable step (the CAS or
//! the mutex-held cursor advance), so they can race freely.

use super::block::{min_block_size, BlockChain};
use super::free_list::FreeList;
use super::free_node::slot_stride;
use super::PoolStats;
use crate::config::DEFAULT_BLOCK_SIZE;
use crate::logging;
use core::ptr::{self, NonNull};
use parking_lot::Mutex;
use std::alloc::handle_alloc_error;

/// Bump state, only touched with the pool mutex held
struct BumpState {
    cursor: *mut u8,
    high_water: *mut u8,
    blocks: BlockChain,
}

// SAFETY: the raw pointers address blocks owned by `blocks`, which moves
// together with them; access is serialized by the enclosing mutex.
unsafe impl Send for BumpState {}

/// Slab pool serving one fixed slot size
pub struct Pool {
    slot_size: usize,
    stride: usize,
    free: FreeList,
    bump: Mutex<BumpState>,
}

impl Pool {
    /// Create a pool for `slot_size`-byte slots backed by `block_size`-byte blocks
    ///
    /// No memory is acquired until the first allocation. Blocks too small to
    /// hold a single padded slot are enlarged.
    ///
    /// # Panics
    /// If `slot_size` is zero, or so large that a slot stride overflows.
    pub fn new(slot_size: usize, block_size: usize) -> Self {
        assert!(slot_size > 0, "pool slot size must be positive");
        let Some(stride) = slot_stride(slot_size) else {
            panic!("pool slot size {} overflows usize", slot_size);
        };

        let required = min_block_size(stride);
        let block_size = if block_size < required {
            tracing::debug!(
                target: "slabpool::pool",
                slot_size,
                requested = block_size,
                block_size = required,
                "block size raised to fit one slot"
            );
            required
        } else {
            block_size
        };

        let Some(blocks) = BlockChain::new(block_size) else {
            panic!("pool block size {} overflows isize", block_size);
        };

        Self {
            slot_size,
            stride,
            free: FreeList::new(),
            bump: Mutex::new(BumpState {
                cursor: ptr::null_mut(),
                high_water: ptr::null_mut(),
                blocks,
            }),
        }
    }

    /// Create a pool with [`DEFAULT_BLOCK_SIZE`] blocks
    pub fn with_slot_size(slot_size: usize) -> Self {
        Self::new(slot_size, DEFAULT_BLOCK_SIZE)
    }

    /// Configured slot size
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Distance between slots; every slot address is a multiple of it
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Get a slot, aborting through `handle_alloc_error` if a new block
    /// cannot be obtained
    #[inline]
    pub fn allocate(&self) -> NonNull<u8> {
        match self.try_allocate() {
            Some(slot) => slot,
            None => handle_alloc_error(self.bump.lock().blocks.layout()),
        }
    }

    /// Get a slot, or `None` if the system allocator is exhausted
    #[inline]
    pub fn try_allocate(&self) -> Option<NonNull<u8>> {
        if let Some(slot) = self.free.pop() {
            return Some(slot);
        }
        self.allocate_slow()
    }

    #[cold]
    fn allocate_slow(&self) -> Option<NonNull<u8>> {
        let mut state = self.bump.lock();

        if state.cursor == state.high_water {
            let range = state.blocks.grow(self.stride)?;
            state.cursor = range.first;
            state.high_water = range.high_water;

            logging::log_block_carved(
                self.slot_size,
                state.blocks.layout().size(),
                state.blocks.len(),
            );
        }

        let slot = state.cursor;
        // cursor < high_water, and high_water is stride-aligned from first
        state.cursor = unsafe { slot.add(self.stride) };
        NonNull::new(slot)
    }

    /// Return a slot to the pool; null is ignored
    ///
    /// # Safety
    /// `ptr` must be null or a slot previously returned by this pool's
    /// `allocate`/`try_allocate` that has not been deallocated since.
    /// Nothing is validated: a foreign pointer corrupts the free list.
    #[inline]
    pub unsafe fn deallocate(&self, ptr: *mut u8) {
        if let Some(slot) = NonNull::new(ptr) {
            debug_assert_eq!(
                slot.as_ptr() as usize % self.stride,
                0,
                "pointer is not a slot of the {}-byte pool",
                self.slot_size
            );
            self.free.push(slot);
        }
    }

    /// Snapshot of block usage
    pub fn stats(&self) -> PoolStats {
        let state = self.bump.lock();
        let block_size = state.blocks.layout().size();
        PoolStats {
            slot_size: self.slot_size,
            block_size,
            blocks: state.blocks.len(),
            reserved_bytes: state.blocks.len() * block_size,
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let state = self.bump.get_mut();
        if state.blocks.len() != 0 {
            logging::log_pool_teardown(self.slot_size, state.blocks.len());
        }
        // BlockChain releases every block, outstanding slots included
    }
}

impl core::fmt::Debug for Pool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pool")
            .field("slot_size", &self.slot_size)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}
