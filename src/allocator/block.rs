//! Block management - system memory acquisition and carving
//!
//! Design: Each block's first word links to the previously acquired block,
//! so a pool needs no side table to find its memory at teardown. The rest
//! of the block is padded up to a stride boundary and cut into slots.

use std::alloc::{alloc, dealloc, Layout};
use std::mem;
use core::ptr::{self, NonNull};

/// Bytes at the front of every block reserved for the chain link
const LINK_SIZE: usize = mem::size_of::<*mut u8>();

/// Smallest block guaranteed to fit one slot of `stride` after padding
pub(crate) fn min_block_size(stride: usize) -> usize {
    LINK_SIZE.saturating_add(stride.saturating_mul(2) - 1)
}

/// Uncarved slot range of a freshly acquired block
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotRange {
    /// First slot address (multiple of the stride)
    pub first: *mut u8,
    /// One past the last slot that fits entirely inside the block
    pub high_water: *mut u8,
}

/// Singly linked chain of blocks owned by one pool
pub(crate) struct BlockChain {
    head: *mut u8,
    layout: Layout,
    len: usize,
}

impl BlockChain {
    /// Empty chain; nothing is requested from the system until `grow`
    pub(crate) fn new(block_size: usize) -> Option<Self> {
        let layout = Layout::from_size_align(block_size, mem::align_of::<*mut u8>()).ok()?;
        Some(Self {
            head: ptr::null_mut(),
            layout,
            len: 0,
        })
    }

    /// Acquire one block, link it at the head and carve it for `stride`
    ///
    /// Returns `None` if the system allocator is exhausted.
    pub(crate) fn grow(&mut self, stride: usize) -> Option<SlotRange> {
        debug_assert!(self.layout.size() >= min_block_size(stride));

        let block = NonNull::new(unsafe { alloc(self.layout) })?;

        unsafe {
            (block.as_ptr() as *mut *mut u8).write(self.head);
        }
        self.head = block.as_ptr();
        self.len += 1;

        Some(carve(block, self.layout.size(), stride))
    }

    /// Layout of every block in the chain
    #[inline]
    pub(crate) fn layout(&self) -> Layout {
        self.layout
    }

    /// Number of blocks acquired so far
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl Drop for BlockChain {
    fn drop(&mut self) {
        let mut current = self.head;
        while !current.is_null() {
            unsafe {
                let next = (current as *const *mut u8).read();
                dealloc(current, self.layout);
                current = next;
            }
        }
    }
}

/// Compute the aligned slot range inside a block
fn carve(block: NonNull<u8>, block_size: usize, stride: usize) -> SlotRange {
    let base = block.as_ptr() as usize;
    let body = base + LINK_SIZE;
    let padding = (stride - body % stride) % stride;
    let first_offset = LINK_SIZE + padding;
    let slots = (block_size - first_offset) / stride;

    unsafe {
        SlotRange {
            first: block.as_ptr().add(first_offset),
            high_water: block.as_ptr().add(first_offset + slots * stride),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carve_aligns_first_slot() {
        let mut buffer = [0u64; 64];
        let block = NonNull::new(buffer.as_mut_ptr() as *mut u8).unwrap();

        for stride in [8, 16, 24, 48, 64, 120] {
            let range = carve(block, 512, stride);
            let first = range.first as usize;
            let high = range.high_water as usize;

            assert_eq!(first % stride, 0, "stride {}", stride);
            assert!(first >= block.as_ptr() as usize + LINK_SIZE);
            assert!(first - (block.as_ptr() as usize + LINK_SIZE) < stride);
            assert_eq!((high - first) % stride, 0);
            assert!(high <= block.as_ptr() as usize + 512);
            assert!(high + stride > block.as_ptr() as usize + 512);
        }
    }

    #[test]
    fn test_min_block_fits_one_slot() {
        let mut buffer = [0u64; 64];
        let block = NonNull::new(buffer.as_mut_ptr() as *mut u8).unwrap();

        for stride in [8, 24, 40, 72] {
            let range = carve(block, min_block_size(stride), stride);
            assert!(range.high_water as usize - range.first as usize >= stride);
        }
    }

    #[test]
    fn test_chain_grows_and_counts() {
        let mut chain = BlockChain::new(4096).expect("layout");
        assert_eq!(chain.len(), 0);

        chain.grow(64).expect("first block");
        chain.grow(64).expect("second block");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.layout().size(), 4096);
        // Drop releases both blocks
    }

    #[test]
    fn test_grow_fails_when_system_refuses() {
        // Valid layout, but no allocator can satisfy it
        let mut chain = BlockChain::new(isize::MAX as usize & !7).expect("layout");
        assert!(chain.grow(8).is_none());
        assert_eq!(chain.len(), 0);
    }
}
