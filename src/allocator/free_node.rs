//! Free-list node - the one place slot memory is reinterpreted
//!
//! A slot is either handed out (opaque bytes owned by the caller) or sitting
//! on a free list, in which case its first word holds the link to the next
//! free slot. `FreeNode` is only ever a view over slot memory; it is never
//! allocated on its own.

use core::mem;
use core::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Intrusive link overlaying a free slot
///
/// The link is atomic because a popping thread may read it after another
/// thread already won the same node; that stale read is discarded when the
/// tagged compare-exchange on the list head fails.
#[repr(C)]
pub(crate) struct FreeNode {
    next: AtomicPtr<FreeNode>,
}

impl FreeNode {
    /// View a free slot as a node
    ///
    /// # Safety
    /// `slot` must point to at least `size_of::<FreeNode>()` writable bytes,
    /// aligned for `FreeNode`, that no caller still uses.
    #[inline]
    pub(crate) unsafe fn overlay(slot: NonNull<u8>) -> NonNull<FreeNode> {
        debug_assert_eq!(slot.as_ptr() as usize % mem::align_of::<FreeNode>(), 0);
        slot.cast()
    }

    /// Point `node` at `next`
    ///
    /// # Safety
    /// `node` must come from [`FreeNode::overlay`] and not be on a list yet.
    #[inline]
    pub(crate) unsafe fn link(node: NonNull<FreeNode>, next: *mut FreeNode) {
        // A late popper may be loading this word; both sides stay atomic.
        (*node.as_ptr()).next.store(next, Ordering::Relaxed);
    }

    /// Read the link of a node observed at a list head
    ///
    /// # Safety
    /// `node` must lie inside a block that is still alive. The value may be
    /// stale if the node was concurrently popped.
    #[inline]
    pub(crate) unsafe fn next(node: NonNull<FreeNode>) -> *mut FreeNode {
        (*node.as_ptr()).next.load(Ordering::Relaxed)
    }

    /// Hand the node back out as opaque slot memory
    #[inline]
    pub(crate) fn into_slot(node: NonNull<FreeNode>) -> NonNull<u8> {
        node.cast()
    }
}

/// Distance between consecutive slots of a pool with `slot_size`
///
/// The smallest multiple of `slot_size` that can also hold an aligned
/// `FreeNode`. Slot addresses are multiples of the stride, so they are
/// multiples of the slot size too. For word-multiple slot sizes the stride
/// equals the slot size.
pub(crate) fn slot_stride(slot_size: usize) -> Option<usize> {
    debug_assert!(slot_size > 0);
    let align_shift = mem::align_of::<FreeNode>().trailing_zeros();
    let shared = slot_size.trailing_zeros().min(align_shift);
    let stride = slot_size.checked_mul(1usize << (align_shift - shared))?;
    Some(stride.max(mem::size_of::<FreeNode>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORD: usize = mem::size_of::<usize>();

    #[test]
    fn test_stride_of_word_multiples_is_identity() {
        for size in [WORD, 2 * WORD, 3 * WORD, 64 * WORD] {
            assert_eq!(slot_stride(size), Some(size));
        }
    }

    #[test]
    fn test_stride_is_common_multiple() {
        for size in 1..=100usize {
            let stride = slot_stride(size).unwrap();
            assert_eq!(stride % size, 0, "stride {} for size {}", stride, size);
            assert_eq!(stride % mem::align_of::<FreeNode>(), 0);
            assert!(stride >= mem::size_of::<FreeNode>());
        }
    }

    #[test]
    fn test_stride_overflow() {
        assert_eq!(slot_stride(usize::MAX), None);
    }

    #[test]
    fn test_link_and_next() {
        let mut a = [0usize; 1];
        let mut b = [0usize; 1];
        unsafe {
            let na = FreeNode::overlay(NonNull::new(a.as_mut_ptr() as *mut u8).unwrap());
            let nb = FreeNode::overlay(NonNull::new(b.as_mut_ptr() as *mut u8).unwrap());
            FreeNode::link(na, nb.as_ptr());
            FreeNode::link(nb, core::ptr::null_mut());
            assert_eq!(FreeNode::next(na), nb.as_ptr());
            assert!(FreeNode::next(nb).is_null());
        }
    }

    #[test]
    fn test_link_replaces_user_bytes() {
        let mut slot = [usize::MAX; 2];
        let mut other = [0usize; 1];
        unsafe {
            let node = FreeNode::overlay(NonNull::new(slot.as_mut_ptr() as *mut u8).unwrap());
            assert_eq!(FreeNode::next(node) as usize, usize::MAX);

            let target = other.as_mut_ptr() as *mut FreeNode;
            FreeNode::link(node, target);
            assert_eq!(FreeNode::next(node), target);
        }
        // Only the first word is the link
        assert_eq!(slot[1], usize::MAX);
    }
}
