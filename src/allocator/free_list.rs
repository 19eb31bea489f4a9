//! Lock-free LIFO of reclaimed slots (Treiber stack)
//!
//! The head is a single `AtomicU64` packing the node address with a version
//! tag. Every successful swap bumps the tag, so a head that was popped,
//! reused and pushed back between another thread's load and its
//! compare-exchange no longer matches (the ABA case).

use super::free_node::FreeNode;
use core::ptr::NonNull;
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Low bits of the packed head holding the node address
#[cfg(target_pointer_width = "64")]
const ADDR_BITS: u32 = 48;
#[cfg(not(target_pointer_width = "64"))]
const ADDR_BITS: u32 = usize::BITS;

const ADDR_MASK: u64 = u64::MAX >> (64 - ADDR_BITS);
const TAG_MASK: u64 = !ADDR_MASK >> ADDR_BITS;

/// Combine an address and tag into a head word
///
/// Address bits above `ADDR_BITS` are dropped. A link read by `pop` may be
/// garbage from a slot that was already handed out; the compare-exchange
/// carrying it fails, so the truncated value is never installed.
#[inline(always)]
fn pack(node: *mut FreeNode, tag: u64) -> u64 {
    (tag << ADDR_BITS) | (node as usize as u64 & ADDR_MASK)
}

#[inline(always)]
fn unpack(word: u64) -> (*mut FreeNode, u64) {
    ((word & ADDR_MASK) as usize as *mut FreeNode, word >> ADDR_BITS)
}

#[inline(always)]
fn next_tag(tag: u64) -> u64 {
    tag.wrapping_add(1) & TAG_MASK
}

/// Free list head, padded to its own cache line
pub(crate) struct FreeList {
    head: CachePadded<AtomicU64>,
}

impl FreeList {
    pub(crate) fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Pop the most recently pushed slot, or `None` if the list is empty
    #[inline]
    pub(crate) fn pop(&self) -> Option<NonNull<u8>> {
        let mut current = self.head.load(Ordering::Acquire);
        loop {
            let (node, tag) = unpack(current);
            let node = NonNull::new(node)?;

            // Blocks outlive the list, so the read is always in bounds.
            let next = unsafe { FreeNode::next(node) };

            match self.head.compare_exchange_weak(
                current,
                pack(next, next_tag(tag)),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(FreeNode::into_slot(node)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Push a slot onto the list
    ///
    /// # Safety
    /// `slot` must be an unused slot of the owning pool; it must not already
    /// be on the list.
    #[inline]
    pub(crate) unsafe fn push(&self, slot: NonNull<u8>) {
        let node = FreeNode::overlay(slot);
        debug_assert_eq!(
            node.as_ptr() as usize as u64 & !ADDR_MASK,
            0,
            "slot address exceeds {} bits",
            ADDR_BITS
        );

        let mut current = self.head.load(Ordering::Relaxed);
        loop {
            let (head, tag) = unpack(current);
            FreeNode::link(node, head);

            match self.head.compare_exchange_weak(
                current,
                pack(node.as_ptr(), next_tag(tag)),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Snapshot emptiness check (racy under concurrent use)
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        unpack(self.head.load(Ordering::Relaxed)).0.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_roundtrip_keeps_tag() {
        let mut slot = [0usize; 1];
        let node = slot.as_mut_ptr() as *mut FreeNode;
        let (addr, tag) = unpack(pack(node, 7));
        assert_eq!(addr, node);
        assert_eq!(tag, 7);
    }

    #[test]
    fn test_pack_drops_high_address_bits() {
        let garbage = usize::MAX as *mut FreeNode;
        let (addr, tag) = unpack(pack(garbage, 3));
        assert_eq!(addr as usize as u64, ADDR_MASK);
        assert_eq!(tag, 3);
    }

    #[test]
    fn test_pop_accepts_overwritten_link() {
        let list = FreeList::new();
        let mut slot = [0usize; 1];
        let p = NonNull::new(slot.as_mut_ptr() as *mut u8).unwrap();

        unsafe {
            list.push(p);
            // Bytes a new owner might have written before a late reader loads the link
            p.as_ptr().write_bytes(0xFF, core::mem::size_of::<usize>());
        }
        let tag = unpack(list.head.load(Ordering::Relaxed)).1;

        assert_eq!(list.pop(), Some(p));
        let (head, new_tag) = unpack(list.head.load(Ordering::Relaxed));
        assert_eq!(head as usize as u64, usize::MAX as u64 & ADDR_MASK);
        assert_eq!(new_tag, next_tag(tag));
    }

    #[test]
    fn test_tag_wraps() {
        assert_eq!(next_tag(TAG_MASK), 0);
        assert_eq!(next_tag(0), 1);
    }

    #[test]
    fn test_push_pop_lifo() {
        let list = FreeList::new();
        let mut slots = [[0usize; 2]; 3];
        let ptrs: Vec<NonNull<u8>> = slots
            .iter_mut()
            .map(|s| NonNull::new(s.as_mut_ptr() as *mut u8).unwrap())
            .collect();

        assert!(list.is_empty());
        for &p in &ptrs {
            unsafe { list.push(p) };
        }
        assert!(!list.is_empty());

        assert_eq!(list.pop(), Some(ptrs[2]));
        assert_eq!(list.pop(), Some(ptrs[1]));
        assert_eq!(list.pop(), Some(ptrs[0]));
        assert_eq!(list.pop(), None);
    }

    #[test]
    fn test_tag_advances_per_swap() {
        let list = FreeList::new();
        let mut slot = [0usize; 1];
        let p = NonNull::new(slot.as_mut_ptr() as *mut u8).unwrap();

        unsafe { list.push(p) };
        let first = list.head.load(Ordering::Relaxed);
        list.pop();
        unsafe { list.push(p) };
        let second = list.head.load(Ordering::Relaxed);

        // Same address, different version
        assert_eq!(unpack(first).0, unpack(second).0);
        assert_ne!(first, second);
    }
}
