//! Size-class registry - routes byte sizes to pools
//!
//! Design: One pool per class, built once from a `PoolConfig` and owned by
//! the application. Routing is a pure function of the requested size, so
//! allocation and deallocation agree without storing anything per pointer.

use super::{Pool, RegistryStats};
use crate::config::PoolConfig;
use crate::error::Result;
use crate::logging;
use core::mem;
use core::ptr::NonNull;
use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Alignment of untyped `allocate(size)` requests
const WORD_ALIGN: usize = mem::align_of::<usize>();

/// Where a request of a given layout is served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// Zero-size request; nothing is allocated
    Empty,
    Pool(usize),
    System,
}

/// Fixed set of size-class pools plus the oversized fallback
pub struct SizeClassRegistry {
    config: PoolConfig,
    pools: Box<[Pool]>,
    live_large: AtomicUsize,
}

impl SizeClassRegistry {
    /// Validate `config` and build one pool per class
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Registry with the default 8-byte x 64-class layout
    pub fn with_defaults() -> Self {
        Self::build(PoolConfig::default())
    }

    fn build(config: PoolConfig) -> Self {
        let pools = (0..config.class_count)
            .map(|class| Pool::new((class + 1) * config.granularity, config.block_size))
            .collect();

        logging::log_registry_init(config.granularity, config.class_count, config.block_size);

        Self {
            config,
            pools,
            live_large: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of size classes
    #[inline]
    pub fn class_count(&self) -> usize {
        self.pools.len()
    }

    /// Pool serving class `index`
    ///
    /// # Panics
    /// If `index >= class_count()`.
    #[inline]
    pub fn pool(&self, index: usize) -> &Pool {
        &self.pools[index]
    }

    /// Class serving `size`-byte requests, `None` for zero or oversized
    #[inline]
    pub fn class_index(&self, size: usize) -> Option<usize> {
        if size == 0 || size > self.config.max_pooled_size() {
            return None;
        }
        Some((size - 1) / self.config.granularity)
    }

    #[inline]
    fn route(&self, layout: Layout) -> Route {
        if layout.size() == 0 {
            return Route::Empty;
        }
        match self.class_index(layout.size()) {
            // A class whose slots are not aligned enough for the layout
            // cannot serve it; both directions route the same way.
            Some(index) if self.pools[index].stride() % layout.align() == 0 => Route::Pool(index),
            _ => Route::System,
        }
    }

    /// Allocate `size` bytes (word aligned); `None` only when `size` is 0
    #[inline]
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.allocate_layout(untyped_layout(size))
    }

    /// Return memory from [`allocate`](Self::allocate)
    ///
    /// # Safety
    /// `ptr` must be null or come from `allocate(size)` on this registry with
    /// the same `size`, and must not have been freed since. The size is the
    /// only record of where the memory came from: a different size routes
    /// the pointer to the wrong pool or allocator, which is undefined
    /// behavior.
    #[inline]
    pub unsafe fn deallocate(&self, ptr: *mut u8, size: usize) {
        self.deallocate_layout(ptr, untyped_layout(size))
    }

    /// Allocate memory for `layout`; `None` only for zero-size layouts
    pub fn allocate_layout(&self, layout: Layout) -> Option<NonNull<u8>> {
        match self.route(layout) {
            Route::Empty => None,
            Route::Pool(index) => Some(self.pools[index].allocate()),
            Route::System => Some(self.allocate_large(layout)),
        }
    }

    /// Return memory from [`allocate_layout`](Self::allocate_layout)
    ///
    /// # Safety
    /// Same contract as [`deallocate`](Self::deallocate), with `layout`
    /// equal to the one passed at allocation.
    pub unsafe fn deallocate_layout(&self, ptr: *mut u8, layout: Layout) {
        if ptr.is_null() {
            return;
        }
        match self.route(layout) {
            Route::Empty => {}
            Route::Pool(index) => self.pools[index].deallocate(ptr),
            Route::System => self.deallocate_large(ptr, layout),
        }
    }

    #[cold]
    fn allocate_large(&self, layout: Layout) -> NonNull<u8> {
        let Some(ptr) = NonNull::new(unsafe { alloc(layout) }) else {
            handle_alloc_error(layout)
        };
        self.live_large.fetch_add(1, Ordering::Relaxed);
        logging::log_large_allocation(layout.size(), ptr.as_ptr());
        ptr
    }

    #[cold]
    unsafe fn deallocate_large(&self, ptr: *mut u8, layout: Layout) {
        logging::log_large_deallocation(layout.size(), ptr);
        dealloc(ptr, layout);
        self.live_large.fetch_sub(1, Ordering::Relaxed);
    }

    /// Per-pool block usage plus live oversized allocations
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            pools: self.pools.iter().map(Pool::stats).collect(),
            live_large_allocations: self.live_large.load(Ordering::Relaxed),
        }
    }
}

impl Default for SizeClassRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl core::fmt::Debug for SizeClassRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SizeClassRegistry")
            .field("config", &self.config)
            .field("live_large", &self.live_large.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Layout for untyped requests
///
/// Sizes that cannot form a layout are a capacity overflow, like `Vec`'s.
#[inline]
fn untyped_layout(size: usize) -> Layout {
    match Layout::from_size_align(size, WORD_ALIGN) {
        Ok(layout) => layout,
        Err(_) => panic!("allocation of {} bytes overflows isize", size),
    }
}
