//! Typed allocation - an owning pointer whose memory lives in a size class

use super::SizeClassRegistry;
use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

/// Owning pointer to a `T` placed in its registry size class
///
/// Dropping the box drops the value and returns the slot to the registry.
/// Zero-sized values never touch the registry.
pub struct PoolBox<'r, T> {
    ptr: NonNull<T>,
    registry: &'r SizeClassRegistry,
    _marker: PhantomData<T>,
}

impl<'r, T> PoolBox<'r, T> {
    /// Move `value` into registry memory
    pub fn new(registry: &'r SizeClassRegistry, value: T) -> Self {
        let ptr = match registry.allocate_layout(Layout::new::<T>()) {
            Some(ptr) => ptr.cast::<T>(),
            None => NonNull::dangling(),
        };

        unsafe { ptr.as_ptr().write(value) };

        Self {
            ptr,
            registry,
            _marker: PhantomData,
        }
    }

    /// Move the value out and release its memory
    pub fn into_inner(this: Self) -> T {
        let this = ManuallyDrop::new(this);
        unsafe {
            let value = ptr::read(this.ptr.as_ptr());
            this.release();
            value
        }
    }

    /// Raw pointer to the value
    #[inline]
    pub fn as_ptr(this: &Self) -> *const T {
        this.ptr.as_ptr()
    }

    /// Return the memory to the registry without dropping the value
    unsafe fn release(&self) {
        self.registry
            .deallocate_layout(self.ptr.as_ptr() as *mut u8, Layout::new::<T>());
    }
}

impl<T> Drop for PoolBox<'_, T> {
    fn drop(&mut self) {
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            self.release();
        }
    }
}

impl<T> Deref for PoolBox<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for PoolBox<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: fmt::Debug> fmt::Debug for PoolBox<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

// SAFETY: the box uniquely owns its `T`; the registry is `Sync`.
unsafe impl<T: Send> Send for PoolBox<'_, T> {}
unsafe impl<T: Sync> Sync for PoolBox<'_, T> {}
