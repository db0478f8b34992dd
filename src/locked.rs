//! A [`spin::Mutex`]-guarded [`BuddyAllocator`], suitable for a `static`
//! global instance, with an optional [`GlobalAlloc`] front door.

use core::ptr::NonNull;

use spin::Mutex;

use crate::buddy::{AllocError, BuddyAllocator, Dump};

/// A [`BuddyAllocator`] behind a spinlock, safe to park in a `static`.
///
/// Mirrors the allocator's own `new`/`init` split: [`LockedBuddyAllocator::new`]
/// is a `const fn` usable in a `static` initializer, and does not touch the
/// arena; [`LockedBuddyAllocator::init`] must run once, after the lock can
/// actually be taken, before the first allocation.
pub struct LockedBuddyAllocator(Mutex<BuddyAllocator>);

impl LockedBuddyAllocator {
    /// A locked allocator with no arena set up yet.
    pub const fn new() -> Self {
        Self(Mutex::new(BuddyAllocator::new()))
    }

    /// Reset the underlying allocator. See [`BuddyAllocator::init`].
    pub fn init(&self) {
        self.0.lock().init();
    }

    /// See [`BuddyAllocator::allocate`].
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.0.lock().allocate(size)
    }

    /// See [`BuddyAllocator::try_free`].
    pub fn try_free(&self, addr: NonNull<u8>) -> Result<(), AllocError> {
        self.0.lock().try_free(addr)
    }

    /// See [`BuddyAllocator::free`].
    pub fn free(&self, addr: NonNull<u8>) {
        self.0.lock().free(addr);
    }

    /// See [`BuddyAllocator::dump`].
    pub fn dump(&self) -> Dump {
        self.0.lock().dump()
    }
}

impl Default for LockedBuddyAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "global-allocator")]
mod global {
    use core::alloc::{GlobalAlloc, Layout};
    use core::ptr;

    use super::LockedBuddyAllocator;
    use crate::order::order_for;

    /// `GlobalAlloc` front door onto the buddy allocator.
    ///
    /// Every block is naturally aligned to its own size (`2^order`), so a
    /// request whose `Layout::align()` exceeds the block size the requested
    /// length maps to cannot be satisfied; such requests fail with a null
    /// return rather than silently under-aligning.
    unsafe impl GlobalAlloc for LockedBuddyAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let Some(order) = order_for(layout.size()) else {
                return ptr::null_mut();
            };
            let block_align = 1usize << order;
            if layout.align() > block_align {
                return ptr::null_mut();
            }

            match self.allocate(layout.size()) {
                Some(ptr) => ptr.as_ptr(),
                None => ptr::null_mut(),
            }
        }

        unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
            let Some(ptr) = ptr::NonNull::new(ptr) else { return };
            self.free(ptr);
        }
    }
}
