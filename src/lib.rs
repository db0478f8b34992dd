//! A binary buddy allocator managing a fixed arena of `2^MAX_ORDER` bytes,
//! partitioned into `2^(MAX_ORDER - MIN_ORDER)` pages of `2^MIN_ORDER`
//! bytes each.
//!
//! Requests are rounded up to the nearest power-of-two page count; a block
//! of that order is produced by splitting the smallest available larger
//! free block, and released blocks are eagerly coalesced with their buddy
//! as long as it remains free. See [`BuddyAllocator`] for the synchronous,
//! single-arena entry points, and [`LockedBuddyAllocator`] for a
//! lock-guarded global instance.
//!
//! The crate is `no_std` outside of `cfg(test)`: it owns its arena as a
//! plain byte array and never touches the global heap.
#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

mod addr;
mod buddy;
mod free_list;
mod locked;
mod order;
mod page;

#[cfg(test)]
mod tests;

pub use buddy::{AllocError, BuddyAllocator, Dump};
pub use locked::LockedBuddyAllocator;
pub use order::order_for;

/// Smallest supported block order: pages are `2^MIN_ORDER` bytes.
///
/// Reference value from the system this allocator is modeled on: 12 (4 KiB
/// pages). Override by editing this constant and rebuilding; there is no
/// runtime configuration.
pub const MIN_ORDER: u32 = 12;

/// Largest supported block order: the whole arena is `2^MAX_ORDER` bytes.
///
/// Reference value: 20 (1 MiB arena).
pub const MAX_ORDER: u32 = 20;

/// Size in bytes of the smallest block.
pub const PAGE_SIZE: usize = 1 << MIN_ORDER;

/// Size in bytes of the whole arena.
pub const ARENA_SIZE: usize = 1 << MAX_ORDER;

/// Number of pages in the arena.
pub const NUM_PAGES: usize = 1 << (MAX_ORDER - MIN_ORDER);

/// Number of distinct orders, `MIN_ORDER..=MAX_ORDER` inclusive.
pub const NUM_ORDERS: usize = (MAX_ORDER - MIN_ORDER + 1) as usize;

static_assertions::const_assert!(MIN_ORDER < MAX_ORDER);
static_assertions::const_assert!(MAX_ORDER < usize::BITS);

/// The process-wide allocator instance.
///
/// Call [`init`] once before the first [`allocate`] or [`free`]. Most
/// embedders should prefer the free functions in this module over reaching
/// into the static directly.
static ALLOCATOR: LockedBuddyAllocator = LockedBuddyAllocator::new();

/// Borrow the process-wide allocator instance directly, for callers that
/// need [`LockedBuddyAllocator::dump`] or want to hold the lock across more
/// than one operation.
pub fn allocator() -> &'static LockedBuddyAllocator {
    &ALLOCATOR
}

/// Reset the process-wide allocator to its initial single-block state.
/// See [`BuddyAllocator::init`].
pub fn init() {
    ALLOCATOR.init();
}

/// Service a request for `size` bytes from the process-wide allocator.
/// See [`BuddyAllocator::allocate`].
pub fn allocate(size: usize) -> Option<core::ptr::NonNull<u8>> {
    ALLOCATOR.allocate(size)
}

/// Release a block previously returned by [`allocate`], via the
/// process-wide allocator. See [`BuddyAllocator::free`].
pub fn free(addr: core::ptr::NonNull<u8>) {
    ALLOCATOR.free(addr);
}

/// Snapshot per-order free-block counts from the process-wide allocator.
pub fn dump() -> Dump {
    ALLOCATOR.dump()
}
