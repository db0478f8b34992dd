//! The buddy allocator itself: split engine, allocate entry point, coalesce
//! engine, free entry point, and dump.

use core::fmt;
use core::ptr::NonNull;

use crate::addr::{addr_of, buddy_offset, buddy_page, page_of};
use crate::free_list::{is_free_head, FreeListRegistry};
use crate::order::order_for;
use crate::page::{new_page_table, BlockState, PageIndex, PageTable};
use crate::{ARENA_SIZE, MAX_ORDER, MIN_ORDER, NUM_ORDERS, NUM_PAGES};

/// Why a call into [`BuddyAllocator::try_free`] rejected its argument.
///
/// Every variant means the caller is freeing something that isn't a live,
/// allocated block head. The unchecked [`BuddyAllocator::free`] turns every
/// variant into a panic; `try_free` exists for embedders who want to handle
/// the condition themselves instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The address does not fall within the managed arena at all.
    OutOfRange,
    /// The page at this address is not currently the head of an allocated
    /// block (it may be free already, or interior to some other block).
    NotAllocated,
    /// The page's recorded order lies outside `[MIN_ORDER, MAX_ORDER]`.
    CorruptOrder,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AllocError::OutOfRange => "address outside the managed arena",
            AllocError::NotAllocated => "address is not a currently allocated block head",
            AllocError::CorruptOrder => "block head carries an out-of-range order",
        };
        f.write_str(msg)
    }
}

/// A binary buddy allocator managing a single, fixed-size arena of
/// `2^MAX_ORDER` bytes, partitioned into `2^(MAX_ORDER - MIN_ORDER)` pages
/// of `2^MIN_ORDER` bytes.
///
/// Construct with [`BuddyAllocator::new`], then call [`BuddyAllocator::init`]
/// once before the first [`allocate`](BuddyAllocator::allocate) or
/// [`free`](BuddyAllocator::free). `init` may be called again later to reset
/// all state, discarding any outstanding allocations.
pub struct BuddyAllocator {
    arena: [u8; ARENA_SIZE],
    pages: PageTable,
    free: FreeListRegistry,
}

impl fmt::Debug for BuddyAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuddyAllocator")
            .field("arena_size", &ARENA_SIZE)
            .field("page_size", &(1usize << MIN_ORDER))
            .field("free", &self.dump())
            .finish()
    }
}

impl Default for BuddyAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BuddyAllocator {
    /// An allocator with no arena set up yet. Call [`init`](Self::init)
    /// before using it.
    pub const fn new() -> Self {
        Self { arena: [0u8; ARENA_SIZE], pages: new_page_table(), free: FreeListRegistry::new() }
    }

    /// Reset to the single-block initial state: one free block of order
    /// `MAX_ORDER` covering the whole arena, all other free lists empty.
    /// Discards any outstanding allocations; safe to call repeatedly.
    pub fn init(&mut self) {
        self.pages = new_page_table();
        self.free = FreeListRegistry::new();

        self.pages[0].order = Some(MAX_ORDER);
        self.pages[0].state = BlockState::Free;
        self.free.push_front(&mut self.pages, MAX_ORDER, 0);

        log::info!(
            "buddy allocator initialized: {ARENA_SIZE} bytes, {NUM_PAGES} pages, orders {MIN_ORDER}..={MAX_ORDER}"
        );
    }

    /// Reduce the free block headed by `page` (currently of order
    /// `from_order`, already removed from its free list) down to order
    /// `to_order`, enqueueing each right-half buddy along the way.
    ///
    /// The retained (left) half keeps `page`'s starting address at every
    /// step, since a block's left half always starts where the block
    /// itself started.
    fn split(&mut self, page: PageIndex, from_order: u32, to_order: u32) {
        let base = addr_of(page);
        let mut order = from_order;

        while order > to_order {
            let buddy = page_of(buddy_offset(base, order - 1));

            self.pages[buddy as usize].order = Some(order - 1);
            self.pages[buddy as usize].state = BlockState::Free;
            self.free.push_front(&mut self.pages, order - 1, buddy);

            order -= 1;
            log::trace!("split: order {} yields buddy page {buddy} at order {order}", order + 1);
        }
    }

    /// Service a request for `size` bytes. Returns `None` if `size` exceeds
    /// `2^MAX_ORDER` or no free block of sufficient size can be produced.
    /// A `size` of 0 returns a valid, distinct minimum-size block.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let target = order_for(size)?;

        let mut source_order = target;
        while source_order <= MAX_ORDER && self.free.is_empty(source_order) {
            source_order += 1;
        }
        if source_order > MAX_ORDER {
            log::warn!("allocate: out of memory for {size} bytes (order {target})");
            return None;
        }

        let page = self
            .free
            .pop_front(&mut self.pages, source_order)
            .expect("free list reported non-empty but pop_front found nothing");

        if source_order > target {
            self.split(page, source_order, target);
        }

        self.pages[page as usize].order = Some(target);
        self.pages[page as usize].state = BlockState::Allocated;

        log::debug!("allocate: {size} bytes -> order {target}, page {page}");

        // SAFETY: `addr_of(page) < ARENA_SIZE` for any page in the table.
        let ptr = unsafe { self.arena.as_mut_ptr().add(addr_of(page)) };
        NonNull::new(ptr)
    }

    /// Coalesce-and-free primitive underlying both [`free`](Self::free) and
    /// [`try_free`](Self::try_free).
    fn coalesce_and_release(&mut self, mut page: PageIndex, mut order: u32) {
        while order < MAX_ORDER {
            let buddy = buddy_page(page, order);
            if !is_free_head(&self.pages, buddy, order) {
                break;
            }

            self.free.remove(&mut self.pages, order, buddy);

            // Whichever of the two merged blocks isn't the new head becomes
            // interior: clear it to dormant so it can't be mistaken for a
            // live block (free or allocated) by a later lookup.
            let absorbed = if buddy < page {
                let old_page = page;
                page = buddy;
                old_page
            } else {
                buddy
            };
            self.pages[absorbed as usize].order = None;
            self.pages[absorbed as usize].state = BlockState::Allocated;

            order += 1;
            log::trace!("coalesce: merged into page {page} at order {order}");
        }

        self.pages[page as usize].order = Some(order);
        self.pages[page as usize].state = BlockState::Free;
        self.free.push_front(&mut self.pages, order, page);
        log::debug!("free: page {page}, order {order}");
    }

    /// Release a block previously returned by [`allocate`](Self::allocate).
    /// Returns an error instead of panicking when `addr` is not currently
    /// an allocated block head, so embedders can choose their own recovery
    /// policy for this kind of precondition violation.
    pub fn try_free(&mut self, addr: NonNull<u8>) -> Result<(), AllocError> {
        let offset = (addr.as_ptr() as usize).wrapping_sub(self.arena.as_ptr() as usize);
        if offset >= ARENA_SIZE {
            return Err(AllocError::OutOfRange);
        }

        let page = page_of(offset);
        let order = self.pages[page as usize].order.ok_or(AllocError::NotAllocated)?;
        if self.pages[page as usize].state != BlockState::Allocated {
            return Err(AllocError::NotAllocated);
        }
        if order < MIN_ORDER || order > MAX_ORDER {
            return Err(AllocError::CorruptOrder);
        }

        self.coalesce_and_release(page, order);
        Ok(())
    }

    /// Release a block previously returned by [`allocate`](Self::allocate).
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not currently an outstanding allocation head
    /// (double free, freeing an unallocated address, or a corrupted order
    /// field). Treated as a programming error with no defined recovery.
    pub fn free(&mut self, addr: NonNull<u8>) {
        if let Err(e) = self.try_free(addr) {
            panic!("buddy_allocator: precondition violation freeing {addr:p}: {e}");
        }
    }

    /// Snapshot per-order free-block counts. Observational only.
    pub fn dump(&self) -> Dump {
        let mut counts = [0u32; NUM_ORDERS];
        for (i, count) in counts.iter_mut().enumerate() {
            let order = MIN_ORDER + i as u32;
            *count = self.free.count(&self.pages, order) as u32;
        }
        Dump { counts }
    }
}

/// A snapshot of per-order free-block counts, as produced by
/// [`BuddyAllocator::dump`]. `Display` renders an informal `count:sizeK`
/// text summary; the format is informative, not a stable wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dump {
    counts: [u32; NUM_ORDERS],
}

impl Dump {
    /// Free-block count at the given order, or `0` if `order` is outside
    /// `[MIN_ORDER, MAX_ORDER]`.
    pub fn count_at(&self, order: u32) -> u32 {
        if order < MIN_ORDER || order > MAX_ORDER {
            return 0;
        }
        self.counts[(order - MIN_ORDER) as usize]
    }
}

impl fmt::Display for Dump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, count) in self.counts.iter().enumerate() {
            let order = MIN_ORDER + i as u32;
            let kib = (1usize << order) / 1024;
            write!(f, "{count}:{kib}K ")?;
        }
        Ok(())
    }
}
