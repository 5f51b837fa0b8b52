#![no_std]
//! Fixed-capacity slot allocator for interrupt-driven drivers.
//!
//! # Problem
//!
//! Drivers that accept work from interrupt context cannot allocate from a
//! general-purpose heap: the heap lock may be held by the interrupted code.
//! They need a small, fixed set of slots whose `alloc`/`free` are
//! non-blocking and callable from any context.
//!
//! # Solution
//!
//! [`SlotPool<T, N>`] keeps `N` slots of `T` in uninitialized static storage
//! ([`GroundedCell`](grounded::uninit::GroundedCell)). Each slot carries an
//! atomic claim flag; `alloc` claims a slot with a single compare-and-swap
//! and moves the value in, `free` drops the value in place and releases the
//! flag. No locks, no suspension, O(N) worst case with N small.
//!
//! Clients that should not name the capacity hold the pool as
//! `&'static dyn SlotAlloc<T>`.
//!
//! # Safety invariants
//!
//! - A slot's storage is written only by the `alloc` call that won its claim
//!   flag, and dropped only by the `free` call for that pointer.
//! - `free` accepts only pointers previously returned by `alloc` on the same
//!   pool; each such pointer is freed at most once.

use core::ptr::NonNull;

use grounded::uninit::GroundedCell;
use portable_atomic::{AtomicBool, Ordering};

/// Allocation interface of a fixed-capacity pool.
///
/// All operations are non-blocking and callable from interrupt context.
pub trait SlotAlloc<T>: Sync {
    /// Claim a free slot and move `value` into it.
    ///
    /// Returns the value on exhaustion so the caller can recover it.
    fn alloc(&self, value: T) -> Result<NonNull<T>, T>;

    /// Drop the value in `slot` and release the slot.
    ///
    /// # Safety
    ///
    /// `slot` must have been returned by `alloc` on this pool and must not
    /// have been freed since. The caller transfers ownership of the value.
    unsafe fn free(&self, slot: NonNull<T>);

    /// Number of currently unclaimed slots.
    fn free_count(&self) -> usize;

    /// Total number of slots.
    fn capacity(&self) -> usize;
}

struct Slot<T> {
    claimed: AtomicBool,
    value: GroundedCell<T>,
}

impl<T> Slot<T> {
    const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
            value: GroundedCell::uninit(),
        }
    }
}

/// A pool of `N` slots of `T` with lock-free claim/release.
///
/// `const`-constructible, so it can live in a `static`:
///
/// ```rust
/// use slot_pool::{SlotAlloc, SlotPool};
///
/// static POOL: SlotPool<u32, 4> = SlotPool::new();
///
/// let p = POOL.alloc(7).unwrap();
/// assert_eq!(POOL.free_count(), 3);
/// unsafe { POOL.free(p) };
/// assert_eq!(POOL.free_count(), 4);
/// ```
pub struct SlotPool<T, const N: usize> {
    slots: [Slot<T>; N],
}

impl<T, const N: usize> SlotPool<T, N> {
    pub const fn new() -> Self {
        Self {
            slots: [const { Slot::new() }; N],
        }
    }
}

impl<T, const N: usize> Default for SlotPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: slot storage is only ever accessed by the context that owns the
// claim flag transition for it (see the crate-level invariants), so sharing
// the pool between contexts is sound whenever the values themselves may move
// between contexts.
unsafe impl<T: Send, const N: usize> Sync for SlotPool<T, N> {}

impl<T: Send, const N: usize> SlotAlloc<T> for SlotPool<T, N> {
    fn alloc(&self, value: T) -> Result<NonNull<T>, T> {
        for slot in &self.slots {
            if slot
                .claimed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let p = slot.value.get();
                // SAFETY: the claim flag grants this call exclusive access to
                // the slot's storage, which holds no live value.
                unsafe { p.write(value) };
                // SAFETY: GroundedCell storage is never null.
                return Ok(unsafe { NonNull::new_unchecked(p) });
            }
        }
        Err(value)
    }

    unsafe fn free(&self, ptr: NonNull<T>) {
        for slot in &self.slots {
            if slot.value.get() == ptr.as_ptr() {
                debug_assert!(slot.claimed.load(Ordering::Acquire), "double free");
                // SAFETY: the caller owns the value per the trait contract.
                unsafe { core::ptr::drop_in_place(ptr.as_ptr()) };
                slot.claimed.store(false, Ordering::Release);
                return;
            }
        }
        debug_assert!(false, "pointer does not belong to this pool");
    }

    fn free_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !s.claimed.load(Ordering::Relaxed))
            .count()
    }

    fn capacity(&self) -> usize {
        N
    }
}
