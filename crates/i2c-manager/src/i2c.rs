use core::ptr::NonNull;

use alloc::boxed::Box;
use portable_atomic::{AtomicU32, Ordering};
use slot_pool::SlotAlloc;

use crate::callback::{EventCallback, SegmentHook};
use crate::error::I2cError;
use crate::events::EventSet;
use crate::hal::Pin;
use crate::manager::ResourceManager;
use crate::pinmap::BusMap;
use crate::segment::{Direction, I2cSegment};
use crate::transaction::I2cTransaction;

/// Bus frequency applied to builders until [`I2c::frequency`] changes it.
pub const DEFAULT_FREQUENCY: u32 = 100_000;

/// A client handle on one bus: binds a pin pair to its controller at
/// construction and composes transfers against it.
///
/// Construction that fails to resolve the pin pair poisons the handle;
/// every later post fails with [`I2cError::InvalidMaster`]. The handle does
/// not own the resource manager, and does not own its transactions once
/// they are posted — but it must outlive them, which is why builders
/// require a `'static` handle (keep it in a `static`, or leak it).
///
/// With pools attached ([`with_pools`](Self::with_pools)), transfers may
/// also be composed from interrupt context via
/// [`transfer_to_irqsafe`](Self::transfer_to_irqsafe); ordinary transfers
/// allocate from the heap.
pub struct I2c {
    master: Option<&'static dyn ResourceManager>,
    hz: AtomicU32,
    tx_pool: Option<&'static dyn SlotAlloc<I2cTransaction>>,
    seg_pool: Option<&'static dyn SlotAlloc<I2cSegment>>,
}

impl I2c {
    /// Bind to the controller serving `sda`/`scl`, heap allocation only.
    pub fn new(map: &BusMap, sda: Pin, scl: Pin) -> Self {
        Self::bind(map, sda, scl, None, None)
    }

    /// Bind with pool allocators, enabling irqsafe transfers.
    pub fn with_pools(
        map: &BusMap,
        sda: Pin,
        scl: Pin,
        tx_pool: &'static dyn SlotAlloc<I2cTransaction>,
        seg_pool: &'static dyn SlotAlloc<I2cSegment>,
    ) -> Self {
        Self::bind(map, sda, scl, Some(tx_pool), Some(seg_pool))
    }

    fn bind(
        map: &BusMap,
        sda: Pin,
        scl: Pin,
        tx_pool: Option<&'static dyn SlotAlloc<I2cTransaction>>,
        seg_pool: Option<&'static dyn SlotAlloc<I2cSegment>>,
    ) -> Self {
        let master = match map.resolve(sda, scl) {
            Some((_, m)) => match m.init(sda, scl) {
                Ok(()) => Some(m),
                Err(_e) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("i2c master rejected pins {}/{}: {}", sda, scl, _e);
                    None
                }
            },
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("no i2c master serves pins {}/{}", sda, scl);
                None
            }
        };
        Self {
            master,
            hz: AtomicU32::new(DEFAULT_FREQUENCY),
            tx_pool,
            seg_pool,
        }
    }

    /// True when construction resolved a controller.
    pub fn is_bound(&self) -> bool {
        self.master.is_some()
    }

    /// Set the default bus frequency for subsequent builders.
    pub fn frequency(&self, hz: u32) {
        self.hz.store(hz, Ordering::Relaxed);
    }

    /// Compose a transfer to `address`. The builder posts on
    /// [`apply`](Transfer::apply), or when it goes out of scope.
    pub fn transfer_to(&'static self, address: u16) -> Transfer {
        Transfer::new(self, address, self.hz.load(Ordering::Relaxed), false)
    }

    /// Compose a transfer allocated from the pools, safe to build and free
    /// from interrupt context. Fails at [`apply`](Transfer::apply) with
    /// [`I2cError::MissingPoolAllocator`] when the handle has no pools.
    pub fn transfer_to_irqsafe(&'static self, address: u16) -> Transfer {
        Transfer::new(self, address, self.hz.load(Ordering::Relaxed), true)
    }

    pub(crate) fn new_transaction(
        &'static self,
        address: u16,
        hz: u32,
        irqsafe: bool,
    ) -> Result<NonNull<I2cTransaction>, I2cError> {
        let t = I2cTransaction::new(address, hz, irqsafe, self);
        if irqsafe {
            let pool = self.tx_pool.ok_or(I2cError::MissingPoolAllocator)?;
            pool.alloc(t).map_err(|_| I2cError::NullTransaction)
        } else {
            Ok(NonNull::from(Box::leak(Box::new(t))))
        }
    }

    pub(crate) fn alloc_segment(&self, irqsafe: bool) -> Result<NonNull<I2cSegment>, I2cError> {
        if irqsafe {
            let pool = self.seg_pool.ok_or(I2cError::MissingPoolAllocator)?;
            pool.alloc(I2cSegment::new())
                .map_err(|_| I2cError::NullSegment)
        } else {
            Ok(NonNull::from(Box::leak(Box::new(I2cSegment::new()))))
        }
    }

    pub(crate) fn free_segment(&self, s: NonNull<I2cSegment>, irqsafe: bool) {
        if irqsafe {
            match self.seg_pool {
                // SAFETY: irqsafe segments were claimed from this pool.
                Some(pool) => unsafe { pool.free(s) },
                None => debug_assert!(false, "irqsafe segment without a pool"),
            }
        } else {
            // SAFETY: ordinary segments come from Box::leak in
            // alloc_segment; ownership returns here exactly once.
            drop(unsafe { Box::from_raw(s.as_ptr()) });
        }
    }

    /// Free `t` and its whole segment chain through the allocator that
    /// produced them.
    pub(crate) fn free_transaction(&self, t: NonNull<I2cTransaction>) {
        // SAFETY: exclusive ownership of `t` transfers to this call; the
        // chain is owned by the transaction and freed exactly once.
        unsafe {
            let irqsafe = t.as_ref().irqsafe();
            let mut seg = t.as_ref().root_ptr();
            while let Some(s) = seg {
                seg = s.as_ref().next_ptr();
                self.free_segment(s, irqsafe);
            }
            if irqsafe {
                match self.tx_pool {
                    Some(pool) => pool.free(t),
                    None => debug_assert!(false, "irqsafe transaction without a pool"),
                }
            } else {
                drop(Box::from_raw(t.as_ptr()));
            }
        }
    }

    pub(crate) fn post(&self, t: NonNull<I2cTransaction>) -> Result<(), I2cError> {
        let Some(master) = self.master else {
            self.free_transaction(t);
            return Err(I2cError::InvalidMaster);
        };
        // SAFETY: `t` was built by this handle and is exclusively owned
        // here.
        let rc = unsafe { master.post_transaction(t) };
        if let Err(e) = rc {
            // Busy means the transaction was queued behind a foreign
            // transfer and still completes; anything else was rejected
            // before enqueue.
            if e != I2cError::Busy {
                self.free_transaction(t);
            }
        }
        rc
    }
}

/// Fluent composer for one transaction.
///
/// Appends segments and handlers, then submits via [`apply`](Self::apply) —
/// or implicitly on drop, so a single chained expression is a complete
/// transfer:
///
/// ```rust,ignore
/// i2c.transfer_to(0x50)
///     .tx(&CMD)
///     .rx_inline(4)
///     .on(EventSet::ALL, done_cb);
/// ```
///
/// After an allocation failure every later call is a no-op and `apply`
/// reports the failure. `apply` is idempotent: repeated calls return the
/// first posting result.
pub struct Transfer {
    i2c: &'static I2c,
    xact: Option<NonNull<I2cTransaction>>,
    posted: bool,
    rc: Result<(), I2cError>,
}

impl Transfer {
    fn new(i2c: &'static I2c, address: u16, hz: u32, irqsafe: bool) -> Self {
        match i2c.new_transaction(address, hz, irqsafe) {
            Ok(t) => Self {
                i2c,
                xact: Some(t),
                posted: false,
                rc: Ok(()),
            },
            Err(e) => Self {
                i2c,
                xact: None,
                posted: false,
                rc: Err(e),
            },
        }
    }

    fn xact_mut(&mut self) -> Option<&mut I2cTransaction> {
        // SAFETY: the builder exclusively owns the transaction until it is
        // posted; `xact` is cleared at that point.
        self.xact.map(|t| unsafe { &mut *t.as_ptr() })
    }

    fn add_segment(&mut self, dir: Direction, fill: impl FnOnce(&mut I2cSegment)) {
        let Some(t) = self.xact else { return };
        // SAFETY: as in xact_mut.
        match unsafe { &mut *t.as_ptr() }.new_segment() {
            Ok(s) => {
                s.set_dir(dir);
                fill(s);
            }
            Err(e) => {
                if self.rc.is_ok() {
                    self.rc = Err(e);
                }
            }
        }
    }

    /// Override the frequency for this transaction only.
    pub fn frequency(&mut self, hz: u32) -> &mut Self {
        if let Some(t) = self.xact_mut() {
            t.set_hz(hz);
        }
        self
    }

    /// Append a transmit segment referencing `buf`.
    pub fn tx(&mut self, buf: &'static [u8]) -> &mut Self {
        self.add_segment(Direction::Transmit, |s| {
            s.set(buf.as_ptr() as *mut u8, buf.len())
        });
        self
    }

    /// Append a transmit segment referencing `len` bytes at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for reading `len` bytes until the transaction's
    /// last callback has returned.
    pub unsafe fn tx_raw(&mut self, ptr: *const u8, len: usize) -> &mut Self {
        self.add_segment(Direction::Transmit, |s| s.set(ptr as *mut u8, len));
        self
    }

    /// Append a receive segment into `buf`.
    pub fn rx(&mut self, buf: &'static mut [u8]) -> &mut Self {
        let (ptr, len) = (buf.as_mut_ptr(), buf.len());
        self.add_segment(Direction::Receive, |s| s.set(ptr, len));
        self
    }

    /// Append a receive segment into `len` bytes at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for writing `len` bytes until the transaction's
    /// last callback has returned.
    pub unsafe fn rx_raw(&mut self, ptr: *mut u8, len: usize) -> &mut Self {
        self.add_segment(Direction::Receive, |s| s.set(ptr, len));
        self
    }

    /// Append a receive segment with no caller buffer: the bytes live
    /// inside the segment when `len` fits [`INLINE_CAP`](crate::INLINE_CAP)
    /// (read them from the completion callback via
    /// [`inline_bytes`](crate::SegmentBuffer::inline_bytes)), otherwise the
    /// backend receives into an anonymous buffer supplied by the hardware
    /// layer.
    pub fn rx_inline(&mut self, len: usize) -> &mut Self {
        self.add_segment(Direction::Receive, |s| {
            // SAFETY: a null source skips the copy.
            unsafe { s.set_ephemeral(core::ptr::null(), len) }
        });
        self
    }

    /// Attach an interrupt-context hook to the most recently appended
    /// segment.
    pub fn irq_hook(&mut self, hook: SegmentHook) -> &mut Self {
        if let Some(t) = self.xact_mut() {
            if let Some(mut s) = t.current_ptr() {
                // SAFETY: during composition the cursor is the chain's tail,
                // exclusively owned by the builder's transaction.
                unsafe { s.as_mut() }.set_irq_cb(hook);
            }
        }
        self
    }

    /// Register a handler for the events in `mask`. With all four slots
    /// occupied the callback is dropped.
    pub fn on(&mut self, mask: EventSet, cb: EventCallback) -> &mut Self {
        if let Some(t) = self.xact_mut() {
            let installed = t.add_event(mask, cb);
            if !installed {
                #[cfg(feature = "defmt")]
                defmt::warn!("i2c handler table full, callback dropped");
            }
        }
        self
    }

    /// Suppress the STOP condition at the end of the transaction, leaving
    /// the bus acquired for a follow-up transfer.
    pub fn repeated_start(&mut self) -> &mut Self {
        if let Some(t) = self.xact_mut() {
            t.set_repeated(true);
        }
        self
    }

    /// Post the composed transaction. Idempotent; also invoked on drop.
    pub fn apply(&mut self) -> Result<(), I2cError> {
        if self.posted {
            return self.rc;
        }
        self.posted = true;
        match self.xact.take() {
            Some(t) => {
                if self.rc.is_ok() {
                    self.rc = self.i2c.post(t);
                } else {
                    // A segment allocation failed mid-composition.
                    self.i2c.free_transaction(t);
                }
            }
            None => debug_assert!(self.rc.is_err()),
        }
        self.rc
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        let _ = self.apply();
    }
}
