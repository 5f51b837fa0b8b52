use core::cell::RefCell;
use core::ptr;
use core::ptr::NonNull;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicBool, Ordering};

use crate::buffer::MAX_REF_LEN;
use crate::error::I2cError;
use crate::events::EventSet;
use crate::hal::{DmaUsage, I2cHal, Pin};
use crate::queue::TransactionQueue;
use crate::scheduler::{Dispatch, EventScheduler};
use crate::segment::Direction;
use crate::transaction::I2cTransaction;

/// Largest legal target address (10-bit addressing).
const MAX_ADDRESS: u16 = 0x3FF;

/// The per-controller multiplexer seam: serialize posted transactions onto
/// one controller and bind it to a pin pair.
///
/// There is exactly one manager per physical controller; clients reach it
/// through the board's [`BusMap`](crate::BusMap). [`HwMaster`] is the
/// on-chip-controller implementation; a port adding another controller kind
/// (a bridge, a bitbanged master) supplies its own.
pub trait ResourceManager: Sync {
    /// Bind the controller to a pin pair. Called for every client that
    /// resolves to this controller; rebinding to different pins fails with
    /// [`I2cError::PinMismatch`].
    fn init(&self, sda: Pin, scl: Pin) -> Result<(), I2cError>;

    /// Validate and enqueue `t`, starting the hardware when the queue was
    /// empty.
    ///
    /// # Safety
    ///
    /// `t` must point to a valid transaction exclusively owned by the
    /// caller. On `Ok` and on `Err(Busy)` ownership transfers to the queue
    /// (a busy controller leaves the transaction queued; its turn comes with
    /// the in-flight transfer's completion event). On any other error the
    /// transaction was not enqueued and the caller keeps ownership.
    unsafe fn post_transaction(&self, t: NonNull<I2cTransaction>) -> Result<(), I2cError>;
}

struct HalShared<H> {
    hal: H,
    pins: Option<(Pin, Pin)>,
}

/// Resource manager for an on-chip I2C master controller, generic over the
/// controller's [`I2cHal`].
///
/// Owns the transaction FIFO and the two-level state machine that advances
/// it: segment events either issue the next segment in place (interrupt
/// context) or detach the finished transaction, post its dispatch to the
/// scheduler, and start the next queued transaction.
pub struct HwMaster<H: I2cHal> {
    hal: Mutex<CriticalSectionRawMutex, RefCell<HalShared<H>>>,
    queue: TransactionQueue,
    powered: AtomicBool,
    dma: DmaUsage,
    scheduler: &'static dyn EventScheduler,
}

impl<H: I2cHal> HwMaster<H> {
    pub const fn new(hal: H, scheduler: &'static dyn EventScheduler, dma: DmaUsage) -> Self {
        Self {
            hal: Mutex::new(RefCell::new(HalShared { hal, pins: None })),
            queue: TransactionQueue::new(),
            powered: AtomicBool::new(false),
            dma,
            scheduler,
        }
    }

    /// Controller interrupt entry: read the hardware's pending event bits
    /// and advance the state machine. The board binds the controller
    /// interrupt to this.
    pub fn irq(&self) {
        let event = self.hal.lock(|h| h.borrow_mut().hal.irq_handler());
        self.process_event(event);
    }

    /// Advance the state machine with `event`, raised by the current
    /// segment. Interrupt context.
    ///
    /// The current segment's hook runs first, synchronously. Then, under the
    /// critical section: an error event, or a completion with no segment
    /// left, ends the transaction (its dispatch is posted, the queue
    /// advances or the controller powers down); a completion with segments
    /// left issues the next segment in place.
    pub fn process_event(&self, event: EventSet) {
        let Some(mut t) = self.queue.head() else {
            debug_assert!(false, "i2c event with empty transaction queue");
            #[cfg(feature = "defmt")]
            defmt::warn!("i2c event with empty transaction queue");
            return;
        };
        // SAFETY: the head transaction is exclusively owned by the queue and
        // this interrupt is the only context advancing it.
        unsafe { t.as_mut() }.call_irq_cb(event);
        critical_section::with(|_| {
            // SAFETY: as above, under the critical section.
            let transaction_done = !unsafe { t.as_mut() }.advance_segment();
            if event.is_error() || (event.contains(EventSet::COMPLETE) && transaction_done) {
                self.scheduler.post(Dispatch::new(t, event));
                // SAFETY: critical section held; ownership of the head moved
                // to the dispatch above.
                unsafe { self.queue.pop() };
                if self.queue.is_empty() {
                    self.power_down();
                } else {
                    let _ = self.start_transaction();
                }
            } else if !transaction_done {
                let _ = self.start_segment();
            }
        });
    }

    /// Drain the queue, freeing every pending transaction through its
    /// issuer. No handlers run.
    pub fn drain(&self) {
        critical_section::with(|_| {
            // SAFETY: critical section held; each popped transaction is
            // exclusively owned here and freed exactly once.
            while let Some(t) = unsafe { self.queue.pop() } {
                unsafe { t.as_ref() }.issuer().free_transaction(t);
            }
        });
    }

    /// True while the controller is held powered for queued work.
    pub fn powered(&self) -> bool {
        self.powered.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    fn start_transaction(&self) -> Result<(), I2cError> {
        if self.hal.lock(|h| h.borrow().hal.is_active()) {
            return Err(I2cError::Busy);
        }
        critical_section::with(|_| {
            let Some(t) = self.queue.head() else {
                return Err(I2cError::NullTransaction);
            };
            // SAFETY: head is exclusively owned by the queue; critical
            // section held.
            let hz = {
                let tx = unsafe { &mut *t.as_ptr() };
                tx.reset_current();
                tx.hz()
            };
            self.hal.lock(|h| h.borrow_mut().hal.frequency(hz));
            self.start_segment()
        })
    }

    fn start_segment(&self) -> Result<(), I2cError> {
        let Some(t) = self.queue.head() else {
            return Err(I2cError::NullTransaction);
        };
        // SAFETY: head is exclusively owned by the queue; callers hold the
        // critical section.
        let tx = unsafe { &mut *t.as_ptr() };
        let address = tx.address();
        let stop_tail = !tx.repeated();
        match tx.current_ptr() {
            // Zero segments: an address ping, issued as a zero-length write.
            None => self.hal.lock(|h| {
                h.borrow_mut().hal.transfer_async(
                    ptr::null(),
                    0,
                    ptr::null_mut(),
                    0,
                    address,
                    stop_tail,
                    EventSet::ALL,
                    self.dma,
                )
            }),
            Some(s) => {
                // SAFETY: cursor segments are owned by the head transaction.
                let seg = unsafe { &mut *s.as_ptr() };
                let stop = seg.is_last() && stop_tail;
                let dir = seg.dir();
                let len = seg.get_len();
                let buf = seg.get_buf();
                self.hal.lock(|h| {
                    let mut h = h.borrow_mut();
                    match dir {
                        Direction::Transmit => h.hal.transfer_async(
                            buf as *const u8,
                            len,
                            ptr::null_mut(),
                            0,
                            address,
                            stop,
                            EventSet::ALL,
                            self.dma,
                        ),
                        Direction::Receive => h.hal.transfer_async(
                            ptr::null(),
                            0,
                            buf,
                            len,
                            address,
                            stop,
                            EventSet::ALL,
                            self.dma,
                        ),
                    }
                });
            }
        }
        Ok(())
    }

    fn validate_transaction(&self, t: NonNull<I2cTransaction>) -> Result<(), I2cError> {
        // SAFETY: the caller owns `t`; validation precedes enqueue.
        let tx = unsafe { t.as_ref() };
        if tx.address() > MAX_ADDRESS {
            return Err(I2cError::InvalidAddress);
        }
        let mut seg = tx.root_segment();
        while let Some(s) = seg {
            if !s.is_ephemeral() && s.get_len() > MAX_REF_LEN {
                return Err(I2cError::BufferSize);
            }
            seg = s.next_segment();
        }
        Ok(())
    }

    fn power_up(&self) {
        self.powered.store(true, Ordering::Release);
    }

    fn power_down(&self) {
        self.powered.store(false, Ordering::Release);
    }
}

impl<H: I2cHal> ResourceManager for HwMaster<H> {
    fn init(&self, sda: Pin, scl: Pin) -> Result<(), I2cError> {
        self.hal.lock(|h| {
            let mut h = h.borrow_mut();
            match h.pins {
                None => {
                    h.hal.init(sda, scl)?;
                    h.pins = Some((sda, scl));
                    Ok(())
                }
                Some(bound) if bound == (sda, scl) => Ok(()),
                Some(_) => Err(I2cError::PinMismatch),
            }
        })
    }

    unsafe fn post_transaction(&self, t: NonNull<I2cTransaction>) -> Result<(), I2cError> {
        self.validate_transaction(t)?;
        critical_section::with(|_| {
            // SAFETY: critical section held; ownership of `t` moves to the
            // queue.
            if unsafe { self.queue.enqueue(t) } {
                self.power_up();
                self.start_transaction()
            } else {
                Ok(())
            }
        })
    }
}

impl<H: I2cHal> Drop for HwMaster<H> {
    fn drop(&mut self) {
        self.drain();
    }
}
