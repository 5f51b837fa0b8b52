use core::cell::RefCell;
use core::ptr::NonNull;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Deque;

use crate::events::EventSet;
use crate::transaction::I2cTransaction;

/// A finished transaction together with the event that ended it, waiting for
/// its task-level dispatch.
///
/// Running a dispatch invokes the transaction's handlers in registration
/// order and then frees it through its issuer; every posted transaction is
/// dispatched at most once.
pub struct Dispatch {
    t: NonNull<I2cTransaction>,
    event: EventSet,
}

// SAFETY: a dispatch exclusively owns its transaction (the queue detaches it
// before posting); moving it from interrupt to task context is the designed
// hand-off.
unsafe impl Send for Dispatch {}

impl Dispatch {
    pub(crate) fn new(t: NonNull<I2cTransaction>, event: EventSet) -> Self {
        Self { t, event }
    }

    pub fn event(&self) -> EventSet {
        self.event
    }

    /// Run the transaction's handlers, then free it through its issuer.
    pub fn run(self) {
        let mut t = self.t;
        // SAFETY: the dispatch exclusively owns the transaction and is
        // consumed here, so this is the only live access.
        let tx = unsafe { t.as_mut() };
        let issuer = tx.issuer();
        tx.process_event(self.event);
        issuer.free_transaction(t);
    }
}

/// The task-level executor seam: the engine posts a [`Dispatch`] from
/// interrupt context, the scheduler runs it at task level.
pub trait EventScheduler: Sync {
    fn post(&self, dispatch: Dispatch);
}

/// A fixed-capacity dispatch queue: interrupt-safe `post`, cooperative
/// task-level [`run`](Self::run) pump.
///
/// Suitable as the scheduler for ports without an executor of their own; a
/// port's idle loop calls `run` after each interrupt.
pub struct DispatchQueue<const N: usize = 8> {
    queue: Mutex<CriticalSectionRawMutex, RefCell<Deque<Dispatch, N>>>,
}

impl<const N: usize> DispatchQueue<N> {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Run queued dispatches until the queue drains, including any posted by
    /// the handlers themselves.
    pub fn run(&self) {
        while let Some(d) = self.queue.lock(|q| q.borrow_mut().pop_front()) {
            d.run();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock(|q| q.borrow().is_empty())
    }
}

impl<const N: usize> Default for DispatchQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EventScheduler for DispatchQueue<N> {
    fn post(&self, dispatch: Dispatch) {
        let rejected = self.queue.lock(|q| q.borrow_mut().push_back(dispatch));
        if rejected.is_err() {
            // The transaction is dropped without dispatch; its storage leaks
            // rather than risking a free from interrupt context.
            #[cfg(feature = "defmt")]
            defmt::warn!("dispatch queue full, dropping completion");
        }
    }
}
