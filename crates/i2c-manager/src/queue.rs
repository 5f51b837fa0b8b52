use core::ptr;
use core::ptr::NonNull;

use portable_atomic::{AtomicPtr, Ordering};

use crate::transaction::I2cTransaction;

/// FIFO of queued transactions for one controller.
///
/// The head is an atomic pointer so the interrupt handler can observe it
/// with a plain load; every compound mutation (enqueue, pop) happens under
/// the controller's critical section, held by the caller.
pub(crate) struct TransactionQueue {
    head: AtomicPtr<I2cTransaction>,
}

impl TransactionQueue {
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn head(&self) -> Option<NonNull<I2cTransaction>> {
        NonNull::new(self.head.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        self.head().is_none()
    }

    /// Enqueue `t`. Returns true when the queue was empty, i.e. the caller
    /// must start the hardware.
    ///
    /// # Safety
    ///
    /// Caller holds the critical section and transfers ownership of `t`.
    pub unsafe fn enqueue(&self, t: NonNull<I2cTransaction>) -> bool {
        match self.head() {
            None => {
                self.head.store(t.as_ptr(), Ordering::Release);
                true
            }
            Some(mut head) => {
                // SAFETY: the queue owns `head`; the caller holds the
                // critical section and owns `t`.
                unsafe { head.as_mut().append(t) };
                false
            }
        }
    }

    /// Detach and return the head transaction, promoting its successor.
    ///
    /// # Safety
    ///
    /// Caller holds the critical section; ownership of the returned
    /// transaction transfers to the caller.
    pub unsafe fn pop(&self) -> Option<NonNull<I2cTransaction>> {
        let mut head = self.head()?;
        // SAFETY: the queue owns `head` until this detach completes.
        let next = unsafe { head.as_mut() }.take_next();
        self.head.store(
            next.map_or(ptr::null_mut(), NonNull::as_ptr),
            Ordering::Release,
        );
        Some(head)
    }
}
