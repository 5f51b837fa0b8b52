use core::ptr::NonNull;

use crate::callback::EventCallback;
use crate::error::I2cError;
use crate::events::EventSet;
use crate::i2c::I2c;
use crate::segment::I2cSegment;

/// Number of `(mask, callback)` handler slots per transaction, sized for the
/// documented event classes (complete, early NAK, no slave, generic error).
pub const MAX_HANDLERS: usize = 4;

#[derive(Clone, Copy)]
struct EventHandler {
    mask: EventSet,
    cb: Option<EventCallback>,
}

impl EventHandler {
    const EMPTY: EventHandler = EventHandler {
        mask: EventSet::NONE,
        cb: None,
    };
}

/// A client-visible transfer: one target address at one frequency, composed
/// of zero or more segments executed under a single bus acquisition.
///
/// The transaction exclusively owns its segment chain. `current` doubles as
/// the append cursor during composition and as the execution cursor once the
/// backend calls [`reset_current`](Self::reset_current); it always points at
/// a segment reachable from `root`, or nowhere.
pub struct I2cTransaction {
    next: Option<NonNull<I2cTransaction>>,
    address: u16,
    hz: u32,
    repeated: bool,
    irqsafe: bool,
    issuer: &'static I2c,
    root: Option<NonNull<I2cSegment>>,
    current: Option<NonNull<I2cSegment>>,
    handlers: [EventHandler; MAX_HANDLERS],
}

// SAFETY: the segment chain and queue link are exclusively owned; which
// context may touch a transaction is governed by the engine's queue critical
// sections. Required so irqsafe transactions can live in pool slots and
// dispatches can cross from interrupt to task context.
unsafe impl Send for I2cTransaction {}

impl I2cTransaction {
    pub(crate) fn new(address: u16, hz: u32, irqsafe: bool, issuer: &'static I2c) -> Self {
        Self {
            next: None,
            address,
            hz,
            repeated: false,
            irqsafe,
            issuer,
            root: None,
            current: None,
            handlers: [EventHandler::EMPTY; MAX_HANDLERS],
        }
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn hz(&self) -> u32 {
        self.hz
    }

    pub(crate) fn set_hz(&mut self, hz: u32) {
        self.hz = hz;
    }

    /// True when no STOP condition is generated at the end of the
    /// transaction.
    pub fn repeated(&self) -> bool {
        self.repeated
    }

    pub(crate) fn set_repeated(&mut self, repeated: bool) {
        self.repeated = repeated;
    }

    /// True when the transaction and its segments came from the issuer's
    /// pools and may be freed from interrupt context.
    pub fn irqsafe(&self) -> bool {
        self.irqsafe
    }

    pub fn issuer(&self) -> &'static I2c {
        self.issuer
    }

    pub fn root_segment(&self) -> Option<&I2cSegment> {
        // SAFETY: the chain is owned by `self`; the borrow is tied to `self`.
        self.root.map(|s| unsafe { &*s.as_ptr() })
    }

    pub fn root_segment_mut(&mut self) -> Option<&mut I2cSegment> {
        // SAFETY: as above, with exclusive access through `&mut self`.
        self.root.map(|s| unsafe { &mut *s.as_ptr() })
    }

    pub(crate) fn root_ptr(&self) -> Option<NonNull<I2cSegment>> {
        self.root
    }

    pub(crate) fn current_ptr(&self) -> Option<NonNull<I2cSegment>> {
        self.current
    }

    pub(crate) fn next_ptr(&self) -> Option<NonNull<I2cTransaction>> {
        self.next
    }

    pub(crate) fn take_next(&mut self) -> Option<NonNull<I2cTransaction>> {
        self.next.take()
    }

    /// Allocate a segment through the issuer and append it to the chain.
    ///
    /// The append runs under a critical section so composition can happen
    /// while the controller interrupt is live.
    pub fn new_segment(&mut self) -> Result<&mut I2cSegment, I2cError> {
        let s = self.issuer.alloc_segment(self.irqsafe)?;
        critical_section::with(|_| match self.current {
            None => {
                self.root = Some(s);
                self.current = Some(s);
            }
            Some(mut cur) => {
                // SAFETY: `cur` is owned by this transaction; the critical
                // section excludes the controller interrupt.
                unsafe { cur.as_mut() }.set_next(Some(s));
                self.current = Some(s);
            }
        });
        // SAFETY: freshly allocated, exclusively ours; borrow tied to self.
        Ok(unsafe { &mut *s.as_ptr() })
    }

    /// Rewind the execution cursor to the first segment.
    pub(crate) fn reset_current(&mut self) {
        self.current = self.root;
    }

    /// Move the cursor to the next segment. Returns whether the new cursor
    /// is valid.
    pub(crate) fn advance_segment(&mut self) -> bool {
        if let Some(cur) = self.current {
            // SAFETY: cursor segments are owned by this transaction.
            self.current = unsafe { cur.as_ref() }.next_ptr();
        }
        self.current.is_some()
    }

    /// Tail-append `t` onto this transaction's queue link.
    ///
    /// # Safety
    ///
    /// The caller must hold the queue's critical section, and `t` must be a
    /// valid transaction not already reachable from this one.
    pub(crate) unsafe fn append(&mut self, t: NonNull<I2cTransaction>) {
        let mut tail: &mut I2cTransaction = self;
        while let Some(mut n) = tail.next {
            // SAFETY: queued transactions are exclusively owned by the queue,
            // and the caller holds its critical section.
            tail = unsafe { n.as_mut() };
        }
        tail.next = Some(t);
    }

    /// Forward `event` to the current segment's interrupt hook.
    pub(crate) fn call_irq_cb(&mut self, event: EventSet) {
        if let Some(mut cur) = self.current {
            // SAFETY: cursor segments are owned by this transaction.
            unsafe { cur.as_mut() }.call_irq_cb(event);
        }
    }

    /// Invoke, in registration order, every handler whose mask intersects
    /// `event`. Task level only.
    pub fn process_event(&mut self, event: EventSet) {
        let handlers = self.handlers;
        for h in handlers.iter() {
            if let Some(cb) = h.cb {
                if h.mask.intersects(event) {
                    cb.call(self, event);
                }
            }
        }
    }

    /// Install `cb` into the next free handler slot. Returns false when all
    /// slots are occupied.
    pub fn add_event(&mut self, mask: EventSet, cb: EventCallback) -> bool {
        for slot in self.handlers.iter_mut() {
            if slot.cb.is_none() {
                *slot = EventHandler { mask, cb: Some(cb) };
                return true;
            }
        }
        false
    }

    #[cfg(test)]
    pub(crate) fn handler_count(&self) -> usize {
        self.handlers.iter().filter(|h| h.cb.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::Pin;
    use crate::pinmap::BusMap;
    use crate::segment::Direction;
    use alloc::boxed::Box;
    use std::sync::Mutex;
    use std::vec::Vec;

    /// Unbound handle: allocation routes through it without a controller.
    fn facade() -> &'static I2c {
        Box::leak(Box::new(I2c::new(&BusMap::new(&[], &[]), Pin(0), Pin(1))))
    }

    fn free_chain(i2c: &I2c, t: &I2cTransaction) {
        let mut seg = t.root_ptr();
        while let Some(s) = seg {
            // SAFETY: the chain is owned by `t` and freed here exactly once.
            seg = unsafe { s.as_ref() }.next_ptr();
            i2c.free_segment(s, false);
        }
    }

    fn nop(_cx: usize, _t: &mut I2cTransaction, _e: EventSet) {}

    fn never(_cx: usize, _t: &mut I2cTransaction, _e: EventSet) {
        panic!("masked-out handler ran");
    }

    #[test]
    fn handler_table_holds_four() {
        let mut t = I2cTransaction::new(0x50, 100_000, false, facade());
        for _ in 0..MAX_HANDLERS {
            assert!(t.add_event(EventSet::COMPLETE, EventCallback::new(nop, 0)));
        }
        assert!(!t.add_event(EventSet::ALL, EventCallback::new(nop, 0)));
        assert_eq!(t.handler_count(), MAX_HANDLERS);
    }

    #[test]
    fn segments_chain_and_cursor_walks() {
        let i2c = facade();
        let mut t = I2cTransaction::new(0x50, 400_000, false, i2c);
        t.new_segment().unwrap().set_dir(Direction::Transmit);
        t.new_segment().unwrap().set_dir(Direction::Receive);
        t.new_segment().unwrap().set_dir(Direction::Receive);

        // Composition leaves the cursor at the tail.
        assert!(t.current_ptr().is_some());
        assert!(!t.advance_segment());

        t.reset_current();
        assert_eq!(t.current_ptr(), t.root_ptr());
        assert!(t.advance_segment());
        assert!(t.advance_segment());
        assert!(!t.advance_segment());
        assert!(t.current_ptr().is_none());

        let root = t.root_segment().unwrap();
        assert_eq!(root.dir(), Direction::Transmit);
        assert_eq!(root.next_segment().unwrap().dir(), Direction::Receive);

        free_chain(i2c, &t);
    }

    #[test]
    fn zero_segment_cursor_is_done_immediately() {
        let mut t = I2cTransaction::new(0x1, 100_000, false, facade());
        t.reset_current();
        assert!(!t.advance_segment());
    }

    static LOG: Mutex<Vec<u32>> = Mutex::new(Vec::new());

    fn tagged(cx: usize, _t: &mut I2cTransaction, e: EventSet) {
        assert!(e.contains(EventSet::EARLY_NACK));
        LOG.lock().unwrap().push(cx as u32);
    }

    #[test]
    fn handlers_fire_by_mask_in_registration_order() {
        let mut t = I2cTransaction::new(0x50, 100_000, false, facade());
        t.add_event(EventSet::COMPLETE, EventCallback::new(never, 1));
        t.add_event(
            EventSet::EARLY_NACK | EventSet::COMPLETE,
            EventCallback::new(tagged, 2),
        );
        t.add_event(EventSet::EARLY_NACK, EventCallback::new(tagged, 3));

        t.process_event(EventSet::EARLY_NACK);
        assert_eq!(LOG.lock().unwrap().as_slice(), &[2, 3]);
    }
}
