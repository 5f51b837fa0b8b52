use crate::events::EventSet;
use crate::segment::I2cSegment;
use crate::transaction::I2cTransaction;

/// Erased two-word callable invoked at task level when a transaction ends.
///
/// A function pointer plus one context word, so handler tables need no
/// allocation. The context is opaque to the engine; clients typically pass
/// a pointer to long-lived state, or zero for free functions.
#[derive(Clone, Copy)]
pub struct EventCallback {
    func: fn(usize, &mut I2cTransaction, EventSet),
    cx: usize,
}

impl EventCallback {
    pub const fn new(func: fn(usize, &mut I2cTransaction, EventSet), cx: usize) -> Self {
        Self { func, cx }
    }

    pub fn call(&self, t: &mut I2cTransaction, event: EventSet) {
        (self.func)(self.cx, t, event)
    }
}

/// Erased callable invoked in interrupt context when a segment completes,
/// before any task-level dispatch.
///
/// This is the engine's only hook for in-flight adaptation, e.g. a length
/// byte received in one segment sizing the next. No event filtering is
/// applied; the hook sees every event bit the segment raised.
#[derive(Clone, Copy)]
pub struct SegmentHook {
    func: fn(usize, &mut I2cSegment, EventSet),
    cx: usize,
}

impl SegmentHook {
    pub const fn new(func: fn(usize, &mut I2cSegment, EventSet), cx: usize) -> Self {
        Self { func, cx }
    }

    pub fn call(&self, s: &mut I2cSegment, event: EventSet) {
        (self.func)(self.cx, s, event)
    }
}
