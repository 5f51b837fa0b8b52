use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

use crate::buffer::SegmentBuffer;
use crate::callback::SegmentHook;
use crate::events::EventSet;

/// Direction of one transfer segment.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Transmit,
    Receive,
}

/// One directional chunk of a transaction: a [`SegmentBuffer`] plus
/// direction, a forward link to the next segment, and an optional
/// interrupt-context hook.
///
/// Segments are allocated and owned by their transaction; the forward link
/// is structural only and never outlives the owner.
pub struct I2cSegment {
    buf: SegmentBuffer,
    dir: Direction,
    next: Option<NonNull<I2cSegment>>,
    irq_cb: Option<SegmentHook>,
}

// SAFETY: a segment is exclusively owned by its transaction; the engine's
// critical sections govern which context touches it. Required so pooled
// segments can be claimed from one context and completed from another.
unsafe impl Send for I2cSegment {}

impl I2cSegment {
    pub(crate) const fn new() -> Self {
        Self {
            buf: SegmentBuffer::new(),
            dir: Direction::Transmit,
            next: None,
            irq_cb: None,
        }
    }

    pub fn dir(&self) -> Direction {
        self.dir
    }

    pub fn set_dir(&mut self, dir: Direction) {
        self.dir = dir;
    }

    /// Install the hook run in interrupt context when this segment
    /// completes. Typically left unset.
    pub fn set_irq_cb(&mut self, cb: SegmentHook) {
        self.irq_cb = Some(cb);
    }

    pub(crate) fn call_irq_cb(&mut self, event: EventSet) {
        if let Some(cb) = self.irq_cb {
            cb.call(self, event);
        }
    }

    pub(crate) fn next_ptr(&self) -> Option<NonNull<I2cSegment>> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<NonNull<I2cSegment>>) {
        self.next = next;
    }

    /// The following segment, if any.
    pub fn next_segment(&self) -> Option<&I2cSegment> {
        // SAFETY: the chain is owned by this segment's transaction and
        // outlives `self`; the returned borrow is tied to `self`.
        self.next.map(|s| unsafe { &*s.as_ptr() })
    }

    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

impl Deref for I2cSegment {
    type Target = SegmentBuffer;

    fn deref(&self) -> &SegmentBuffer {
        &self.buf
    }
}

impl DerefMut for I2cSegment {
    fn deref_mut(&mut self) -> &mut SegmentBuffer {
        &mut self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static HOOK_HITS: AtomicU32 = AtomicU32::new(0);

    fn hook(_cx: usize, s: &mut I2cSegment, event: EventSet) {
        assert_eq!(s.dir(), Direction::Receive);
        assert!(event.contains(EventSet::COMPLETE));
        HOOK_HITS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn hook_fires_with_segment_and_event() {
        let mut s = I2cSegment::new();
        s.set_dir(Direction::Receive);

        s.call_irq_cb(EventSet::COMPLETE);
        assert_eq!(HOOK_HITS.load(Ordering::SeqCst), 0);

        s.set_irq_cb(SegmentHook::new(hook, 0));
        s.call_irq_cb(EventSet::COMPLETE);
        assert_eq!(HOOK_HITS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn buffer_is_reachable_through_deref() {
        let mut s = I2cSegment::new();
        let mut bytes = [9u8, 8, 7];
        s.set(bytes.as_mut_ptr(), bytes.len());

        assert_eq!(s.get_len(), 3);
        assert!(!s.is_ephemeral());
        assert!(s.is_last());
    }
}
