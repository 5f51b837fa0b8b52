use core::ops::{BitAnd, BitOr, BitOrAssign};

/// Bitset over the bus events observable at the callback boundary.
///
/// Error bits dominate completion: a bitset carrying both terminates the
/// transaction as a failure.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventSet(u32);

impl EventSet {
    pub const NONE: EventSet = EventSet(0);
    /// The final segment's STOP (or last byte of a no-STOP tail) acknowledged.
    pub const COMPLETE: EventSet = EventSet(1 << 0);
    /// Device NAK during address or data before completion.
    pub const EARLY_NACK: EventSet = EventSet(1 << 1);
    /// No device acknowledged the address.
    pub const NO_SLAVE: EventSet = EventSet(1 << 2);
    /// Generic bus error (arbitration lost, bus error).
    pub const ERROR: EventSet = EventSet(1 << 3);
    /// Every event bit.
    pub const ALL: EventSet = EventSet(0b1111);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> EventSet {
        EventSet(bits & Self::ALL.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(self, other: EventSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when `self` and `other` share at least one bit.
    pub const fn intersects(self, other: EventSet) -> bool {
        self.0 & other.0 != 0
    }

    /// True when any non-completion bit is set.
    pub const fn is_error(self) -> bool {
        self.0 & (Self::EARLY_NACK.0 | Self::NO_SLAVE.0 | Self::ERROR.0) != 0
    }
}

impl BitOr for EventSet {
    type Output = EventSet;

    fn bitor(self, rhs: EventSet) -> EventSet {
        EventSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventSet {
    fn bitor_assign(&mut self, rhs: EventSet) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventSet {
    type Output = EventSet;

    fn bitand(self, rhs: EventSet) -> EventSet {
        EventSet(self.0 & rhs.0)
    }
}

impl core::fmt::Debug for EventSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut set = f.debug_set();
        if self.contains(Self::COMPLETE) {
            set.entry(&"complete");
        }
        if self.contains(Self::EARLY_NACK) {
            set.entry(&"early_nack");
        }
        if self.contains(Self::NO_SLAVE) {
            set.entry(&"no_slave");
        }
        if self.contains(Self::ERROR) {
            set.entry(&"error");
        }
        set.finish()
    }
}
