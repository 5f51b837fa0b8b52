/// Errors reported when a transaction is posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cError {
    /// The pin pair does not resolve to a bus controller.
    InvalidMaster,
    /// The controller is already bound to a different pin pair.
    PinMismatch,
    /// The controller hardware reports an active transfer.
    Busy,
    /// No transaction could be allocated.
    NullTransaction,
    /// No segment could be allocated.
    NullSegment,
    /// An irqsafe transfer was requested but the client has no pools.
    MissingPoolAllocator,
    /// The target address is outside the 10-bit range.
    InvalidAddress,
    /// A referenced buffer exceeds the representable length.
    BufferSize,
}
