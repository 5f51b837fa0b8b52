use crate::error::I2cError;
use crate::events::EventSet;

/// A pin identifier, opaque to the engine.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pin(pub u16);

/// DMA policy hint forwarded to the hardware layer.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaUsage {
    #[default]
    Never,
    Opportunistic,
    Always,
}

/// The asynchronous controller primitives the engine drives.
///
/// One `transfer_async` is issued per segment; the hardware must raise at
/// least one event (through the controller interrupt and
/// [`irq_handler`](Self::irq_handler)) before the engine issues the next.
/// Interrupt binding itself is the port's responsibility: the board routes
/// the controller interrupt to its master's `irq` entry.
pub trait I2cHal: Send {
    /// Bind the controller to a pin pair and apply the default bus
    /// frequency.
    fn init(&mut self, sda: Pin, scl: Pin) -> Result<(), I2cError>;

    /// Program the bus frequency for subsequent transfers.
    fn frequency(&mut self, hz: u32);

    /// Start one asynchronous transfer. Exactly one direction is active:
    /// a transmit passes `rx_len == 0`, a receive passes `tx_len == 0`.
    /// `stop` requests a STOP condition after the final byte.
    #[allow(clippy::too_many_arguments)]
    fn transfer_async(
        &mut self,
        tx: *const u8,
        tx_len: usize,
        rx: *mut u8,
        rx_len: usize,
        address: u16,
        stop: bool,
        event_mask: EventSet,
        dma: DmaUsage,
    );

    /// Read and clear the pending event bits. Called from the controller
    /// interrupt.
    fn irq_handler(&mut self) -> EventSet;

    /// True while a transfer is in flight.
    fn is_active(&self) -> bool;
}
