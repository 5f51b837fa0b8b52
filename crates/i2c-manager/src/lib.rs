#![no_std]
//! Asynchronous I2C transaction engine.
//!
//! # Problem
//!
//! A microcontroller has a handful of I2C master controllers and many
//! drivers that want to talk through them, from task context and from
//! interrupt handlers. Each transfer is a sequence of directional segments
//! that must run under one bus acquisition, driven forward by controller
//! interrupts, with completion delivered back at task level.
//!
//! # Solution
//!
//! One [`ResourceManager`] per controller serializes everything: clients
//! describe a transfer declaratively with the [`Transfer`] builder and post
//! it; the manager queues it, drives the controller through its [`I2cHal`],
//! advances segment by segment on interrupts, and hands the finished
//! transaction to an [`EventScheduler`] so handlers run cooperatively.
//!
//! ```rust,ignore
//! static DISPATCH: DispatchQueue = DispatchQueue::new();
//! static I2C0: HwMaster<Controller> =
//!     HwMaster::new(Controller::new(0), &DISPATCH, DmaUsage::Never);
//! static MAP: BusMap = BusMap::new(
//!     &[BusMapEntry { sda: Pin(4), scl: Pin(6), master: 0 }],
//!     &[&I2C0],
//! );
//!
//! // The handle must outlive its transactions; park it in a static
//! // (e.g. a StaticCell) during board bring-up.
//! let i2c: &'static I2c = I2C_CELL.init(I2c::new(&MAP, Pin(4), Pin(6)));
//! i2c.transfer_to(0x50)
//!     .tx(&CMD)
//!     .rx_inline(4)
//!     .on(EventSet::ALL, EventCallback::new(on_done, 0));
//! ```
//!
//! # Contexts and ownership
//!
//! - Posting runs in task context, or in interrupt context for transfers
//!   built with [`I2c::transfer_to_irqsafe`] (pool-allocated, never heap).
//! - The controller interrupt is the consumer: it advances the current
//!   transaction and issues follow-up segments in place.
//! - A queued transaction is owned by its controller's queue; when it
//!   finishes, ownership moves into a [`Dispatch`] and, after the handlers
//!   ran, back to the issuing [`I2c`] handle for freeing. Exactly one
//!   dispatch per posted transaction.
//! - All queue mutations happen under a critical section that masks the
//!   controller interrupt; nothing suspends.

extern crate alloc;

#[cfg(test)]
extern crate std;

mod buffer;
mod callback;
mod error;
mod events;
mod hal;
mod i2c;
mod manager;
mod pinmap;
mod queue;
mod scheduler;
mod segment;
mod transaction;

pub use buffer::{SegmentBuffer, INLINE_CAP, MAX_REF_LEN};
pub use callback::{EventCallback, SegmentHook};
pub use error::I2cError;
pub use events::EventSet;
pub use hal::{DmaUsage, I2cHal, Pin};
pub use i2c::{I2c, Transfer, DEFAULT_FREQUENCY};
pub use manager::{HwMaster, ResourceManager};
pub use pinmap::{BusMap, BusMapEntry};
pub use scheduler::{Dispatch, DispatchQueue, EventScheduler};
pub use segment::{Direction, I2cSegment};
pub use transaction::{I2cTransaction, MAX_HANDLERS};
