//! Byte transport between the host and the radio module.
//!
//! The link core only ever moves bytes through the two non-blocking,
//! best-effort primitives of [`Transport`]. Two implementations are provided:
//!
//!  * [`SerialTransport`] for a real module on a serial port, fed by a reader
//!    thread;
//!  * [`MemoryTransport`], an in-memory loopback used to script the module in
//!    simulations and tests.
//!
//! The hardware reset pin of the module is abstracted by [`ResetLine`].

mod memory;
mod serial;

pub use memory::{MemoryResetLine, MemoryTransport};
pub use serial::{DtrResetLine, SerialTransport};

/// Non-blocking byte pipe, addressed by an interface channel number.
pub trait Transport {
    /// Queues as many bytes of `data` as possible for transmission. Returns
    /// the number of bytes accepted.
    fn put_bytes(&mut self, channel: u8, data: &[u8]) -> usize;
    /// Moves already received bytes into `buffer`. Returns the number of bytes
    /// read, zero when nothing is pending.
    fn get_bytes(&mut self, channel: u8, buffer: &mut [u8]) -> usize;
}

/// The reset input of the radio module.
pub trait ResetLine {
    /// Holds the module in reset.
    fn assert_reset(&mut self);
    /// Lets the module run.
    fn release_reset(&mut self);
}

/// For modules without a reset line under host control.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResetLine;
impl ResetLine for NoResetLine {
    fn assert_reset(&mut self) {}
    fn release_reset(&mut self) {}
}
