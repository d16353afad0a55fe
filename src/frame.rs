//! CRC protected application frames exchanged with a connected peer.
//!
//! Peers subscribe to values, send commands and check that the gateway is
//! alive; the gateway answers every request with an `Ack` or a `Nack` and
//! pushes value updates, configuration records and error reports. See
//! [`FrameCodec`] for the encoding and reassembly, and [`types`] for the wire
//! layout.

mod codec;
pub mod types;

pub use codec::FrameCodec;
pub use types::{
    Command, ConfigEntry, Decoded, Frame, FrameHeader, Request, RequestHandler, ValueId,
};
