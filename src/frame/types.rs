//! Wire types of the framed application protocol.
//!
//! Every frame is a fixed 7 byte header, the payload and a CRC32 trailer. All
//! multi-byte fields are little endian:
//!
//! ```text
//!   +---------+----------------+--------------+-----------------+-----------+
//!   | command | message id u32 | length u16   | payload(length) | crc32 u32 |
//!   +---------+----------------+--------------+-----------------+-----------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const HEADER_LEN: usize = 7;
pub const CRC_LEN: usize = 4;
/// Largest frame, header and trailer included, accepted from a peer.
pub const MAX_FRAME_LEN: usize = 255;

/// Command byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SubscribeData,
    Command,
    UnsubscribeData,
    Data,
    Configuration,
    IsAlive,
    Error,
    Ack,
    Nack,
}
impl Command {
    pub fn from_byte(byte: u8) -> Option<Command> {
        match byte {
            0x01 => Some(Command::SubscribeData),
            0x02 => Some(Command::Command),
            0x03 => Some(Command::UnsubscribeData),
            0x04 => Some(Command::Data),
            0x08 => Some(Command::Configuration),
            0x10 => Some(Command::IsAlive),
            0x20 => Some(Command::Error),
            0x40 => Some(Command::Ack),
            0x80 => Some(Command::Nack),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Command::SubscribeData => 0x01,
            Command::Command => 0x02,
            Command::UnsubscribeData => 0x03,
            Command::Data => 0x04,
            Command::Configuration => 0x08,
            Command::IsAlive => 0x10,
            Command::Error => 0x20,
            Command::Ack => 0x40,
            Command::Nack => 0x80,
        }
    }
}

/// Identifies a value of the heating system: a motor group and one sensor or
/// actor in it.
///
/// On the wire it is the motor group followed by the id, both u16. Where a
/// frame carries it in the message id field, the motor group is the low half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ValueId {
    pub motor_group: u16,
    pub id: u16,
}
impl ValueId {
    pub fn from_message_id(message_id: u32) -> Self {
        ValueId {
            motor_group: message_id as u16,
            id: (message_id >> 16) as u16,
        }
    }

    pub fn to_message_id(self) -> u32 {
        u32::from(self.motor_group) | (u32::from(self.id) << 16)
    }

    pub(crate) fn read(mut payload: &[u8]) -> Option<Self> {
        if payload.len() < 4 {
            return None;
        }
        Some(ValueId {
            motor_group: payload.get_u16_le(),
            id: payload.get_u16_le(),
        })
    }
}

/// One record of a configuration answer: which room, motor and sensor the
/// gateway is bound to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct ConfigEntry {
    pub room_id: u16,
    pub motor_id: u16,
    pub sensor_id: u16,
}
impl ConfigEntry {
    pub const WIRE_LEN: usize = 6;

    pub(crate) fn write(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.room_id);
        buf.put_u16_le(self.motor_id);
        buf.put_u16_le(self.sensor_id);
    }
}

/// Fixed part at the start of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub command: u8,
    pub message_id: u32,
    pub length: u16,
}
impl FrameHeader {
    /// Reads a header from the first [`HEADER_LEN`] bytes of `buf`.
    pub fn read(mut buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        Some(FrameHeader {
            command: buf.get_u8(),
            message_id: buf.get_u32_le(),
            length: buf.get_u16_le(),
        })
    }

    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(self.command);
        buf.put_u32_le(self.message_id);
        buf.put_u16_le(self.length);
    }

    /// Size of the whole frame this header announces.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.length as usize + CRC_LEN
    }
}

/// A frame that passed the CRC check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub message_id: u32,
    pub payload: Bytes,
}

/// Outcome of pulling one frame out of the receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Frame(Frame),
    /// The CRC did not match.
    Corrupt { message_id: u32 },
    /// The announced length cannot fit in a frame. The receive buffer was
    /// dropped since its frame boundaries are lost.
    Oversized { message_id: u32 },
}

/// A request from a peer, as delivered to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Subscribe { message_id: u32, value_id: ValueId },
    Unsubscribe { message_id: u32, value_id: ValueId },
    Command { value_id: ValueId, value: i32 },
    ConfigurationRequested { message_id: u32 },
    IsAlive { message_id: u32 },
}

/// Receives the requests decoded from peer frames. The answer decides
/// whether the peer gets an `Ack` or a `Nack`.
pub trait RequestHandler {
    fn on_request(&mut self, request: Request) -> bool;
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn command_bytes_are_stable() {
    for byte in 0..=u8::MAX {
        if let Some(command) = Command::from_byte(byte) {
            assert_eq!(command.to_byte(), byte);
        }
    }
    assert_eq!(Command::from_byte(0x05), None);
    assert_eq!(Command::Nack.to_byte(), 0x80);
}

#[test]
fn value_id_packs_motor_group_low() {
    let value_id = ValueId {
        motor_group: 0x0102,
        id: 0x0304,
    };
    assert_eq!(value_id.to_message_id(), 0x0304_0102);
    assert_eq!(ValueId::from_message_id(0x0304_0102), value_id);
    assert_eq!(ValueId::read(&[0x02, 0x01, 0x04, 0x03]), Some(value_id));
    assert_eq!(ValueId::read(&[0x02, 0x01, 0x04]), None);
}

#[test]
fn header_layout_is_little_endian() {
    let header = FrameHeader {
        command: 0x10,
        message_id: 0x1122_3344,
        length: 0x0102,
    };
    let mut buf = BytesMut::new();
    header.write(&mut buf);
    assert_eq!(&buf[..], &[0x10, 0x44, 0x33, 0x22, 0x11, 0x02, 0x01]);
    assert_eq!(FrameHeader::read(&buf), Some(header));
    assert_eq!(header.frame_len(), 7 + 0x0102 + 4);
}
