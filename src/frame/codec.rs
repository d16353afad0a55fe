//! Encoding and decoding of application frames.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::{debug, trace, warn};

use super::types::*;
use crate::crc::{Crc32, CrcAccumulator};

// =============================================================================
// Public Interface
// =============================================================================

/// Frame encoder and reassembling decoder for one peer channel.
///
/// Peer data arrives in MUX sized chunks that have no relation to frame
/// boundaries, so received bytes accumulate until a whole frame is there.
pub struct FrameCodec {
    rx: BytesMut,
    crc: Box<dyn CrcAccumulator + Send>,
}
impl FrameCodec {
    pub fn new() -> Self {
        Self::with_crc(Box::new(Crc32::new()))
    }

    /// Uses `crc` instead of the software CRC32, e.g. a hardware unit.
    pub fn with_crc(crc: Box<dyn CrcAccumulator + Send>) -> Self {
        FrameCodec {
            rx: BytesMut::with_capacity(MAX_FRAME_LEN),
            crc,
        }
    }

    /// Builds a complete frame: header, payload and CRC trailer.
    pub fn encode(&mut self, command: Command, message_id: u32, payload: &[u8]) -> Bytes {
        let header = FrameHeader {
            command: command.to_byte(),
            message_id,
            length: payload.len() as u16,
        };
        let mut frame = BytesMut::with_capacity(header.frame_len());
        header.write(&mut frame);

        self.crc.reset();
        self.crc.accumulate(&frame);
        let crc = self.crc.accumulate(payload);

        frame.put_slice(payload);
        frame.put_u32_le(crc);
        frame.freeze()
    }

    /// A value update for the application.
    pub fn encode_data(&mut self, value_id: ValueId, value: i32) -> Bytes {
        self.encode(Command::Data, value_id.to_message_id(), &value.to_le_bytes())
    }

    /// An error report answering the request `message_id`.
    pub fn encode_error(&mut self, message_id: u32, payload: &[u8]) -> Bytes {
        self.encode(Command::Error, message_id, payload)
    }

    /// The configuration records answering the request `message_id`.
    pub fn encode_configuration(&mut self, message_id: u32, entries: &[ConfigEntry]) -> Bytes {
        let mut payload = BytesMut::with_capacity(entries.len() * ConfigEntry::WIRE_LEN);
        for entry in entries {
            entry.write(&mut payload);
        }
        self.encode(Command::Configuration, message_id, &payload)
    }

    pub fn encode_ack(&mut self, message_id: u32) -> Bytes {
        self.encode(Command::Ack, message_id, &[])
    }

    pub fn encode_nack(&mut self, message_id: u32) -> Bytes {
        self.encode(Command::Nack, message_id, &[])
    }

    /// Appends received bytes to the reassembly buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.rx.extend_from_slice(chunk);
    }

    /// Number of received bytes not consumed by a frame yet.
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    /// Drops a partially received frame, e.g. when the peer sending it left.
    pub fn reset(&mut self) {
        if !self.rx.is_empty() {
            debug!("dropping {} buffered frame bytes", self.rx.len());
        }
        self.rx.clear();
    }

    /// Takes the next complete frame out of the reassembly buffer, if any.
    pub fn next_frame(&mut self) -> Option<Decoded> {
        let header = FrameHeader::read(&self.rx)?;
        let frame_len = header.frame_len();
        if frame_len > MAX_FRAME_LEN {
            warn!(
                "frame {:#x} announces {} payload bytes, dropping {} buffered bytes",
                header.message_id,
                header.length,
                self.rx.len()
            );
            self.rx.clear();
            return Some(Decoded::Oversized {
                message_id: header.message_id,
            });
        }
        if self.rx.len() < frame_len {
            return None;
        }

        let mut raw = self.rx.split_to(frame_len).freeze();
        self.crc.reset();
        if self.crc.accumulate(&raw) != 0 {
            debug!("frame {:#x} failed the CRC check", header.message_id);
            return Some(Decoded::Corrupt {
                message_id: header.message_id,
            });
        }

        raw.advance(HEADER_LEN);
        raw.truncate(header.length as usize);
        Some(Decoded::Frame(Frame {
            command: header.command,
            message_id: header.message_id,
            payload: raw,
        }))
    }

    /// Feeds `chunk`, hands every complete request to `handler` and returns
    /// the frames to send back, in order.
    pub fn receive<H>(&mut self, chunk: &[u8], handler: &mut H) -> Vec<Bytes>
    where
        H: RequestHandler + ?Sized,
    {
        self.push(chunk);

        let mut replies = Vec::new();
        while let Some(decoded) = self.next_frame() {
            match decoded {
                Decoded::Frame(frame) => {
                    if let Some(reply) = self.process(&frame, handler) {
                        replies.push(reply);
                    }
                }
                Decoded::Corrupt { message_id } | Decoded::Oversized { message_id } => {
                    replies.push(self.encode_nack(message_id));
                }
            }
        }
        replies
    }
}
impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Private stuff
// =============================================================================

impl FrameCodec {
    fn process<H>(&mut self, frame: &Frame, handler: &mut H) -> Option<Bytes>
    where
        H: RequestHandler + ?Sized,
    {
        let request = match Command::from_byte(frame.command) {
            Some(Command::SubscribeData) => {
                ValueId::read(&frame.payload).map(|value_id| Request::Subscribe {
                    message_id: frame.message_id,
                    value_id,
                })
            }
            Some(Command::UnsubscribeData) => {
                ValueId::read(&frame.payload).map(|value_id| Request::Unsubscribe {
                    message_id: frame.message_id,
                    value_id,
                })
            }
            Some(Command::Command) => read_i32(&frame.payload).map(|value| Request::Command {
                value_id: ValueId::from_message_id(frame.message_id),
                value,
            }),
            Some(Command::Configuration) => Some(Request::ConfigurationRequested {
                message_id: frame.message_id,
            }),
            Some(Command::IsAlive) => Some(Request::IsAlive {
                message_id: frame.message_id,
            }),
            _ => {
                trace!("ignoring frame with command {:#04x}", frame.command);
                return None;
            }
        };

        let accepted = match request {
            Some(request) => handler.on_request(request),
            None => {
                debug!("frame {:#x} payload too short", frame.message_id);
                false
            }
        };
        Some(if accepted {
            self.encode_ack(frame.message_id)
        } else {
            self.encode_nack(frame.message_id)
        })
    }
}

fn read_i32(mut payload: &[u8]) -> Option<i32> {
    if payload.len() < 4 {
        return None;
    }
    Some(payload.get_i32_le())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Records requests and answers them with a fixed verdict.
    struct Recorder {
        accept: bool,
        requests: Vec<Request>,
    }
    impl RequestHandler for Recorder {
        fn on_request(&mut self, request: Request) -> bool {
            self.requests.push(request);
            self.accept
        }
    }

    fn recorder(accept: bool) -> Recorder {
        Recorder {
            accept,
            requests: vec![],
        }
    }

    #[test]
    fn data_frame_layout() {
        let mut codec = FrameCodec::new();
        let value_id = ValueId {
            motor_group: 2,
            id: 7,
        };
        let frame = codec.encode_data(value_id, -2);

        assert_eq!(frame.len(), HEADER_LEN + 4 + CRC_LEN);
        assert_eq!(
            &frame[..11],
            &[0x04, 0x02, 0x00, 0x07, 0x00, 0x04, 0x00, 0xfe, 0xff, 0xff, 0xff]
        );
        assert_eq!(&frame[11..], &Crc32::checksum(&frame[..11]).to_le_bytes());
    }

    #[test]
    fn encoded_frame_decodes_to_the_same_content() {
        let mut codec = FrameCodec::new();
        let value_id = ValueId {
            motor_group: 0x0a0b,
            id: 0x0c0d,
        };
        let frame = codec.encode_data(value_id, 215);

        let mut crc = Crc32::new();
        assert_eq!(crc.accumulate(&frame), 0);

        codec.push(&frame);
        assert_eq!(
            codec.next_frame(),
            Some(Decoded::Frame(Frame {
                command: 0x04,
                message_id: value_id.to_message_id(),
                payload: Bytes::copy_from_slice(&215i32.to_le_bytes()),
            }))
        );
        assert_eq!(codec.buffered(), 0);
        assert_eq!(codec.next_frame(), None);
    }

    #[test]
    fn flipped_bit_is_answered_with_nack() {
        let mut codec = FrameCodec::new();
        let frame = codec.encode(Command::IsAlive, 0xdead_beef, &[1, 2, 3]);
        let expected_nack = codec.encode_nack(0xdead_beef);

        for bit in 0..8 {
            let mut corrupted = frame.to_vec();
            corrupted[HEADER_LEN + 1] ^= 1 << bit;

            let mut handler = recorder(true);
            let replies = codec.receive(&corrupted, &mut handler);
            assert_eq!(replies, vec![expected_nack.clone()]);
            assert!(handler.requests.is_empty());
        }
    }

    #[test]
    fn frame_split_across_chunks_is_reassembled() {
        let mut sender = FrameCodec::new();
        let frame = sender.encode(Command::SubscribeData, 42, &[0x01, 0x00, 0x02, 0x00]);

        let mut codec = FrameCodec::new();
        let mut handler = recorder(true);
        assert!(codec.receive(&frame[..5], &mut handler).is_empty());
        assert!(codec.receive(&frame[5..12], &mut handler).is_empty());
        assert_eq!(codec.receive(&frame[12..], &mut handler), vec![sender.encode_ack(42)]);
        assert_eq!(
            handler.requests,
            vec![Request::Subscribe {
                message_id: 42,
                value_id: ValueId {
                    motor_group: 1,
                    id: 2
                }
            }]
        );
    }

    #[test]
    fn back_to_back_frames_are_all_processed() {
        let mut sender = FrameCodec::new();
        let mut input = sender.encode(Command::IsAlive, 1, &[]).to_vec();
        input.extend_from_slice(&sender.encode(Command::Configuration, 2, &[]));
        input.extend_from_slice(&sender.encode(Command::UnsubscribeData, 3, &[5, 0, 6, 0]));

        let mut codec = FrameCodec::new();
        let mut handler = recorder(false);
        let replies = codec.receive(&input, &mut handler);
        assert_eq!(
            replies,
            vec![sender.encode_nack(1), sender.encode_nack(2), sender.encode_nack(3)]
        );
        assert_eq!(
            handler.requests,
            vec![
                Request::IsAlive { message_id: 1 },
                Request::ConfigurationRequested { message_id: 2 },
                Request::Unsubscribe {
                    message_id: 3,
                    value_id: ValueId {
                        motor_group: 5,
                        id: 6
                    }
                },
            ]
        );
    }

    #[test]
    fn command_reads_value_id_from_message_id() {
        let mut sender = FrameCodec::new();
        let frame = sender.encode(Command::Command, 0x0009_0003, &(-7i32).to_le_bytes());

        let mut codec = FrameCodec::new();
        let mut handler = recorder(true);
        assert_eq!(codec.receive(&frame, &mut handler), vec![sender.encode_ack(0x0009_0003)]);
        assert_eq!(
            handler.requests,
            vec![Request::Command {
                value_id: ValueId {
                    motor_group: 3,
                    id: 9
                },
                value: -7
            }]
        );
    }

    #[test]
    fn short_payload_is_rejected_without_asking() {
        let mut sender = FrameCodec::new();
        let frame = sender.encode(Command::Command, 5, &[1, 2]);

        let mut codec = FrameCodec::new();
        let mut handler = recorder(true);
        assert_eq!(codec.receive(&frame, &mut handler), vec![sender.encode_nack(5)]);
        assert!(handler.requests.is_empty());
    }

    #[test]
    fn unknown_and_outbound_commands_are_ignored() {
        let mut sender = FrameCodec::new();
        let mut input = sender.encode(Command::Ack, 1, &[]).to_vec();
        input.extend_from_slice(&sender.encode_data(ValueId::default(), 3));

        let mut codec = FrameCodec::new();
        let mut handler = recorder(true);
        assert!(codec.receive(&input, &mut handler).is_empty());
        assert!(handler.requests.is_empty());
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn oversized_frame_flushes_the_buffer() {
        let mut codec = FrameCodec::new();
        let mut header = BytesMut::new();
        FrameHeader {
            command: 0x01,
            message_id: 77,
            length: 1000,
        }
        .write(&mut header);
        header.put_slice(&[0; 20]);

        let mut handler = recorder(true);
        let replies = codec.receive(&header, &mut handler);
        assert_eq!(replies, vec![codec.encode_nack(77)]);
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn reset_drops_a_partial_frame() {
        let mut sender = FrameCodec::new();
        let stale = sender.encode(Command::IsAlive, 1, &[]);
        let fresh = sender.encode(Command::IsAlive, 2, &[]);

        let mut codec = FrameCodec::new();
        let mut handler = recorder(true);
        assert!(codec.receive(&stale[..5], &mut handler).is_empty());
        assert_eq!(codec.buffered(), 5);

        codec.reset();
        assert_eq!(codec.buffered(), 0);
        assert_eq!(codec.receive(&fresh, &mut handler), vec![sender.encode_ack(2)]);
        assert_eq!(handler.requests, vec![Request::IsAlive { message_id: 2 }]);
    }

    #[test]
    fn configuration_answer_carries_all_records() {
        let mut codec = FrameCodec::new();
        let entries = [
            ConfigEntry {
                room_id: 1,
                motor_id: 2,
                sensor_id: 3,
            },
            ConfigEntry {
                room_id: 0x0100,
                motor_id: 0,
                sensor_id: 0xffff,
            },
        ];
        let frame = codec.encode_configuration(9, &entries);
        assert_eq!(frame[0], 0x08);
        assert_eq!(&frame[5..7], &[12, 0]);
        assert_eq!(&frame[7..19], &[1, 0, 2, 0, 3, 0, 0, 1, 0, 0, 0xff, 0xff]);

        let error = codec.encode_error(9, b"E1");
        assert_eq!(&error[..9], &[0x20, 9, 0, 0, 0, 2, 0, b'E', b'1']);
    }
}
