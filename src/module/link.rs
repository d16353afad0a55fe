//! Resources and wire-level operations shared by all states of a module
//! session: the transport, the command queue, the receive ring and the
//! send/receive cycle.
//!
//! In MUX mode every byte exchanged with the module is wrapped in a frame:
//!
//! ```text
//!   +------+---------+--------+-------------------+
//!   | 0xCC | channel | length | payload (length)  |
//!   +------+---------+--------+-------------------+
//! ```
//!
//! Channel `0xFF` carries AT commands and responses, the other channels carry
//! peer data.

use std::sync::Arc;

use hexplay::HexViewBuilder;
use log::{debug, log_enabled, trace, warn, Level::Debug};

use super::commands::{AtCommand, CommandEntry, CommandQueue, Retry};
use crate::clock::{elapsed, Clock, Tick};
use crate::ring::ByteRing;
use crate::scanner::{self, Scan};
use crate::settings::Settings;
use crate::status::LinkStatus;
use crate::transport::{ResetLine, Transport};

pub(crate) const MUX_START: u8 = 0xCC;
pub(crate) const MUX_AT_CHANNEL: u8 = 0xFF;
pub(crate) const MAX_MUX_PAYLOAD: usize = 255;

const COMMAND_TERMINATOR: u8 = b'\r';
const LINE_DELIMITER: &[u8] = b"\r\n";
const RESPONSE_OK: &[u8] = b"OK";
const RESPONSE_RING: &[u8] = b"RING";
const RESPONSE_CONNECT: &[u8] = b"CONNECT";
const RESPONSE_NO_CARRIER: &[u8] = b"NO CARRIER";

// =============================================================================
// Public Interface
// =============================================================================

/// Where a session stands in its command/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRecvState {
    /// The head of the command queue goes out on the next tick.
    Sending,
    /// A command is in flight and its response is awaited.
    Receiving,
    /// Nothing is in flight; only unsolicited input is expected.
    ReceivingAsync,
}

/// What a session reports upwards after a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A remote device is calling. The payload is the whole AT response.
    Ring { payload: Vec<u8> },
    /// A call was established.
    Connect { payload: Vec<u8> },
    /// A call ended.
    NoCarrier { payload: Vec<u8> },
    /// Data received on a serial port profile channel.
    SppData { channel: u8, payload: Vec<u8> },
    /// Data received on a BLE channel.
    BleData { channel: u8, payload: Vec<u8> },
    /// Coarse progress of the session.
    Status(LinkStatus),
}

// =============================================================================
// Crate-Public Interface
// =============================================================================

pub(crate) struct ModuleLink {
    pub device: u8,
    pub settings: Settings,
    pub transport: Box<dyn Transport>,
    pub reset: Box<dyn ResetLine>,
    pub clock: Arc<dyn Clock>,
    pub queue: CommandQueue,
    pub ring: ByteRing,
    pub send_recv: SendRecvState,
    /// When the command in flight was sent.
    pub watch: Tick,
    pub notifications: Vec<Notification>,
}
impl ModuleLink {
    pub fn new(
        device: u8,
        settings: &Settings,
        transport: Box<dyn Transport>,
        reset: Box<dyn ResetLine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let watch = clock.now();
        ModuleLink {
            device,
            settings: settings.clone(),
            transport,
            reset,
            clock,
            queue: CommandQueue::new(settings.command_queue_size),
            ring: ByteRing::new(settings.receive_buffer_size),
            send_recv: SendRecvState::Sending,
            watch,
            notifications: Vec::new(),
        }
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Whether the command in flight waited more than the send timeout.
    pub fn response_timed_out(&self) -> bool {
        elapsed(self.watch, self.now()) > self.settings.send_timeout
    }

    // Command queue ---------------------------------------------------------

    pub fn enqueue(&mut self, command: AtCommand, data: &[u8], retry: Retry) {
        let entry = CommandEntry::new(command, data, retry, self.settings.retry_limit);
        if !self.queue.push(entry) {
            debug!("[{}] command queue full, dropping {:?}", self.device, command);
            return;
        }
        debug!("[{}] queued {:?} ({} pending)", self.device, command, self.queue.len());

        // Only wake up an idle session, a command in flight keeps its slot.
        if self.send_recv == SendRecvState::ReceivingAsync {
            self.send_recv = SendRecvState::Sending;
        }
    }

    fn acknowledge(&mut self) {
        if let Some(entry) = self.queue.pop_front() {
            debug!("[{}] {:?} acknowledged", self.device, entry.command);
        }
        self.send_recv = SendRecvState::Sending;
    }

    /// Sends the head of the queue as a plain AT command. Returns `false`
    /// when there is nothing left to send.
    pub fn send_next_plain(&mut self) -> bool {
        let line = match self.queue.front() {
            Some(entry) => entry.encode(),
            None => return false,
        };
        self.watch = self.now();
        self.put(&line);
        self.put(&[COMMAND_TERMINATOR]);
        self.send_recv = SendRecvState::Receiving;
        true
    }

    /// Sends the head of the queue in a MUX command frame, dropping entries
    /// that used up their retry budget. Goes idle when the queue runs empty.
    pub fn send_next_mux(&mut self) {
        let retry_limit = self.settings.retry_limit;
        loop {
            let exhausted = match self.queue.front() {
                Some(entry) => entry.try_count >= retry_limit,
                None => {
                    self.send_recv = SendRecvState::ReceivingAsync;
                    return;
                }
            };
            if exhausted {
                if let Some(entry) = self.queue.pop_front() {
                    debug!(
                        "[{}] dropping {:?} after {} tries",
                        self.device, entry.command, entry.try_count
                    );
                }
                continue;
            }

            let line = match self.queue.front_mut() {
                Some(entry) => {
                    entry.try_count += 1;
                    entry.encode()
                }
                None => return,
            };
            self.watch = self.now();
            self.send_mux_command(&line);
            self.send_recv = SendRecvState::Receiving;
            return;
        }
    }

    // Output ----------------------------------------------------------------

    fn put(&mut self, data: &[u8]) {
        let accepted = self.transport.put_bytes(self.settings.interface_channel, data);
        if accepted < data.len() {
            debug!("[{}] transport took {} of {} bytes", self.device, accepted, data.len());
        }
    }

    fn send_mux_command(&mut self, line: &[u8]) {
        // The terminator counts in the frame length.
        let line = &line[..line.len().min(MAX_MUX_PAYLOAD - 1)];
        let header = [MUX_START, MUX_AT_CHANNEL, (line.len() + 1) as u8];
        trace!("[{}] > {:?}", self.device, String::from_utf8_lossy(line));
        self.put(&header);
        self.put(line);
        self.put(&[COMMAND_TERMINATOR]);
    }

    /// Sends `data` on a MUX data channel, split into as many frames as needed.
    /// Empty `data` still goes out as a frame with a zero length.
    pub fn send_mux_data(&mut self, channel: u8, data: &[u8]) {
        if data.is_empty() {
            self.put(&[MUX_START, channel, 0]);
            return;
        }
        for chunk in data.chunks(MAX_MUX_PAYLOAD) {
            self.put(&[MUX_START, channel, chunk.len() as u8]);
            self.put(chunk);
        }
    }

    // Input -----------------------------------------------------------------

    /// Moves whatever the transport has into the receive ring.
    pub fn read_input(&mut self) {
        let channel = self.settings.interface_channel;
        let transport = &mut self.transport;
        let mut total = 0;
        // The free space may be split in two at the end of the buffer.
        for _ in 0..2 {
            let count = self.ring.fill_with(|free| transport.get_bytes(channel, free));
            if count == 0 {
                break;
            }
            total += count;
        }
        if total > 0 {
            trace!("[{}] < {} bytes", self.device, total);
        }
    }

    /// Recognizes one `\r\n ... OK \r\n` response in plain AT mode.
    pub fn parse_plain_response(&mut self) {
        let after_first = match scanner::find_literal(&self.ring, 0, LINE_DELIMITER) {
            Scan::Succeeded(offset) => offset,
            _ => return self.discard_if_stuck(),
        };
        let after_ok = match scanner::find_literal(&self.ring, after_first, RESPONSE_OK) {
            Scan::Succeeded(offset) => offset,
            _ => return self.discard_if_stuck(),
        };
        let end = match scanner::find_literal(&self.ring, after_ok, LINE_DELIMITER) {
            Scan::Succeeded(offset) => offset,
            _ => return self.discard_if_stuck(),
        };

        self.ring.drain(0, end);
        self.acknowledge();
    }

    /// Recognizes and dispatches one MUX frame.
    pub fn parse_mux_frame(&mut self) {
        let after_start = match scanner::find_literal(&self.ring, 0, &[MUX_START]) {
            Scan::Succeeded(offset) => offset,
            _ => return self.discard_if_stuck(),
        };

        let after_channel = match scanner::check_length(&self.ring, after_start, 1) {
            Scan::Succeeded(offset) => offset,
            _ => return self.discard_if_stuck(),
        };
        let after_length = match scanner::check_length(&self.ring, after_channel, 1) {
            Scan::Succeeded(offset) => offset,
            _ => return self.discard_if_stuck(),
        };
        let header = (self.ring.peek(after_start), self.ring.peek(after_channel));
        let (channel, length) = match header {
            (Some(channel), Some(length)) => (channel, length as usize),
            _ => return,
        };
        let end = match scanner::check_length(&self.ring, after_length, length) {
            Scan::Succeeded(offset) => offset,
            _ => return self.discard_if_stuck(),
        };

        let mut payload = vec![0; length];
        self.ring.copy_out(after_length, &mut payload);
        if log_enabled!(Debug) {
            let view = HexViewBuilder::new(&payload)
                .address_offset(0)
                .row_width(16)
                .finish();
            debug!("[{}] mux frame on channel {:#04x}\n{}", self.device, channel, view);
        }

        self.dispatch(channel, payload);

        // Junk in front of the start byte goes with the frame.
        self.ring.drain(0, end);
    }

    /// Flushes the ring once it is full of bytes that cannot make a unit.
    fn discard_if_stuck(&mut self) {
        if self.ring.is_full() {
            warn!(
                "[{}] receive buffer full without a complete unit, discarding {} bytes",
                self.device,
                self.ring.available()
            );
            self.ring.clear();
        }
    }

    fn dispatch(&mut self, channel: u8, payload: Vec<u8>) {
        match channel {
            MUX_AT_CHANNEL => self.handle_at_response(payload),
            channel if channel > 1 => self.notify(Notification::BleData { channel, payload }),
            channel => self.notify(Notification::SppData { channel, payload }),
        }
    }

    fn handle_at_response(&mut self, payload: Vec<u8>) {
        let contains = |literal: &[u8]| {
            matches!(scanner::find_literal(&payload[..], 0, literal), Scan::Succeeded(_))
        };
        let ring = contains(RESPONSE_RING);
        let connect = contains(RESPONSE_CONNECT);
        let no_carrier = contains(RESPONSE_NO_CARRIER);
        let ok = contains(RESPONSE_OK);

        if ring {
            debug!("[{}] RING", self.device);
            self.notify(Notification::Ring { payload });
        } else if connect {
            debug!("[{}] CONNECT", self.device);
            self.notify(Notification::Connect { payload });
        } else if no_carrier {
            debug!("[{}] NO CARRIER", self.device);
            self.notify(Notification::NoCarrier { payload });
        } else if ok {
            self.acknowledge();
        } else {
            trace!("[{}] ignored {:?}", self.device, String::from_utf8_lossy(&payload));
        }
    }
}
