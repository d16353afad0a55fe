//! Registry of the remote peers connected through the radio modules.
//!
//! The radio module announces calls with unsolicited `RING`, `CONNECT` and
//! `NO CARRIER` responses. The registry turns them into a list of connected
//! peers, each identified by a [`PeerHandle`] that is never reused, and keeps
//! a liveness timer per peer so that silent peers get disconnected.
//!
//! The registry does not talk to the modules itself. Every operation returns
//! the [`PeerEvent`]s the caller has to act upon: commands for a module
//! (accept or close a call) and notifications for the application.
//!
//! The channel of a call is read at a fixed position of the AT response:
//!
//! ```text
//!   \r\nRING 0018DA000001, 0x01          -> "0x01" at [21..25), sent back with ATA
//!   \r\nCONNECT 0018DA000001, 0x01       -> "01"   at [26..28)
//!   \r\nNO CARRIER         01            -> "01"   at [21..23)
//! ```

use std::fmt;
use std::sync::Arc;

use log::{debug, info};

use crate::clock::{elapsed, Clock, Tick};
use crate::scanner::{decode_hex_byte, format_number};
use crate::settings::Settings;
use crate::status::LinkStatus;

const RING_CHANNEL: (usize, usize) = (21, 25);
const CONNECT_CHANNEL: (usize, usize) = (26, 28);
const NO_CARRIER_CHANNEL: (usize, usize) = (21, 23);
const CHANNEL_PREFIX: &str = "0x";

// =============================================================================
// Public Interface
// =============================================================================

/// Identifies a connected peer for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle(pub u32);
impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    Spp,
    Ble,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub handle: PeerHandle,
    /// The radio module the peer is connected through.
    pub device: u8,
    /// The MUX channel of the call on that module.
    pub channel: u8,
    pub interface: Interface,
    /// Last sign of life.
    pub last_seen: Tick,
}

/// What the caller of the registry must do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Accept the incoming call on module `device` (`ATA` with `data`).
    Accept { device: u8, data: Vec<u8> },
    /// Hang up the call on module `device` (`ATH` with `data`).
    Close { device: u8, data: Vec<u8> },
    ClientConnected(PeerHandle),
    ClientDisconnected(PeerHandle),
    Status(LinkStatus),
}

pub struct PeerRegistry {
    peers: Vec<PeerEntry>,
    capacity: usize,
    connection_timeout: Tick,
    next_handle: u32,
    primary: Option<PeerHandle>,
    clock: Arc<dyn Clock>,
}
impl PeerRegistry {
    pub fn new(settings: &Settings, clock: Arc<dyn Clock>) -> Self {
        PeerRegistry {
            peers: Vec::with_capacity(settings.peer_capacity),
            capacity: settings.peer_capacity,
            connection_timeout: settings.connection_timeout,
            next_handle: 0,
            primary: None,
            clock,
        }
    }

    /// An incoming call: accept it if there is room for one more peer.
    pub fn on_ring(&mut self, device: u8, payload: &[u8]) -> Vec<PeerEvent> {
        if self.is_full() {
            debug!("[{}] ringing while {} peers are connected, ignored", device, self.peers.len());
            return vec![];
        }
        match payload.get(RING_CHANNEL.0..RING_CHANNEL.1) {
            Some(channel) => vec![PeerEvent::Accept {
                device,
                data: channel.to_vec(),
            }],
            None => vec![],
        }
    }

    /// A call was established: register a new peer, which becomes primary.
    pub fn on_connect(&mut self, device: u8, payload: &[u8]) -> Vec<PeerEvent> {
        let channel = match channel_field(payload, CONNECT_CHANNEL) {
            Some(channel) => channel,
            None => return vec![],
        };
        if self.is_full() {
            debug!("[{}] no room for a peer on channel {}", device, channel);
            return vec![];
        }

        let mut events = Vec::new();
        if self.peers.is_empty() {
            events.push(PeerEvent::Status(LinkStatus::Operating));
        }

        let handle = PeerHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.peers.push(PeerEntry {
            handle,
            device,
            channel,
            interface: Interface::Spp,
            last_seen: self.clock.now(),
        });
        self.primary = Some(handle);

        info!("[{}] peer {} connected on channel {}", device, handle, channel);
        events.push(PeerEvent::ClientConnected(handle));
        events
    }

    /// A call ended on the module side.
    pub fn on_no_carrier(&mut self, device: u8, payload: &[u8]) -> Vec<PeerEvent> {
        let channel = match channel_field(payload, NO_CARRIER_CHANNEL) {
            Some(channel) => channel,
            None => return vec![],
        };
        let position = self
            .peers
            .iter()
            .position(|peer| peer.device == device && peer.channel == channel);

        let mut events = Vec::new();
        if let Some(position) = position {
            self.evict(position, &mut events);
        }
        events
    }

    /// Disconnects every peer that was silent for longer than the connection
    /// timeout.
    pub fn tick(&mut self) -> Vec<PeerEvent> {
        let now = self.clock.now();
        let timeout = self.connection_timeout;

        let mut events = Vec::new();
        while let Some(position) = self
            .peers
            .iter()
            .position(|peer| elapsed(peer.last_seen, now) > timeout)
        {
            info!("peer {} timed out", self.peers[position].handle);
            let peer = self.evict(position, &mut events);
            events.push(close_command(&peer));
        }
        events
    }

    /// Disconnects a peer on request of the application.
    pub fn disconnect(&mut self, handle: PeerHandle) -> Vec<PeerEvent> {
        let mut events = Vec::new();
        if let Some(position) = self.peers.iter().position(|peer| peer.handle == handle) {
            let peer = self.evict(position, &mut events);
            events.push(close_command(&peer));
        }
        events
    }

    /// Restarts the liveness timer of a peer.
    pub fn touch(&mut self, handle: PeerHandle) {
        let now = self.clock.now();
        if let Some(peer) = self.peers.iter_mut().find(|peer| peer.handle == handle) {
            peer.last_seen = now;
        }
    }

    /// The most recently connected peer, which all received frames are
    /// attributed to.
    pub fn primary(&self) -> Option<PeerHandle> {
        self.primary
    }

    pub fn get(&self, handle: PeerHandle) -> Option<&PeerEntry> {
        self.peers.iter().find(|peer| peer.handle == handle)
    }

    pub fn peers(&self) -> &[PeerEntry] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn is_full(&self) -> bool {
        self.peers.len() >= self.capacity
    }

    fn evict(&mut self, position: usize, events: &mut Vec<PeerEvent>) -> PeerEntry {
        let peer = self.peers.remove(position);
        if self.primary == Some(peer.handle) {
            self.primary = None;
        }

        info!("[{}] peer {} disconnected", peer.device, peer.handle);
        events.push(PeerEvent::ClientDisconnected(peer.handle));
        if self.peers.is_empty() {
            events.push(PeerEvent::Status(LinkStatus::Ready));
        }
        peer
    }
}

// =============================================================================
// Private stuff
// =============================================================================

fn channel_field(payload: &[u8], (start, end): (usize, usize)) -> Option<u8> {
    match payload.get(start..end) {
        Some(&[high, low]) => Some(decode_hex_byte(high, low)),
        _ => None,
    }
}

fn close_command(peer: &PeerEntry) -> PeerEvent {
    let data = format!("{}{}", CHANNEL_PREFIX, format_number(i64::from(peer.channel), 16, 2));
    PeerEvent::Close {
        device: peer.device,
        data: data.into_bytes(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::settings::SettingsBuilder;

    fn ring(channel: u8) -> Vec<u8> {
        format!("\r\nRING 0018DA000001, 0x{:02X}\r\n", channel).into_bytes()
    }

    fn connect(channel: u8) -> Vec<u8> {
        format!("\r\nCONNECT 0018DA000001, 0x{:02X}\r\n", channel).into_bytes()
    }

    fn no_carrier(channel: u8) -> Vec<u8> {
        format!("\r\nNO CARRIER         {:02X}\r\n", channel).into_bytes()
    }

    fn registry(capacity: usize, timeout: Tick) -> (PeerRegistry, Arc<ManualClock>) {
        let settings = SettingsBuilder::new()
            .peer_capacity(capacity)
            .connection_timeout(timeout)
            .finalize();
        let clock = Arc::new(ManualClock::new(1000));
        (PeerRegistry::new(&settings, clock.clone()), clock)
    }

    #[test]
    fn ring_is_answered_with_the_channel_field() {
        let (mut peers, _) = registry(2, 100);
        assert_eq!(
            peers.on_ring(0, &ring(0x1a)),
            vec![PeerEvent::Accept {
                device: 0,
                data: b"0x1A".to_vec()
            }]
        );
        assert!(peers.on_ring(0, b"\r\nRING\r\n").is_empty());
        assert!(peers.is_empty());
    }

    #[test]
    fn connect_registers_primary_peer() {
        let (mut peers, _) = registry(2, 100);
        let events = peers.on_connect(1, &connect(0x0b));
        assert_eq!(
            events,
            vec![
                PeerEvent::Status(LinkStatus::Operating),
                PeerEvent::ClientConnected(PeerHandle(0))
            ]
        );
        let peer = peers.get(PeerHandle(0)).cloned();
        assert_eq!(
            peer,
            Some(PeerEntry {
                handle: PeerHandle(0),
                device: 1,
                channel: 0x0b,
                interface: Interface::Spp,
                last_seen: 1000,
            })
        );
        assert_eq!(peers.primary(), Some(PeerHandle(0)));
    }

    #[test]
    fn duplicate_connects_get_distinct_handles_until_full() {
        let (mut peers, _) = registry(2, 100);
        peers.on_connect(0, &connect(1));
        assert_eq!(
            peers.on_connect(0, &connect(1)),
            vec![PeerEvent::ClientConnected(PeerHandle(1))]
        );
        assert_eq!(peers.len(), 2);
        assert_eq!(peers.primary(), Some(PeerHandle(1)));

        assert!(peers.on_connect(0, &connect(1)).is_empty());
        assert!(peers.on_ring(0, &ring(1)).is_empty());
        assert_eq!(peers.len(), 2);
    }

    #[test]
    fn handles_are_never_reused() {
        let (mut peers, _) = registry(1, 100);
        peers.on_connect(0, &connect(1));
        peers.on_no_carrier(0, &no_carrier(1));
        assert_eq!(
            peers.on_connect(0, &connect(1)),
            vec![
                PeerEvent::Status(LinkStatus::Operating),
                PeerEvent::ClientConnected(PeerHandle(1))
            ]
        );
    }

    #[test]
    fn no_carrier_evicts_matching_peer() {
        let (mut peers, _) = registry(4, 100);
        peers.on_connect(0, &connect(1));
        peers.on_connect(0, &connect(2));

        assert!(peers.on_no_carrier(1, &no_carrier(1)).is_empty());
        assert!(peers.on_no_carrier(0, &no_carrier(3)).is_empty());

        assert_eq!(
            peers.on_no_carrier(0, &no_carrier(2)),
            vec![PeerEvent::ClientDisconnected(PeerHandle(1))]
        );
        assert_eq!(peers.primary(), None);

        assert_eq!(
            peers.on_no_carrier(0, &no_carrier(1)),
            vec![
                PeerEvent::ClientDisconnected(PeerHandle(0)),
                PeerEvent::Status(LinkStatus::Ready)
            ]
        );
        assert!(peers.is_empty());
    }

    #[test]
    fn eviction_happens_strictly_after_timeout() {
        let (mut peers, clock) = registry(2, 500);
        peers.on_connect(0, &connect(0x2c));

        clock.advance(500);
        assert!(peers.tick().is_empty());

        clock.advance(1);
        assert_eq!(
            peers.tick(),
            vec![
                PeerEvent::ClientDisconnected(PeerHandle(0)),
                PeerEvent::Status(LinkStatus::Ready),
                PeerEvent::Close {
                    device: 0,
                    data: b"0x2C".to_vec()
                }
            ]
        );
        assert!(peers.is_empty());
    }

    #[test]
    fn touch_keeps_peer_alive() {
        let (mut peers, clock) = registry(2, 500);
        peers.on_connect(0, &connect(1));

        clock.advance(400);
        peers.touch(PeerHandle(0));
        clock.advance(400);
        assert!(peers.tick().is_empty());
        assert_eq!(peers.get(PeerHandle(0)).map(|p| p.last_seen), Some(1400));
    }

    #[test]
    fn never_timing_out_survives_counter_wrap() {
        let (mut peers, clock) = registry(2, Tick::MAX);
        peers.on_connect(0, &connect(1));
        clock.advance(Tick::MAX);
        assert!(peers.tick().is_empty());
    }

    #[test]
    fn explicit_disconnect_closes_the_call() {
        let (mut peers, _) = registry(2, 100);
        peers.on_connect(3, &connect(5));
        assert_eq!(
            peers.disconnect(PeerHandle(0)),
            vec![
                PeerEvent::ClientDisconnected(PeerHandle(0)),
                PeerEvent::Status(LinkStatus::Ready),
                PeerEvent::Close {
                    device: 3,
                    data: b"0x05".to_vec()
                }
            ]
        );
        assert!(peers.disconnect(PeerHandle(0)).is_empty());
    }
}
