//! Wiring between the radio module sessions, the peer registry, the frame
//! codec and the application.
//!
//! ```text
//!   Transport <-> ModuleSession --notifications--> Gateway --> PeerRegistry
//!                      ^                              |  \
//!                      |                              |   FrameCodec --> ClientHandler
//!                      +------ commands / frames -----+
//! ```
//!
//! The gateway owns everything and is driven by periodic calls to
//! [`Gateway::tick`]. The application is called back through the
//! [`ClientHandler`] trait. It answers requests with a verdict and can queue
//! outbound traffic in the [`Outbox`] it is handed, which is flushed at the
//! end of the tick.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, trace};

use crate::clock::Clock;
use crate::frame::{ConfigEntry, FrameCodec, Request, RequestHandler, ValueId};
use crate::module::{ModuleSession, Notification, SPP_CHANNEL};
use crate::peers::{PeerEvent, PeerHandle, PeerRegistry};
use crate::settings::Settings;
use crate::status::{LogStatus, StatusIndicator};

// =============================================================================
// Public Interface
// =============================================================================

/// The application side of the gateway.
///
/// Requests are attributed to the primary peer, the one connected last. A
/// request arriving while no peer is connected is refused without calling
/// the handler.
pub trait ClientHandler {
    fn on_client_connected(&mut self, _handle: PeerHandle, _outbox: &mut Outbox) {}
    fn on_client_disconnected(&mut self, _handle: PeerHandle, _outbox: &mut Outbox) {}

    fn on_subscribe(
        &mut self,
        handle: PeerHandle,
        message_id: u32,
        value_id: ValueId,
        outbox: &mut Outbox,
    ) -> bool;
    fn on_unsubscribe(
        &mut self,
        handle: PeerHandle,
        message_id: u32,
        value_id: ValueId,
        outbox: &mut Outbox,
    ) -> bool;
    fn on_command(
        &mut self,
        handle: PeerHandle,
        value_id: ValueId,
        value: i32,
        outbox: &mut Outbox,
    ) -> bool;
    fn on_configuration_requested(
        &mut self,
        handle: PeerHandle,
        message_id: u32,
        outbox: &mut Outbox,
    ) -> bool;
    fn on_is_alive(&mut self, handle: PeerHandle, message_id: u32, outbox: &mut Outbox) -> bool;
}

/// Outbound traffic queued by the application while it is being called back.
#[derive(Debug, Default)]
pub struct Outbox {
    items: Vec<Outbound>,
}
impl Outbox {
    pub fn send_data(&mut self, handle: PeerHandle, value_id: ValueId, value: i32) {
        self.items.push(Outbound::Data {
            handle,
            value_id,
            value,
        });
    }

    pub fn send_error(&mut self, handle: PeerHandle, message_id: u32, payload: &[u8]) {
        self.items.push(Outbound::Error {
            handle,
            message_id,
            payload: payload.to_vec(),
        });
    }

    pub fn send_configuration(
        &mut self,
        handle: PeerHandle,
        message_id: u32,
        entries: &[ConfigEntry],
    ) {
        self.items.push(Outbound::Configuration {
            handle,
            message_id,
            entries: entries.to_vec(),
        });
    }

    pub fn disconnect(&mut self, handle: PeerHandle) {
        self.items.push(Outbound::Disconnect(handle));
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub struct Gateway<H: ClientHandler> {
    modules: Vec<ModuleSession>,
    peers: PeerRegistry,
    /// Encodes outbound frames.
    codec: FrameCodec,
    /// One reassembly buffer per serial port profile channel.
    rx_codecs: BTreeMap<u8, FrameCodec>,
    /// The module whose serial port profile channels carry the frames.
    codec_device: u8,
    status: Box<dyn StatusIndicator>,
    handler: H,
    outbox: Outbox,
}
impl<H: ClientHandler> Gateway<H> {
    /// Builds a gateway over `modules`. Frames are exchanged through the first
    /// module of the list.
    pub fn new(
        settings: &Settings,
        clock: Arc<dyn Clock>,
        modules: Vec<ModuleSession>,
        handler: H,
    ) -> Self {
        let codec_device = modules.first().map_or(0, ModuleSession::device);
        Gateway {
            modules,
            peers: PeerRegistry::new(settings, clock),
            codec: FrameCodec::new(),
            rx_codecs: BTreeMap::new(),
            codec_device,
            status: Box::new(LogStatus::default()),
            handler,
            outbox: Outbox::default(),
        }
    }

    /// Reports status changes to `status` instead of the log.
    pub fn with_status(mut self, status: Box<dyn StatusIndicator>) -> Self {
        self.status = status;
        self
    }

    /// One unit of work: every module session ticks, their notifications are
    /// processed, silent peers are evicted and queued traffic goes out.
    pub fn tick(&mut self) {
        for index in 0..self.modules.len() {
            let device = self.modules[index].device();
            for notification in self.modules[index].tick() {
                self.handle_notification(device, notification);
            }
        }

        let events = self.peers.tick();
        self.apply_peer_events(events);
        self.flush_outbox();
    }

    /// Sends a value update to a connected peer.
    pub fn send_data(&mut self, handle: PeerHandle, value_id: ValueId, value: i32) {
        if self.is_connected(handle) {
            let frame = self.codec.encode_data(value_id, value);
            self.send_frame(&frame);
        }
    }

    /// Reports an error about request `message_id` to a connected peer.
    pub fn send_error(&mut self, handle: PeerHandle, message_id: u32, payload: &[u8]) {
        if self.is_connected(handle) {
            let frame = self.codec.encode_error(message_id, payload);
            self.send_frame(&frame);
        }
    }

    /// Answers configuration request `message_id` of a connected peer.
    pub fn send_configuration(
        &mut self,
        handle: PeerHandle,
        message_id: u32,
        entries: &[ConfigEntry],
    ) {
        if self.is_connected(handle) {
            let frame = self.codec.encode_configuration(message_id, entries);
            self.send_frame(&frame);
        }
    }

    /// Drops a peer and hangs up its call.
    pub fn disconnect(&mut self, handle: PeerHandle) {
        let events = self.peers.disconnect(handle);
        self.apply_peer_events(events);
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn modules(&self) -> &[ModuleSession] {
        &self.modules
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}

// =============================================================================
// Private stuff
// =============================================================================

#[derive(Debug)]
enum Outbound {
    Data {
        handle: PeerHandle,
        value_id: ValueId,
        value: i32,
    },
    Error {
        handle: PeerHandle,
        message_id: u32,
        payload: Vec<u8>,
    },
    Configuration {
        handle: PeerHandle,
        message_id: u32,
        entries: Vec<ConfigEntry>,
    },
    Disconnect(PeerHandle),
}

/// Routes decoded requests to the application on behalf of the primary peer.
struct Dispatch<'a, H: ClientHandler> {
    handler: &'a mut H,
    peers: &'a mut PeerRegistry,
    outbox: &'a mut Outbox,
}
impl<'a, H: ClientHandler> RequestHandler for Dispatch<'a, H> {
    fn on_request(&mut self, request: Request) -> bool {
        let handle = match self.peers.primary() {
            Some(handle) => handle,
            None => {
                debug!("{:?} without a connected peer", request);
                return false;
            }
        };

        match request {
            Request::Subscribe { message_id, value_id } => {
                self.handler.on_subscribe(handle, message_id, value_id, self.outbox)
            }
            Request::Unsubscribe { message_id, value_id } => {
                self.handler.on_unsubscribe(handle, message_id, value_id, self.outbox)
            }
            Request::Command { value_id, value } => {
                self.handler.on_command(handle, value_id, value, self.outbox)
            }
            Request::ConfigurationRequested { message_id } => {
                self.handler.on_configuration_requested(handle, message_id, self.outbox)
            }
            Request::IsAlive { message_id } => {
                self.peers.touch(handle);
                self.handler.on_is_alive(handle, message_id, self.outbox)
            }
        }
    }
}

impl<H: ClientHandler> Gateway<H> {
    fn handle_notification(&mut self, device: u8, notification: Notification) {
        match notification {
            Notification::Ring { payload } => {
                let events = self.peers.on_ring(device, &payload);
                self.apply_peer_events(events);
            }
            Notification::Connect { payload } => {
                let events = self.peers.on_connect(device, &payload);
                self.apply_peer_events(events);
            }
            Notification::NoCarrier { payload } => {
                let events = self.peers.on_no_carrier(device, &payload);
                self.apply_peer_events(events);
            }
            Notification::SppData { channel, payload } => {
                if device != self.codec_device {
                    trace!(
                        "[{}] ignoring {} bytes on channel {}",
                        device,
                        payload.len(),
                        channel
                    );
                    return;
                }
                let codec = self.rx_codecs.entry(channel).or_insert_with(FrameCodec::new);
                let mut dispatch = Dispatch {
                    handler: &mut self.handler,
                    peers: &mut self.peers,
                    outbox: &mut self.outbox,
                };
                let replies = codec.receive(&payload, &mut dispatch);
                for reply in replies {
                    self.send_frame(&reply);
                }
            }
            Notification::BleData { channel, payload } => {
                // No BLE profile is served yet.
                trace!(
                    "[{}] ignoring {} BLE bytes on channel {}",
                    device,
                    payload.len(),
                    channel
                );
            }
            Notification::Status(status) => self.status.set_status(status),
        }
    }

    fn apply_peer_events(&mut self, events: Vec<PeerEvent>) {
        for event in events {
            match event {
                PeerEvent::Accept { device, data } => {
                    if let Some(module) = self.module_mut(device) {
                        module.accept_connection(&data);
                    }
                }
                PeerEvent::Close { device, data } => {
                    if let Some(module) = self.module_mut(device) {
                        module.disconnect(&data);
                    }
                }
                PeerEvent::ClientConnected(handle) => {
                    self.reset_receivers();
                    self.handler.on_client_connected(handle, &mut self.outbox)
                }
                PeerEvent::ClientDisconnected(handle) => {
                    self.reset_receivers();
                    self.handler.on_client_disconnected(handle, &mut self.outbox)
                }
                PeerEvent::Status(status) => self.status.set_status(status),
            }
        }
    }

    /// A frame half received from a peer that left must not prefix the next
    /// peer's first frame.
    fn reset_receivers(&mut self) {
        for codec in self.rx_codecs.values_mut() {
            codec.reset();
        }
    }

    fn flush_outbox(&mut self) {
        while !self.outbox.is_empty() {
            let items = std::mem::take(&mut self.outbox.items);
            for item in items {
                match item {
                    Outbound::Data {
                        handle,
                        value_id,
                        value,
                    } => self.send_data(handle, value_id, value),
                    Outbound::Error {
                        handle,
                        message_id,
                        payload,
                    } => self.send_error(handle, message_id, &payload),
                    Outbound::Configuration {
                        handle,
                        message_id,
                        entries,
                    } => self.send_configuration(handle, message_id, &entries),
                    Outbound::Disconnect(handle) => self.disconnect(handle),
                }
            }
        }
    }

    fn is_connected(&self, handle: PeerHandle) -> bool {
        let connected = self.peers.get(handle).is_some();
        if !connected {
            debug!("peer {} is not connected, nothing sent", handle);
        }
        connected
    }

    fn module_mut(&mut self, device: u8) -> Option<&mut ModuleSession> {
        self.modules.iter_mut().find(|module| module.device() == device)
    }

    fn send_frame(&mut self, frame: &Bytes) {
        let device = self.codec_device;
        if let Some(module) = self.module_mut(device) {
            module.send_data(SPP_CHANNEL, frame);
        }
    }
}
