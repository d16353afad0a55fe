//! Drives a whole gateway against a scripted radio module.

use std::sync::{Arc, Mutex};

use bluemod::clock::ManualClock;
use bluemod::frame::{Command, ConfigEntry, FrameCodec, ValueId};
use bluemod::module::{ModulePhase, ModuleSession};
use bluemod::peers::PeerHandle;
use bluemod::status::{LinkStatus, StatusIndicator};
use bluemod::transport::MemoryTransport;
use bluemod::{ClientHandler, Gateway, Outbox, SettingsBuilder};

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Connected(PeerHandle),
    Disconnected(PeerHandle),
    Subscribe(PeerHandle, ValueId),
    Command(PeerHandle, ValueId, i32),
    Configuration(PeerHandle, u32),
    IsAlive(PeerHandle, u32),
}

struct Recorder {
    seen: Vec<Seen>,
    verdict: bool,
    config: Vec<ConfigEntry>,
}
impl ClientHandler for Recorder {
    fn on_client_connected(&mut self, handle: PeerHandle, _outbox: &mut Outbox) {
        self.seen.push(Seen::Connected(handle));
    }

    fn on_client_disconnected(&mut self, handle: PeerHandle, _outbox: &mut Outbox) {
        self.seen.push(Seen::Disconnected(handle));
    }

    fn on_subscribe(
        &mut self,
        handle: PeerHandle,
        _message_id: u32,
        value_id: ValueId,
        outbox: &mut Outbox,
    ) -> bool {
        self.seen.push(Seen::Subscribe(handle, value_id));
        outbox.send_data(handle, value_id, 215);
        self.verdict
    }

    fn on_unsubscribe(
        &mut self,
        _handle: PeerHandle,
        _message_id: u32,
        _value_id: ValueId,
        _outbox: &mut Outbox,
    ) -> bool {
        self.verdict
    }

    fn on_command(
        &mut self,
        handle: PeerHandle,
        value_id: ValueId,
        value: i32,
        _outbox: &mut Outbox,
    ) -> bool {
        self.seen.push(Seen::Command(handle, value_id, value));
        self.verdict
    }

    fn on_configuration_requested(
        &mut self,
        handle: PeerHandle,
        message_id: u32,
        outbox: &mut Outbox,
    ) -> bool {
        self.seen.push(Seen::Configuration(handle, message_id));
        outbox.send_configuration(handle, message_id, &self.config);
        self.verdict
    }

    fn on_is_alive(&mut self, handle: PeerHandle, message_id: u32, _outbox: &mut Outbox) -> bool {
        self.seen.push(Seen::IsAlive(handle, message_id));
        self.verdict
    }
}

#[derive(Clone, Default)]
struct SharedStatus(Arc<Mutex<Vec<LinkStatus>>>);
impl SharedStatus {
    fn history(&self) -> Vec<LinkStatus> {
        self.0.lock().unwrap().clone()
    }
}
impl StatusIndicator for SharedStatus {
    fn set_status(&mut self, status: LinkStatus) {
        self.0.lock().unwrap().push(status);
    }
}

struct Rig {
    gateway: Gateway<Recorder>,
    radio: MemoryTransport,
    clock: Arc<ManualClock>,
    status: SharedStatus,
    codec: FrameCodec,
}
impl Rig {
    fn new() -> Self {
        let entry = ConfigEntry {
            room_id: 3,
            motor_id: 1,
            sensor_id: 7,
        };
        let settings = SettingsBuilder::new()
            .boot_time(10)
            .send_timeout(100)
            .retry_limit(3)
            .connection_timeout(500)
            .config_entry(entry)
            .finalize();
        let radio = MemoryTransport::new();
        let clock = Arc::new(ManualClock::new(0));
        let session = ModuleSession::new(
            0,
            &settings,
            Box::new(radio.clone()),
            Box::new(radio.reset_line()),
            clock.clone(),
        );
        let recorder = Recorder {
            seen: vec![],
            verdict: true,
            config: settings.config_entries.clone(),
        };
        let status = SharedStatus::default();
        let gateway = Gateway::new(&settings, clock.clone(), vec![session], recorder)
            .with_status(Box::new(status.clone()));
        Rig {
            gateway,
            radio,
            clock,
            status,
            codec: FrameCodec::new(),
        }
    }

    /// Resets the module and answers every initialization command.
    fn booted() -> Self {
        let mut rig = Rig::new();
        rig.gateway.tick();
        rig.clock.advance(11);
        rig.gateway.tick();
        for _ in 0..5 {
            rig.gateway.tick();
            rig.radio.inject(b"\r\nOK\r\n");
            rig.gateway.tick();
        }
        rig.gateway.tick();
        assert_eq!(rig.gateway.modules()[0].phase(), ModulePhase::Mux);
        rig.radio.take_sent();
        rig
    }

    /// A booted gateway with a peer connected on `channel`.
    fn with_peer(channel: u8) -> Self {
        let mut rig = Rig::booted();
        rig.radio.inject(&mux(0xff, &ring(channel)));
        rig.gateway.tick();
        rig.gateway.tick();
        assert_eq!(
            rig.radio.take_sent(),
            mux(0xff, format!("ATA 0x{:02X}\r", channel).as_bytes())
        );
        rig.radio.inject(&mux(0xff, b"\r\nOK\r\n"));
        rig.gateway.tick();
        rig.gateway.tick();
        rig.radio.inject(&mux(0xff, &connect(channel)));
        rig.gateway.tick();
        rig
    }

    fn peer_sends(&mut self, command: Command, message_id: u32, payload: &[u8]) {
        let frame = self.codec.encode(command, message_id, payload);
        self.radio.inject(&mux(0x00, &frame));
        self.gateway.tick();
    }

    fn seen(&self) -> &[Seen] {
        &self.gateway.handler().seen
    }
}

fn mux(channel: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0xcc, channel, payload.len() as u8];
    frame.extend_from_slice(payload);
    frame
}

fn ring(channel: u8) -> Vec<u8> {
    format!("\r\nRING 0018DA000001, 0x{:02X}\r\n", channel).into_bytes()
}

fn connect(channel: u8) -> Vec<u8> {
    format!("\r\nCONNECT 0018DA000001, 0x{:02X}\r\n", channel).into_bytes()
}

fn no_carrier(channel: u8) -> Vec<u8> {
    format!("\r\nNO CARRIER         {:02X}\r\n", channel).into_bytes()
}

#[test]
fn boots_into_mux_and_reports_ready() {
    let rig = Rig::booted();
    assert_eq!(rig.status.history(), vec![LinkStatus::Initializing, LinkStatus::Ready]);
    assert!(rig.gateway.peers().is_empty());
    assert!(!rig.radio.reset_asserted());
}

#[test]
fn incoming_call_is_accepted_and_registered() {
    let rig = Rig::with_peer(0x01);
    assert_eq!(rig.seen(), &[Seen::Connected(PeerHandle(0))]);
    assert_eq!(rig.gateway.peers().primary(), Some(PeerHandle(0)));
    assert_eq!(rig.status.history().last(), Some(&LinkStatus::Operating));
}

#[test]
fn is_alive_is_acknowledged_on_the_serial_channel() {
    let mut rig = Rig::with_peer(0x01);
    rig.peer_sends(Command::IsAlive, 7, &[]);

    let ack = rig.codec.encode_ack(7);
    assert_eq!(rig.radio.take_sent(), mux(0x00, &ack));
    assert_eq!(rig.seen().last(), Some(&Seen::IsAlive(PeerHandle(0), 7)));
}

#[test]
fn configuration_request_is_acked_then_answered() {
    let mut rig = Rig::with_peer(0x01);
    rig.peer_sends(Command::Configuration, 9, &[]);

    let entries = rig.gateway.handler().config.clone();
    let mut expected = mux(0x00, &rig.codec.encode_ack(9));
    expected.extend(mux(0x00, &rig.codec.encode_configuration(9, &entries)));
    assert_eq!(rig.radio.take_sent(), expected);
    assert_eq!(rig.seen().last(), Some(&Seen::Configuration(PeerHandle(0), 9)));
}

#[test]
fn subscription_can_push_the_current_value() {
    let mut rig = Rig::with_peer(0x01);
    let value_id = ValueId {
        motor_group: 2,
        id: 5,
    };
    rig.peer_sends(Command::SubscribeData, 11, &[0x02, 0x00, 0x05, 0x00]);

    let mut expected = mux(0x00, &rig.codec.encode_ack(11));
    expected.extend(mux(0x00, &rig.codec.encode_data(value_id, 215)));
    assert_eq!(rig.radio.take_sent(), expected);
    assert_eq!(rig.seen().last(), Some(&Seen::Subscribe(PeerHandle(0), value_id)));
}

#[test]
fn rejected_command_is_nacked() {
    let mut rig = Rig::with_peer(0x01);
    rig.gateway.handler_mut().verdict = false;
    let value_id = ValueId {
        motor_group: 1,
        id: 4,
    };
    rig.peer_sends(Command::Command, value_id.to_message_id(), &(-20i32).to_le_bytes());

    let nack = rig.codec.encode_nack(value_id.to_message_id());
    assert_eq!(rig.radio.take_sent(), mux(0x00, &nack));
    assert_eq!(rig.seen().last(), Some(&Seen::Command(PeerHandle(0), value_id, -20)));
}

#[test]
fn requests_without_a_peer_are_nacked() {
    let mut rig = Rig::booted();
    rig.peer_sends(Command::IsAlive, 3, &[]);

    let nack = rig.codec.encode_nack(3);
    assert_eq!(rig.radio.take_sent(), mux(0x00, &nack));
    assert!(rig.seen().is_empty());
}

#[test]
fn frame_split_over_mux_packets_is_reassembled() {
    let mut rig = Rig::with_peer(0x01);
    let frame = rig.codec.encode(Command::IsAlive, 21, &[]);
    rig.radio.inject(&mux(0x00, &frame[..5]));
    rig.gateway.tick();
    assert!(rig.radio.take_sent().is_empty());

    rig.radio.inject(&mux(0x00, &frame[5..]));
    rig.gateway.tick();
    let ack = rig.codec.encode_ack(21);
    assert_eq!(rig.radio.take_sent(), mux(0x00, &ack));
}

#[test]
fn partial_frame_of_a_departed_peer_is_dropped() {
    let mut rig = Rig::with_peer(0x01);
    let stale = rig.codec.encode(Command::IsAlive, 1, &[]);
    rig.radio.inject(&mux(0x00, &stale[..5]));
    rig.gateway.tick();

    rig.radio.inject(&mux(0xff, &no_carrier(0x01)));
    rig.gateway.tick();
    rig.radio.inject(&mux(0xff, &connect(0x02)));
    rig.gateway.tick();
    assert_eq!(rig.seen().last(), Some(&Seen::Connected(PeerHandle(1))));
    rig.radio.take_sent();

    rig.peer_sends(Command::IsAlive, 0, &[]);
    let ack = rig.codec.encode_ack(0);
    assert_eq!(rig.radio.take_sent(), mux(0x00, &ack));
    assert_eq!(rig.seen().last(), Some(&Seen::IsAlive(PeerHandle(1), 0)));
}

#[test]
fn serial_channels_reassemble_independently() {
    let mut rig = Rig::with_peer(0x01);
    let partial = rig.codec.encode(Command::IsAlive, 4, &[]);
    rig.radio.inject(&mux(0x01, &partial[..6]));
    rig.gateway.tick();

    rig.peer_sends(Command::IsAlive, 5, &[]);
    let ack = rig.codec.encode_ack(5);
    assert_eq!(rig.radio.take_sent(), mux(0x00, &ack));

    rig.radio.inject(&mux(0x01, &partial[6..]));
    rig.gateway.tick();
    let ack = rig.codec.encode_ack(4);
    assert_eq!(rig.radio.take_sent(), mux(0x00, &ack));
}

#[test]
fn no_carrier_drops_the_peer_without_hanging_up() {
    let mut rig = Rig::with_peer(0x01);
    rig.radio.inject(&mux(0xff, &no_carrier(0x01)));
    rig.gateway.tick();
    rig.gateway.tick();

    assert_eq!(rig.seen().last(), Some(&Seen::Disconnected(PeerHandle(0))));
    assert_eq!(rig.gateway.peers().primary(), None);
    assert_eq!(rig.status.history().last(), Some(&LinkStatus::Ready));
    assert!(rig.radio.take_sent().is_empty());
}

#[test]
fn silent_peer_times_out_and_is_hung_up() {
    let mut rig = Rig::with_peer(0x01);
    rig.clock.advance(501);
    rig.gateway.tick();
    assert_eq!(rig.seen().last(), Some(&Seen::Disconnected(PeerHandle(0))));

    rig.gateway.tick();
    assert_eq!(rig.radio.take_sent(), mux(0xff, b"ATH 0x01\r"));
}

#[test]
fn is_alive_keeps_the_peer_connected() {
    let mut rig = Rig::with_peer(0x01);
    rig.clock.advance(400);
    rig.peer_sends(Command::IsAlive, 1, &[]);
    rig.clock.advance(400);
    rig.gateway.tick();
    assert_eq!(rig.gateway.peers().len(), 1);
}

#[test]
fn application_sends_to_connected_peers_only() {
    let mut rig = Rig::with_peer(0x01);
    let value_id = ValueId {
        motor_group: 1,
        id: 2,
    };
    rig.gateway.send_data(PeerHandle(0), value_id, -5);
    let data = rig.codec.encode_data(value_id, -5);
    assert_eq!(rig.radio.take_sent(), mux(0x00, &data));

    rig.gateway.send_data(PeerHandle(9), value_id, -5);
    rig.gateway.send_error(PeerHandle(9), 1, b"E");
    assert!(rig.radio.take_sent().is_empty());
}

#[test]
fn application_disconnect_hangs_up() {
    let mut rig = Rig::with_peer(0x02);
    rig.gateway.disconnect(PeerHandle(0));
    assert_eq!(rig.seen().last(), Some(&Seen::Disconnected(PeerHandle(0))));

    rig.gateway.tick();
    assert_eq!(rig.radio.take_sent(), mux(0xff, b"ATH 0x02\r"));
}

#[test]
fn second_radio_accepts_calls_but_carries_no_frames() {
    let settings = SettingsBuilder::new().boot_time(10).send_timeout(100).finalize();
    let clock = Arc::new(ManualClock::new(0));
    let radios = [MemoryTransport::new(), MemoryTransport::new()];
    let sessions = radios
        .iter()
        .enumerate()
        .map(|(device, radio)| {
            ModuleSession::new(
                device as u8,
                &settings,
                Box::new(radio.clone()),
                Box::new(radio.reset_line()),
                clock.clone(),
            )
        })
        .collect();
    let recorder = Recorder {
        seen: vec![],
        verdict: true,
        config: vec![],
    };
    let mut gateway = Gateway::new(&settings, clock.clone(), sessions, recorder);

    gateway.tick();
    clock.advance(11);
    gateway.tick();
    for _ in 0..5 {
        gateway.tick();
        radios.iter().for_each(|radio| radio.inject(b"\r\nOK\r\n"));
        gateway.tick();
    }
    gateway.tick();
    assert!(gateway.modules().iter().all(|m| m.phase() == ModulePhase::Mux));
    radios.iter().for_each(|radio| {
        radio.take_sent();
    });

    radios[1].inject(&mux(0xff, &ring(0x03)));
    gateway.tick();
    gateway.tick();
    assert_eq!(radios[1].take_sent(), mux(0xff, b"ATA 0x03\r"));
    assert!(radios[0].take_sent().is_empty());

    let frame = FrameCodec::new().encode(Command::IsAlive, 1, &[]);
    radios[1].inject(&mux(0x00, &frame));
    gateway.tick();
    gateway.tick();
    assert!(radios[0].take_sent().is_empty());
    assert!(gateway.handler().seen.is_empty());
}
