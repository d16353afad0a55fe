//! Radio module session state machine.
//!
//! A session resets the module, configures it with plain AT commands and then
//! switches it to multiplexing mode, where it stays for good. All of it
//! happens one non-blocking `tick()` at a time.
//!
//! The following state diagram summarizes the different states and
//! transitions a session goes through:
//!
//! ```text
//!   Uninitialized --Boot--> Booting --Initialize--> Initializing --EnterMux--> Mux
//!                                                        |  ^                  |  ^
//!                                              Sending/Receiving     Sending/Receiving/
//!                                               (plain AT)            ReceivingAsync (MUX)
//! ```
//!
//! Inside `Initializing` and `Mux`, the [`SendRecvState`] cycles for every
//! queued command: `Sending` puts the head of the queue on the wire,
//! `Receiving` waits for its `OK` (or a timeout) and `ReceivingAsync` idles
//! while nothing is queued.

use std::sync::Arc;

use log::info;

use super::commands::{AtCommand, CommandEntry, Retry};
use super::events::*;
use super::link::{ModuleLink, Notification, SendRecvState};
use super::states::*;
use crate::clock::Clock;
use crate::settings::Settings;
use crate::transport::{ResetLine, Transport};

// =============================================================================
// Public Interface
// =============================================================================

/// The phase a session is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulePhase {
    Uninitialized,
    Booting,
    Initializing,
    Mux,
}

/// A session with one radio module. Create it with [`ModuleSession::new`]
/// and call [`tick`](ModuleSession::tick) periodically.
pub struct ModuleSession {
    link: ModuleLink,
    sm: ModuleStates,
}
impl ModuleSession {
    /// Creates a session for the module identified by `device`. Nothing is
    /// sent before the first tick.
    pub fn new(
        device: u8,
        settings: &Settings,
        transport: Box<dyn Transport>,
        reset: Box<dyn ResetLine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ModuleSession {
            link: ModuleLink::new(device, settings, transport, reset, clock),
            // A session naturally starts in the `Uninitialized` state.
            sm: ModuleStates::Uninitialized(ModuleSM::new(device)),
        }
    }

    /// Does one unit of work and returns what happened during it.
    pub fn tick(&mut self) -> Vec<Notification> {
        self.sm = self.sm.step(&mut self.link);
        std::mem::take(&mut self.link.notifications)
    }

    pub fn device(&self) -> u8 {
        self.link.device
    }

    pub fn phase(&self) -> ModulePhase {
        match self.sm {
            ModuleStates::Uninitialized(_) => ModulePhase::Uninitialized,
            ModuleStates::Booting(_) => ModulePhase::Booting,
            ModuleStates::Initializing(_) => ModulePhase::Initializing,
            ModuleStates::Mux(_) => ModulePhase::Mux,
        }
    }

    pub fn send_recv_state(&self) -> SendRecvState {
        self.link.send_recv
    }

    /// Number of commands waiting for an acknowledgement, including the one
    /// in flight.
    pub fn pending_commands(&self) -> usize {
        self.link.queue.len()
    }

    /// The command in flight, or the next one to go.
    pub fn head_command(&self) -> Option<&CommandEntry> {
        self.link.queue.front()
    }

    /// Number of received bytes not parsed yet.
    pub fn buffered(&self) -> usize {
        self.link.ring.available()
    }

    /// Queues a command. Silently dropped when the queue is full.
    pub fn enqueue(&mut self, command: AtCommand, data: &[u8], retry: Retry) {
        self.link.enqueue(command, data, retry);
    }

    /// Answers an incoming call. `data` is the channel field of the `RING`.
    pub fn accept_connection(&mut self, data: &[u8]) {
        self.link.enqueue(AtCommand::AcceptCall, data, Retry::Once);
    }

    /// Hangs up the call identified by `data`.
    pub fn disconnect(&mut self, data: &[u8]) {
        self.link.enqueue(AtCommand::CloseConnection, data, Retry::Once);
    }

    /// Sends `data` on MUX channel `channel`, in as many frames as needed.
    pub fn send_data(&mut self, channel: u8, data: &[u8]) {
        self.link.send_mux_data(channel, data);
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The raw state machine of a module session.
///
/// The generic type holding the current state leaves room for data shared by
/// all states. Everything the states work on lives in the [`ModuleLink`]
/// passed to `run()`.
#[derive(Debug, Clone, Copy)]
struct ModuleSM<S: Runnable> {
    device: u8,
    state: S,
}
impl<S: Runnable> ModuleSM<S> {
    fn run(&mut self, link: &mut ModuleLink) -> Event {
        self.state.run(link)
    }
}

/// The state machine starts in the `UninitializedState`.
impl ModuleSM<UninitializedState> {
    fn new(device: u8) -> Self {
        ModuleSM {
            device,
            state: UninitializedState {},
        }
    }
}

/// An enum wrapper around the states of the session state machine.
enum ModuleStates {
    Uninitialized(ModuleSM<UninitializedState>),
    Booting(ModuleSM<BootingState>),
    Initializing(ModuleSM<InitializingState>),
    Mux(ModuleSM<MuxState>),
}
impl ModuleStates {
    /// The unit of work in the session. It runs the current state and decides
    /// the next transition from the event it returns.
    fn step(&mut self, link: &mut ModuleLink) -> Self {
        match self {
            ModuleStates::Uninitialized(sm) => {
                let event = sm.run(link);
                match event {
                    Event::Boot(ev) => ModuleStates::Booting(ev.into()),
                    _ => unreachable!(
                        "[{}] illegal event {:#?} at current state {:#?}",
                        sm.device, event, sm
                    ),
                }
            }
            ModuleStates::Booting(sm) => {
                let event = sm.run(link);
                match event {
                    Event::Initialize(ev) => ModuleStates::Initializing(ev.into()),
                    Event::Continue => ModuleStates::Booting(*sm),
                    _ => unreachable!(
                        "[{}] illegal event {:#?} at current state {:#?}",
                        sm.device, event, sm
                    ),
                }
            }
            ModuleStates::Initializing(sm) => {
                let event = sm.run(link);
                match event {
                    Event::EnterMux(ev) => ModuleStates::Mux(ev.into()),
                    Event::Continue => ModuleStates::Initializing(*sm),
                    _ => unreachable!(
                        "[{}] illegal event {:#?} at current state {:#?}",
                        sm.device, event, sm
                    ),
                }
            }
            ModuleStates::Mux(sm) => {
                let event = sm.run(link);
                match event {
                    Event::Continue => ModuleStates::Mux(*sm),
                    _ => unreachable!(
                        "[{}] illegal event {:#?} at current state {:#?}",
                        sm.device, event, sm
                    ),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<BootEvent> for ModuleSM<BootingState> {
    fn from(event: BootEvent) -> ModuleSM<BootingState> {
        info!("[{}] => Booting", event.device);
        ModuleSM {
            device: event.device,
            state: BootingState {
                started_at: event.started_at,
            },
        }
    }
}

impl From<InitializeEvent> for ModuleSM<InitializingState> {
    fn from(event: InitializeEvent) -> ModuleSM<InitializingState> {
        info!("[{}] => Initializing", event.device);
        ModuleSM {
            device: event.device,
            state: InitializingState {},
        }
    }
}

impl From<EnterMuxEvent> for ModuleSM<MuxState> {
    fn from(event: EnterMuxEvent) -> ModuleSM<MuxState> {
        info!("[{}] => Mux", event.device);
        ModuleSM {
            device: event.device,
            state: MuxState {},
        }
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
    use crate::status::LinkStatus;
    use crate::transport::MemoryTransport;

    struct Bench {
        session: ModuleSession,
        script: MemoryTransport,
        clock: Arc<ManualClock>,
    }

    fn bench() -> Bench {
        let settings = SettingsBuilder::new()
            .boot_time(10)
            .send_timeout(100)
            .retry_limit(3)
            .finalize();
        let script = MemoryTransport::new();
        let clock = Arc::new(ManualClock::new(0));
        let session = ModuleSession::new(
            0,
            &settings,
            Box::new(script.clone()),
            Box::new(script.reset_line()),
            clock.clone(),
        );
        Bench {
            session,
            script,
            clock,
        }
    }

    fn mux(channel: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xcc, channel, payload.len() as u8];
        frame.extend_from_slice(payload);
        frame
    }

    /// Boots the module and answers every initialization command.
    fn bench_in_mux() -> Bench {
        let mut bench = bench();
        bench.session.tick();
        bench.clock.advance(11);
        bench.session.tick();
        for _ in 0..5 {
            bench.session.tick();
            bench.script.inject(b"\r\nOK\r\n");
            bench.session.tick();
        }
        bench.session.tick();
        assert_eq!(bench.session.phase(), ModulePhase::Mux);
        bench.script.take_sent();
        bench
    }

    #[test]
    fn boot_resets_and_queues_initialization() {
        let mut bench = bench();
        assert_eq!(bench.session.phase(), ModulePhase::Uninitialized);

        let notifications = bench.session.tick();
        assert_eq!(notifications, vec![Notification::Status(LinkStatus::Initializing)]);
        assert_eq!(bench.session.phase(), ModulePhase::Booting);
        assert!(bench.script.reset_asserted());
        assert_eq!(bench.session.pending_commands(), 5);

        bench.clock.advance(10);
        bench.session.tick();
        assert!(!bench.script.reset_asserted());
        assert_eq!(bench.session.phase(), ModulePhase::Booting);

        bench.clock.advance(1);
        bench.session.tick();
        assert_eq!(bench.session.phase(), ModulePhase::Initializing);
        assert!(bench.script.take_sent().is_empty());
    }

    #[test]
    fn initialization_sequence_reaches_mux() {
        let mut bench = bench();
        bench.session.tick();
        bench.clock.advance(11);
        bench.session.tick();

        let expected: [&[u8]; 5] = [
            b"AT\r",
            b"AT+BNAME=Bluemod\r",
            b"ATE0\r",
            b"ATS0=1\r",
            b"AT+BMUX=1\r",
        ];
        for line in expected.iter() {
            bench.session.tick();
            assert_eq!(bench.session.send_recv_state(), SendRecvState::Receiving);
            assert_eq!(bench.script.take_sent(), line.to_vec());

            // Echo and the answer may arrive in pieces.
            bench.script.inject(b"\r\nO");
            bench.session.tick();
            assert_eq!(bench.session.send_recv_state(), SendRecvState::Receiving);
            bench.script.inject(b"K\r\n");
            bench.session.tick();
            assert_eq!(bench.session.send_recv_state(), SendRecvState::Sending);
        }

        let notifications = bench.session.tick();
        assert_eq!(notifications, vec![Notification::Status(LinkStatus::Ready)]);
        assert_eq!(bench.session.phase(), ModulePhase::Mux);
        assert_eq!(bench.session.send_recv_state(), SendRecvState::ReceivingAsync);
        assert_eq!(bench.session.buffered(), 0);
    }

    #[test]
    fn plain_command_is_resent_without_counting_tries() {
        let mut bench = bench();
        bench.session.tick();
        bench.clock.advance(11);
        bench.session.tick();

        for _ in 0..10 {
            bench.session.tick();
            assert_eq!(bench.script.take_sent(), b"AT\r".to_vec());
            bench.clock.advance(101);
            bench.session.tick();
            assert_eq!(bench.session.send_recv_state(), SendRecvState::Sending);
        }
        assert_eq!(bench.session.pending_commands(), 5);
        assert_eq!(bench.session.head_command().map(|e| e.try_count), Some(0));
    }

    #[test]
    fn mux_command_is_dropped_after_retry_limit() {
        let mut bench = bench_in_mux();
        bench.session.enqueue(AtCommand::Information, b"", Retry::Forever);
        assert_eq!(bench.session.send_recv_state(), SendRecvState::Sending);

        for try_count in 1..=3 {
            bench.session.tick();
            assert_eq!(bench.script.take_sent(), mux(0xff, b"ATI\r"));
            assert_eq!(bench.session.head_command().map(|e| e.try_count), Some(try_count));

            bench.clock.advance(101);
            bench.session.tick();
            assert_eq!(bench.session.send_recv_state(), SendRecvState::Sending);
        }

        bench.session.tick();
        assert!(bench.script.take_sent().is_empty());
        assert_eq!(bench.session.pending_commands(), 0);
        assert_eq!(bench.session.send_recv_state(), SendRecvState::ReceivingAsync);
    }

    #[test]
    fn mux_ok_acknowledges_head_command() {
        let mut bench = bench_in_mux();
        bench.session.enqueue(AtCommand::DeleteBonding, b"", Retry::Forever);
        bench.session.tick();
        assert_eq!(bench.script.take_sent(), mux(0xff, b"AT+BNDDEL=\r"));

        bench.script.inject(&mux(0xff, b"\r\nOK\r\n"));
        assert!(bench.session.tick().is_empty());
        assert_eq!(bench.session.pending_commands(), 0);
        assert_eq!(bench.session.send_recv_state(), SendRecvState::Sending);

        bench.session.tick();
        assert_eq!(bench.session.send_recv_state(), SendRecvState::ReceivingAsync);
    }

    #[test]
    fn send_once_command_gets_a_single_try() {
        let mut bench = bench_in_mux();
        bench.session.accept_connection(b"0x01");
        bench.session.tick();
        assert_eq!(bench.script.take_sent(), mux(0xff, b"ATA 0x01\r"));

        bench.clock.advance(101);
        bench.session.tick();
        bench.session.tick();
        assert!(bench.script.take_sent().is_empty());
        assert_eq!(bench.session.pending_commands(), 0);
    }

    #[test]
    fn enqueue_does_not_interrupt_command_in_flight() {
        let mut bench = bench_in_mux();
        bench.session.disconnect(b"0x01");
        bench.session.tick();
        assert_eq!(bench.session.send_recv_state(), SendRecvState::Receiving);

        bench.session.enqueue(AtCommand::Inquiry, b"", Retry::Forever);
        assert_eq!(bench.session.send_recv_state(), SendRecvState::Receiving);
        assert_eq!(bench.session.pending_commands(), 2);
        assert_eq!(
            bench.session.head_command().map(|e| e.command),
            Some(AtCommand::CloseConnection)
        );
    }

    #[test]
    fn unsolicited_responses_are_reported() {
        let mut bench = bench_in_mux();
        let ring = b"\r\nRING 0x01 001122334455\r\n".to_vec();
        bench.script.inject(b"junk");
        bench.script.inject(&mux(0xff, &ring));

        let notifications = bench.session.tick();
        assert_eq!(notifications, vec![Notification::Ring { payload: ring }]);
        assert_eq!(bench.session.buffered(), 0);

        bench.script.inject(&mux(0xff, b"\r\nCONNECT 001122334455,0x01\r\n"));
        assert!(matches!(bench.session.tick().as_slice(), [Notification::Connect { .. }]));

        bench.script.inject(&mux(0xff, b"\r\nNO CARRIER 0x01\r\n"));
        assert!(matches!(bench.session.tick().as_slice(), [Notification::NoCarrier { .. }]));
    }

    #[test]
    fn data_frames_are_routed_by_channel() {
        let mut bench = bench_in_mux();
        let frame = mux(0x00, &[1, 2, 3, 4, 5]);
        bench.script.inject(&frame[..4]);
        assert!(bench.session.tick().is_empty());
        assert_eq!(bench.session.buffered(), 4);

        bench.script.inject(&frame[4..]);
        assert_eq!(
            bench.session.tick(),
            vec![Notification::SppData {
                channel: 0,
                payload: vec![1, 2, 3, 4, 5]
            }]
        );

        bench.script.inject(&mux(0x02, b"le"));
        assert_eq!(
            bench.session.tick(),
            vec![Notification::BleData {
                channel: 2,
                payload: b"le".to_vec()
            }]
        );
    }

    #[test]
    fn one_frame_is_parsed_per_tick() {
        let mut bench = bench_in_mux();
        let mut input = mux(0x01, b"a");
        input.extend(mux(0x01, b"b"));
        bench.script.inject(&input);

        assert_eq!(bench.session.tick().len(), 1);
        assert_eq!(bench.session.buffered(), 4);
        assert_eq!(
            bench.session.tick(),
            vec![Notification::SppData {
                channel: 1,
                payload: b"b".to_vec()
            }]
        );
    }

    #[test]
    fn receive_timeout_flushes_partial_input() {
        let mut bench = bench_in_mux();
        bench.session.enqueue(AtCommand::Information, b"", Retry::Forever);
        bench.session.tick();

        bench.script.inject(&[0xcc, 0x00, 0x05, 0x01, 0x02]);
        bench.session.tick();
        assert_eq!(bench.session.buffered(), 5);

        bench.clock.advance(101);
        bench.session.tick();
        assert_eq!(bench.session.buffered(), 0);
        assert_eq!(bench.session.send_recv_state(), SendRecvState::Sending);
    }

    #[test]
    fn ring_takes_precedence_over_ok_in_the_same_answer() {
        let mut bench = bench_in_mux();
        bench.session.enqueue(AtCommand::Information, b"", Retry::Forever);
        bench.session.tick();
        assert_eq!(bench.script.take_sent(), mux(0xff, b"ATI\r"));

        let answer = b"\r\nCONNECT 0018DA000001, 0x01\r\n\r\nOK\r\n".to_vec();
        bench.script.inject(&mux(0xff, &answer));
        assert_eq!(
            bench.session.tick(),
            vec![Notification::Connect { payload: answer }]
        );
        assert_eq!(bench.session.pending_commands(), 1);
        assert_eq!(bench.session.send_recv_state(), SendRecvState::Receiving);

        let answer = b"\r\nRING 0018DA000001, 0x02\r\nCONNECT\r\nNO CARRIER\r\n".to_vec();
        bench.script.inject(&mux(0xff, &answer));
        assert_eq!(bench.session.tick(), vec![Notification::Ring { payload: answer }]);
    }

    #[test]
    fn plain_timeout_keeps_a_partial_answer() {
        let mut bench = bench();
        bench.session.tick();
        bench.clock.advance(11);
        bench.session.tick();
        bench.session.tick();
        assert_eq!(bench.script.take_sent(), b"AT\r".to_vec());

        bench.script.inject(b"\r\nO");
        bench.session.tick();
        assert_eq!(bench.session.buffered(), 3);

        bench.clock.advance(101);
        bench.session.tick();
        assert_eq!(bench.session.send_recv_state(), SendRecvState::Sending);
        assert_eq!(bench.session.buffered(), 3);

        bench.session.tick();
        assert_eq!(bench.script.take_sent(), b"AT\r".to_vec());
        bench.script.inject(b"K\r\n");
        bench.session.tick();
        assert_eq!(bench.session.send_recv_state(), SendRecvState::Sending);
        assert_eq!(bench.session.pending_commands(), 4);
        assert_eq!(bench.session.buffered(), 0);
    }

    #[test]
    fn full_buffer_without_a_frame_is_discarded() {
        let mut bench = bench_in_mux();
        // Announces 200 bytes, more than the 128 byte receive buffer holds.
        let mut garbage = vec![0xcc, 0x00, 0xc8];
        garbage.resize(128, 0);
        bench.script.inject(&garbage);

        assert!(bench.session.tick().is_empty());
        assert_eq!(bench.session.buffered(), 0);

        bench.script.inject(&mux(0x00, &[1, 2]));
        assert_eq!(
            bench.session.tick(),
            vec![Notification::SppData {
                channel: 0,
                payload: vec![1, 2]
            }]
        );
    }

    #[test]
    fn input_is_parsed_while_a_command_goes_out() {
        let mut bench = bench_in_mux();
        bench.session.enqueue(AtCommand::Information, b"", Retry::Forever);
        bench.script.inject(&mux(0x00, &[7]));

        let notifications = bench.session.tick();
        assert_eq!(bench.script.take_sent(), mux(0xff, b"ATI\r"));
        assert_eq!(
            notifications,
            vec![Notification::SppData {
                channel: 0,
                payload: vec![7]
            }]
        );
        assert_eq!(bench.session.send_recv_state(), SendRecvState::Receiving);
    }

    #[test]
    fn empty_payload_sends_a_zero_length_frame() {
        let mut bench = bench_in_mux();
        bench.session.send_data(1, &[]);
        assert_eq!(bench.script.take_sent(), vec![0xcc, 0x01, 0x00]);
    }

    #[test]
    fn large_payload_is_split_in_mux_frames() {
        let mut bench = bench_in_mux();
        let data = vec![0x55u8; 300];
        bench.session.send_data(0, &data);

        let mut expected = mux(0x00, &data[..255]);
        expected.extend(mux(0x00, &data[255..]));
        assert_eq!(bench.script.take_sent(), expected);
    }
}
