//! States for the radio module session state machine.
//!
//! This modules is private and restricted to the [`module`](crate::module)
//! scope. The public interface of the session is provided by
//! [`module`](crate::module).
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use log::debug;

use super::commands::{AtCommand, Retry};
use super::events::*;
use super::link::{ModuleLink, Notification, SendRecvState};
use crate::clock::{elapsed, Tick};
use crate::status::LinkStatus;

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` on every tick while the
/// state machine is in it.
pub(crate) trait Runnable {
    /// A state implements this method to do one tick worth of work.
    ///
    /// The returned `event` either requests a transition to a `new state`,
    /// through the corresponding [`From`] trait implementation, or is
    /// [`Event::Continue`] to stay in the current state until the next tick.
    /// A state never blocks.
    fn run(&mut self, link: &mut ModuleLink) -> Event;
}

// Uninitialized State =========================================================

/// The initial state of a module session.
///
/// From the `UninitializedState`, the state machine evolves unconditionally
/// on the first tick:
///
///  * **[`BootEvent`] => [`BootingState`]** after the module was put in reset
///    and the initialization commands were queued.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UninitializedState {}
impl Runnable for UninitializedState {
    fn run(&mut self, link: &mut ModuleLink) -> Event {
        link.notify(Notification::Status(LinkStatus::Initializing));
        link.reset.assert_reset();

        let name = link.settings.device_name.clone();
        link.enqueue(AtCommand::Attention, b"", Retry::Forever);
        link.enqueue(AtCommand::DeviceName, name.as_bytes(), Retry::Forever);
        // No local echo.
        link.enqueue(AtCommand::Echo, b"0", Retry::Forever);
        // Answer calls automatically after the first ring.
        link.enqueue(AtCommand::Register, b"0=1", Retry::Forever);
        link.enqueue(AtCommand::Multiplexing, b"1", Retry::Forever);

        Event::Boot(BootEvent {
            device: link.device,
            started_at: link.now(),
        })
    }
}

// Booting State ===============================================================

/// The module was reset and is given some time to boot.
///
/// From the `BootingState`, the state machine can evolve via the following
/// transitions:
///
///  * **[`InitializeEvent`] => [`InitializingState`]** once more than the
///    configured boot time has elapsed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BootingState {
    pub started_at: Tick,
}
impl Runnable for BootingState {
    fn run(&mut self, link: &mut ModuleLink) -> Event {
        link.reset.release_reset();

        if elapsed(self.started_at, link.now()) > link.settings.boot_time {
            return Event::Initialize(InitializeEvent {
                device: link.device,
            });
        }
        Event::Continue
    }
}

// Initializing State ==========================================================

/// The queued commands are sent in plain AT mode, one at a time, each resent
/// as-is until the module answers `OK`.
///
/// From the `InitializingState`, the state machine can evolve via the
/// following transitions:
///
///  * **[`EnterMuxEvent`] => [`MuxState`]** once the command queue is empty.
///    The last command enables the multiplexing mode on the module.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InitializingState {}
impl Runnable for InitializingState {
    fn run(&mut self, link: &mut ModuleLink) -> Event {
        match link.send_recv {
            SendRecvState::Sending => {
                if !link.send_next_plain() {
                    link.send_recv = SendRecvState::ReceivingAsync;
                    link.notify(Notification::Status(LinkStatus::Ready));
                    return Event::EnterMux(EnterMuxEvent {
                        device: link.device,
                    });
                }
            }
            SendRecvState::Receiving => {
                if link.response_timed_out() {
                    debug!("[{}] no answer, sending again", link.device);
                    link.send_recv = SendRecvState::Sending;
                } else {
                    link.read_input();
                    link.parse_plain_response();
                }
            }
            SendRecvState::ReceivingAsync => {
                // Only reachable when the queue went empty behind our back.
                link.send_recv = SendRecvState::Sending;
            }
        }
        Event::Continue
    }
}

// Mux State ===================================================================

/// The steady state: all traffic is multiplexed. Commands get a bounded
/// number of tries; unsolicited responses and peer data are dispatched as
/// notifications.
///
/// Input is read and one frame parsed on every tick, whatever the command
/// cycle is doing, so peer data keeps flowing while commands go out.
///
/// The `MuxState` has no outgoing transition.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MuxState {}
impl Runnable for MuxState {
    fn run(&mut self, link: &mut ModuleLink) -> Event {
        match link.send_recv {
            SendRecvState::Sending => link.send_next_mux(),
            SendRecvState::Receiving => {
                if link.response_timed_out() {
                    // A garbled answer must not shift the next frame boundaries.
                    debug!("[{}] no answer, flushing input", link.device);
                    link.send_recv = SendRecvState::Sending;
                    link.ring.clear();
                }
            }
            SendRecvState::ReceivingAsync => {}
        }

        link.read_input();
        link.parse_mux_frame();
        Event::Continue
    }
}
