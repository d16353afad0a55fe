//! Events for the radio module session state machine.
//!
//! This modules is private and restricted to the [`module`](crate::module)
//! scope. The public interface of the session is provided by
//! [`module`](crate::module).
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use crate::clock::Tick;

// =============================================================================
// Crate-Public Interface
// =============================================================================

// BootEvent ===================================================================

/// Event fired to trigger a transition to [`BootingState`].
///
/// This event happens once, from the [`UninitializedState`], after the reset
/// line was asserted and the initialization commands were queued.
#[derive(Debug)]
pub(crate) struct BootEvent {
    pub device: u8,
    /// Tick at which the module was put in reset.
    pub started_at: Tick,
}

// InitializeEvent =============================================================

/// Event fired to trigger a transition to [`InitializingState`] once the boot
/// time of the module has elapsed.
#[derive(Debug)]
pub(crate) struct InitializeEvent {
    pub device: u8,
}

// EnterMuxEvent ===============================================================

/// Event fired to trigger a transition to [`MuxState`] once every queued
/// initialization command was acknowledged.
#[derive(Debug)]
pub(crate) struct EnterMuxEvent {
    pub device: u8,
}

// Event =======================================================================

/// Wrapper around all events of the module session state machine.
#[derive(Debug)]
pub(crate) enum Event {
    Boot(BootEvent),
    Initialize(InitializeEvent),
    EnterMux(EnterMuxEvent),
    /// The state did its share of work for this tick and stays current.
    Continue,
}
