//! Events for the device manager state machine.
//!
//! This module is private and restricted to the
//! [`device_manager`](crate::device_manager) scope.
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::settings::Settings;

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Data shared by all states and carried from one state to the next.
#[derive(Debug, Clone)]
pub(crate) struct HostContext {
    pub settings: Settings,
    /// Cleared to ask the service loop to stop at the next tick.
    pub running: Arc<AtomicBool>,
}
impl HostContext {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// WaitForPortEvent ============================================================

/// Fired when a port path is known but the device may not be plugged yet:
/// from `Init` when the path was given, or from `Service` after the link
/// failed.
#[derive(Debug)]
pub(crate) struct WaitForPortEvent {
    pub host: HostContext,
}

// SelectPortEvent =============================================================

/// Fired when the user has to pick a port: no path was given, the wait for
/// the given one was cancelled with `Esc`, or a selection was cancelled to
/// refresh the list.
#[derive(Debug)]
pub(crate) struct SelectPortEvent {
    pub host: HostContext,
}

// PortReadyEvent ==============================================================

/// Fired when the device path exists on the system. Triggers the transition
/// to the `Service` state.
#[derive(Debug)]
pub(crate) struct PortReadyEvent {
    pub host: HostContext,
}

// PortErrorEvent ==============================================================

/// Fired from `Service` when the port could not be opened or the link broke
/// while serving.
#[derive(Debug)]
pub(crate) struct PortErrorEvent {
    pub host: HostContext,
}

// DoneEvent ===================================================================

/// Fired from `Service` when a shutdown was requested.
#[derive(Debug)]
pub(crate) struct DoneEvent {
    pub host: HostContext,
    pub with_errors: bool,
}

// ExitEvent ===================================================================

/// The last event, ending the event loop with an exit status.
#[derive(Debug)]
pub(crate) struct ExitEvent {
    pub host: HostContext,
    pub with_error: bool,
}

// Events enum ==================================================================

#[derive(Debug)]
pub(crate) enum Event {
    WaitForPort(WaitForPortEvent),
    SelectPort(SelectPortEvent),
    PortReady(PortReadyEvent),
    PortError(PortErrorEvent),
    Done(DoneEvent),
    Exit(ExitEvent),
}
