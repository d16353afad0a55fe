//! Serial port device selection and state management.
//!
//! The radio module sits behind a USB serial adapter whose port can come and
//! go. The device manager waits for the port (or lets the user pick one),
//! serves the gateway over it, and starts over when the link breaks:
//!
//! ```text
//!                            START
//!                              |
//!                              v
//!                          .-------.
//!                          | Init  |
//!                          '-------'
//!                              |
//!                              v
//!                    no  .----------.  yes
//!                  .----( port_name? )----.
//!      .-----.     |     '----------'     |
//!      |     |     v                      v
//!      |    .------------.         .-------------.
//!      '--->| SelectPort |<-----.--| WaitForPort |<---.
//!           '------------'      |  '-------------'    |
//!              |              port                    |
//!              |              ready                   |
//!              |                v                     |
//!             port     ******************             |
//!             ready    *    Service     *     port    |
//!              |       ******************     error   |
//!              '------>*    Gateway     *-------------'
//!                      ******************
//!                               |
//!                           shutdown
//!                               v
//!                              END
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::info;

use super::events::*;
use super::states::*;
use crate::settings::Settings;

// =============================================================================
// Public Interface
// =============================================================================

/// Runs the device manager. Use the [`factory`] function to get an instance.
pub struct DeviceManager {
    running: Arc<AtomicBool>,
    sm: DeviceManagerStates,
}
impl DeviceManager {
    /// The event loop runs until the `Done` state is reached and its
    /// `should_exit` flag is set. It then returns **`0`** when there were no
    /// errors and **`1`** otherwise.
    pub fn run(&mut self) -> i8 {
        loop {
            self.sm = self.sm.step();
            if let DeviceManagerStates::Done(sm) = &self.sm {
                if sm.state.should_exit {
                    return if sm.state.with_error { 1 } else { 0 };
                }
            }
        }
    }

    /// A flag that stops the service loop when cleared, for instance from a
    /// Ctrl+C handler.
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Asks the service loop to stop at its next tick.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Builds a device manager in its `Init` state.
pub fn factory(settings: Settings) -> DeviceManager {
    let running = Arc::new(AtomicBool::new(true));
    let host = HostContext {
        settings,
        running: Arc::clone(&running),
    };
    DeviceManager {
        running,
        sm: DeviceManagerStates::Init(DeviceManagerSM::new(host)),
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The state machine itself, holding the host context shared by all states
/// next to the current state.
#[derive(Debug)]
struct DeviceManagerSM<S: Runnable> {
    host: HostContext,
    state: S,
}
impl<S: Runnable> DeviceManagerSM<S> {
    fn run(&mut self) -> Event {
        self.state.run(&self.host)
    }
}

impl DeviceManagerSM<InitState> {
    fn new(host: HostContext) -> Self {
        DeviceManagerSM {
            host,
            state: InitState {},
        }
    }
}

enum DeviceManagerStates {
    Init(DeviceManagerSM<InitState>),
    WaitForPort(DeviceManagerSM<WaitForPortState>),
    SelectPort(DeviceManagerSM<SelectPortState>),
    Service(DeviceManagerSM<ServiceState>),
    Done(DeviceManagerSM<DoneState>),
}
impl DeviceManagerStates {
    fn step(&mut self) -> Self {
        match self {
            DeviceManagerStates::Init(sm) => {
                let event = sm.run();
                match event {
                    Event::WaitForPort(ev) => DeviceManagerStates::WaitForPort(ev.into()),
                    Event::SelectPort(ev) => DeviceManagerStates::SelectPort(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            DeviceManagerStates::WaitForPort(sm) => {
                let event = sm.run();
                match event {
                    Event::PortReady(ev) => DeviceManagerStates::Service(ev.into()),
                    Event::SelectPort(ev) => DeviceManagerStates::SelectPort(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            DeviceManagerStates::SelectPort(sm) => {
                let event = sm.run();
                match event {
                    Event::SelectPort(ev) => DeviceManagerStates::SelectPort(ev.into()),
                    Event::PortReady(ev) => DeviceManagerStates::Service(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            DeviceManagerStates::Service(sm) => {
                let event = sm.run();
                match event {
                    Event::Done(ev) => DeviceManagerStates::Done(ev.into()),
                    Event::PortError(ev) => DeviceManagerStates::WaitForPort(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            DeviceManagerStates::Done(sm) => {
                let event = sm.run();
                match event {
                    Event::Exit(ev) => DeviceManagerStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<WaitForPortEvent> for DeviceManagerSM<WaitForPortState> {
    fn from(event: WaitForPortEvent) -> DeviceManagerSM<WaitForPortState> {
        DeviceManagerSM {
            host: event.host,
            state: WaitForPortState {},
        }
    }
}
impl From<PortErrorEvent> for DeviceManagerSM<WaitForPortState> {
    fn from(event: PortErrorEvent) -> DeviceManagerSM<WaitForPortState> {
        info!("serial link lost, waiting for the port to come back");
        DeviceManagerSM {
            host: event.host,
            state: WaitForPortState {},
        }
    }
}

impl From<SelectPortEvent> for DeviceManagerSM<SelectPortState> {
    fn from(event: SelectPortEvent) -> DeviceManagerSM<SelectPortState> {
        DeviceManagerSM {
            host: event.host,
            state: SelectPortState {},
        }
    }
}

impl From<PortReadyEvent> for DeviceManagerSM<ServiceState> {
    fn from(event: PortReadyEvent) -> DeviceManagerSM<ServiceState> {
        DeviceManagerSM {
            host: event.host,
            state: ServiceState {},
        }
    }
}

impl From<DoneEvent> for DeviceManagerSM<DoneState> {
    fn from(event: DoneEvent) -> DeviceManagerSM<DoneState> {
        DeviceManagerSM {
            host: event.host,
            state: DoneState {
                with_error: event.with_errors,
                should_exit: false,
            },
        }
    }
}
impl From<ExitEvent> for DeviceManagerSM<DoneState> {
    fn from(event: ExitEvent) -> DeviceManagerSM<DoneState> {
        DeviceManagerSM {
            host: event.host,
            state: DoneState {
                with_error: event.with_error,
                should_exit: true,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn starts_in_init_and_running() {
    let dm = factory(crate::SettingsBuilder::new().finalize());
    assert!(matches!(dm.sm, DeviceManagerStates::Init(_)));
    assert!(dm.running().load(Ordering::SeqCst));
}

#[test]
fn shutdown_clears_the_shared_flag() {
    let dm = factory(crate::SettingsBuilder::new().path("/dev/null").finalize());
    let running = dm.running();
    dm.shutdown();
    assert!(!running.load(Ordering::SeqCst));
    if let DeviceManagerStates::Init(sm) = &dm.sm {
        assert!(!sm.host.is_running());
    }
}

#[test]
fn done_exits_with_the_error_status() {
    let dm = factory(crate::SettingsBuilder::new().finalize());
    let host = match &dm.sm {
        DeviceManagerStates::Init(sm) => sm.host.clone(),
        _ => unreachable!(),
    };
    let mut sm = DeviceManagerStates::Done(
        DoneEvent {
            host,
            with_errors: true,
        }
        .into(),
    );
    sm = sm.step();
    match sm {
        DeviceManagerStates::Done(sm) => {
            assert!(sm.state.should_exit);
            assert!(sm.state.with_error);
        }
        _ => panic!("expected the Done state"),
    }
}
