//! States for the device manager state machine.
//!
//! This module is private and restricted to the
//! [`device_manager`](crate::device_manager) scope.
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use std::{sync::Arc, thread, time::Duration};

use log::{info, warn};
use serialport::SerialPort;

use super::console::ConsoleClient;
use super::events::*;
use crate::clock::{Clock, SystemClock};
use crate::gateway::Gateway;
use crate::module::ModuleSession;
use crate::transport::SerialTransport;
use crate::utils;

/// Bytes the serial reader thread can hold between two ticks.
const HOST_RECEIVE_BUFFER: usize = 4096;

/// Device number of the radio module behind the serial port.
const RADIO_DEVICE: u8 = 0;

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` after a transition into it.
pub(crate) trait Runnable {
    /// Does the work of the state and requests the next transition by
    /// returning the matching `event`.
    fn run(&mut self, host: &HostContext) -> Event;
}

// Init State ==================================================================

/// Initial state. Goes to `WaitForPort` when a device path was configured,
/// and to `SelectPort` otherwise.
#[derive(Debug)]
pub(crate) struct InitState {}
impl Runnable for InitState {
    fn run(&mut self, host: &HostContext) -> Event {
        info!("=> Init");
        match host.settings.path {
            Some(_) => Event::WaitForPort(WaitForPortEvent { host: host.clone() }),
            None => Event::SelectPort(SelectPortEvent { host: host.clone() }),
        }
    }
}

// WaitForPortState ============================================================

#[derive(Debug)]
pub(crate) struct WaitForPortState {}
impl Runnable for WaitForPortState {
    fn run(&mut self, host: &HostContext) -> Event {
        info!("=> WaitForPort");
        let path = match host.settings.path.as_deref() {
            Some(path) => path,
            None => return Event::SelectPort(SelectPortEvent { host: host.clone() }),
        };

        if utils::wait_for_port(path) {
            Event::SelectPort(SelectPortEvent { host: host.clone() })
        } else {
            Event::PortReady(PortReadyEvent { host: host.clone() })
        }
    }
}

// SelectPortState =============================================================

#[derive(Debug)]
pub(crate) struct SelectPortState {}
impl Runnable for SelectPortState {
    fn run(&mut self, host: &HostContext) -> Event {
        info!("=> SelectPort");
        match utils::select_port() {
            Some(path) => {
                let mut host = host.clone();
                host.settings.path = Some(path);
                Event::PortReady(PortReadyEvent { host })
            }
            None => Event::SelectPort(SelectPortEvent { host: host.clone() }),
        }
    }
}

// ServiceState ================================================================

/// Opens the port and ticks the gateway over it until the link breaks or a
/// shutdown is requested.
#[derive(Debug)]
pub(crate) struct ServiceState {}
impl Runnable for ServiceState {
    fn run(&mut self, host: &HostContext) -> Event {
        info!("=> Service");

        let served = utils::open_and_setup_port(&host.settings).and_then(|port| serve(port, host));
        match served {
            Ok(()) => Event::Done(DoneEvent {
                host: host.clone(),
                with_errors: false,
            }),
            Err(err) => {
                warn!("serial port: {}", err);
                Event::PortError(PortErrorEvent { host: host.clone() })
            }
        }
    }
}

// Done State ==================================================================

#[derive(Debug, Copy, Clone)]
pub(crate) struct DoneState {
    pub with_error: bool,
    pub should_exit: bool,
}
impl Runnable for DoneState {
    fn run(&mut self, host: &HostContext) -> Event {
        info!(
            "=> Done with{}errors",
            if self.with_error { " " } else { " no " }
        );
        Event::Exit(ExitEvent {
            host: host.clone(),
            with_error: self.with_error,
        })
    }
}

// =============================================================================
// Private stuff
// =============================================================================

fn serve(port: Box<dyn SerialPort>, host: &HostContext) -> Result<(), serialport::Error> {
    let settings = &host.settings;
    let transport = SerialTransport::start(port, HOST_RECEIVE_BUFFER)?;
    let reset = transport.reset_line()?;
    let health = transport.health();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let session = ModuleSession::new(
        RADIO_DEVICE,
        settings,
        Box::new(transport),
        Box::new(reset),
        Arc::clone(&clock),
    );
    let client = ConsoleClient::new(settings.config_entries.clone());
    let mut gateway = Gateway::new(settings, clock, vec![session], client);

    let interval = Duration::from_millis(settings.tick_interval_ms);
    while host.is_running() {
        if !health.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(serialport::Error::new(
                serialport::ErrorKind::NoDevice,
                "the serial link to the radio module broke",
            ));
        }
        gateway.tick();
        thread::sleep(interval);
    }
    info!("{} peer(s) connected at shutdown", gateway.peers().len());
    Ok(())
}
