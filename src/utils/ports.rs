//! Serial port discovery, selection and opening.

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use serialport::{available_ports, SerialPort, SerialPortType};

use std::{
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::Duration,
};

use crate::{utils::poll_escape, Settings};

const SPINNER: &[&str] = &["⠋", "⠙", "⠚", "⠞", "⠖", "⠦", "⠴", "⠲", "⠳", "⠓"];

//==============================================================================
// Public Interface
//==============================================================================

/// Waits until at least one serial port shows up, then lets the user pick
/// one. Returns `None` when the user cancelled the selection, so the caller
/// can refresh the list.
pub(crate) fn select_port() -> Option<String> {
    let mut found_ports;
    let mut attempt: usize = 1;
    let waiting_period: u64 = 1;

    let pb = spinner();
    let term = Term::stdout();
    let _ = term.hide_cursor();
    loop {
        found_ports = enumerate_serial_ports();
        if !found_ports.is_empty() {
            pb.finish_with_message("Select the port of the radio module:");
            break;
        }
        pb.set_message(format!(
            "[{:03}s] ⌛ Waiting for a serial adapter to be connected...",
            style(attempt as u64 * waiting_period).dim(),
        ));
        attempt += 1;
        thread::sleep(Duration::from_secs(waiting_period));
    }
    let _ = term.show_cursor();

    let selection = select_port_interactive(&found_ports);
    match &selection {
        Some(path) => {
            pb.finish_with_message(format!("👍 Serial port {} is ready", style(path).green()));
        }
        None => {
            pb.finish_with_message("❌ Selection canceled -> refreshing...");
        }
    }
    selection
}

/// Waits for the device at `path` to show up on the system. A side thread
/// watches the keyboard so the user can give up with `Esc`.
///
/// Returns `true` when the wait was cancelled.
pub(crate) fn wait_for_port(path: &str) -> bool {
    let pb = spinner();
    let waiting_period: u64 = 2;
    let mut attempt: u64 = 1;

    // The keyboard thread reports `Esc` on `cancel`; the main thread tells it
    // to stop on `done` once the port is there.
    let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let keyboard = thread::spawn(move || loop {
        if done_rx.try_recv().is_ok() {
            break;
        }
        if let Ok(true) = poll_escape(Duration::from_millis(500)) {
            let _ = cancel_tx.send(());
            break;
        }
    });

    let mut cancelled = false;
    loop {
        let found_ports = enumerate_serial_ports();
        if found_ports.iter().any(|port| port.starts_with(path)) {
            let _ = done_tx.send(());
            pb.finish_with_message(format!("👍 Serial port {} is ready", style(path).green()));
            break;
        }

        let waited = attempt * waiting_period;
        pb.set_message(format!(
            "[{:03}s {}] ⏳ Waiting for {} to be ready (ESC to cancel)...",
            style(waited).dim(),
            found_ports.len(),
            style(path).cyan()
        ));

        match cancel_rx.recv_timeout(Duration::from_secs(waiting_period)) {
            Ok(()) => {
                pb.finish_with_message(format!(
                    "❌ Waiting on port {} canceled after {} seconds",
                    style(path).cyan(),
                    style(waited).dim()
                ));
                cancelled = true;
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                cancelled = true;
                break;
            }
        }
        attempt += 1;
    }

    if keyboard.join().is_err() {
        warn!("the keyboard watcher panicked");
    }
    cancelled
}

/// Opens the port configured in `settings`, trying a few times since a
/// freshly plugged adapter may need a moment.
pub(crate) fn open_and_setup_port(
    settings: &Settings,
) -> Result<Box<dyn SerialPort>, serialport::Error> {
    use retry::{delay, retry_with_index};

    let path = settings.path.clone().ok_or_else(|| {
        serialport::Error::new(serialport::ErrorKind::InvalidInput, "no serial port path was set")
    })?;

    let result = retry_with_index(delay::Fixed::from_millis(1000).take(4), |index| {
        debug!("opening {} (attempt {})", path, index);
        serialport::new(&path, settings.baud_rate)
            .data_bits(settings.data_bits)
            .stop_bits(settings.stop_bits)
            .parity(settings.parity)
            .flow_control(settings.flow_control)
            .timeout(Duration::from_millis(10))
            .open()
    });

    match result {
        Ok(mut port) => {
            port.set_baud_rate(settings.baud_rate)?;
            port.set_data_bits(settings.data_bits)?;
            port.set_stop_bits(settings.stop_bits)?;
            port.set_parity(settings.parity)?;
            port.set_flow_control(settings.flow_control)?;

            let baud_rate = port.baud_rate()?;
            info!(
                "Connected to {} at {} baud",
                port.name().unwrap_or_else(|| path.clone()),
                baud_rate
            );
            debug!("data_bits    : {:?}", port.data_bits()?);
            debug!("stop_bits    : {:?}", port.stop_bits()?);
            debug!("parity       : {:?}", port.parity()?);
            debug!("flow control : {:?}", port.flow_control()?);

            if baud_rate != settings.baud_rate {
                return Err(serialport::Error::new(
                    serialport::ErrorKind::InvalidInput,
                    format!("the port refused the baud rate {}", settings.baud_rate),
                ));
            }
            Ok(port)
        }
        Err(retry::Error::Operation { error, total_delay, tries }) => {
            info!(
                "Failed to open the port after {:?} and {} tries: {}",
                total_delay, tries, error,
            );
            Err(error)
        }
        Err(retry::Error::Internal(reason)) => {
            info!("Internal retry error while opening port: {}", reason);
            Err(serialport::Error::new(
                serialport::ErrorKind::Unknown,
                "internal error while retrying to open the port",
            ))
        }
    }
}

//==============================================================================
// Private stuff
//==============================================================================

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(120);
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(SPINNER)
            .template("[BM] {spinner:.blue} {msg}"),
    );
    pb
}

/// Lists the serial ports of the system. USB adapters are described with
/// their manufacturer and product, after a `:` separator.
fn enumerate_serial_ports() -> Vec<String> {
    match available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|p| match p.port_type {
                SerialPortType::UsbPort(info) => format!(
                    "{}: ({} / {})",
                    p.port_name,
                    info.manufacturer.as_deref().unwrap_or(""),
                    info.product.as_deref().unwrap_or("")
                ),
                _ => p.port_name,
            })
            .collect(),
        Err(e) => {
            info!("error: {}", e);
            vec![]
        }
    }
}

fn select_port_interactive(ports: &[String]) -> Option<String> {
    use dialoguer::{theme::ColorfulTheme, Select};

    let term = Term::buffered_stderr();
    let theme = ColorfulTheme::default();

    let mut select = Select::with_theme(&theme);
    for item in ports {
        select.item(item);
    }

    let selection = match select.default(0).interact_on_opt(&term) {
        Ok(selection) => selection,
        Err(err) => {
            warn!("port selection failed: {}", err);
            None
        }
    };
    selection
        .and_then(|index| ports.get(index))
        .and_then(|item| item.split(':').next())
        .map(String::from)
}
