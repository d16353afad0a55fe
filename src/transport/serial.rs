//! Serial port transport.
//!
//! The module writes whenever it wants, while the link core only polls once
//! per tick. A reader thread therefore drains the port into a [`ByteRing`] as
//! soon as bytes show up, playing the part of the UART receive interrupt. The
//! ring is shared behind a mutex: holding the guard is the critical section,
//! released on every path when it goes out of scope.

use std::{
    io::{self, Read, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, trace, warn};
use serialport::SerialPort;

use super::{ResetLine, Transport};
use crate::ring::ByteRing;

// =============================================================================
// Public Interface
// =============================================================================

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    received: Arc<Mutex<ByteRing>>,
    healthy: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}
impl SerialTransport {
    /// Takes over an open port and starts the reader thread. Received bytes
    /// that do not fit in `buffer_size` are dropped.
    pub fn start(port: Box<dyn SerialPort>, buffer_size: usize) -> Result<Self, serialport::Error> {
        let reader_port = port.try_clone()?;
        let received = Arc::new(Mutex::new(ByteRing::new(buffer_size)));
        let healthy = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));

        let reader = {
            let received = Arc::clone(&received);
            let healthy = Arc::clone(&healthy);
            let stop = Arc::clone(&stop);
            thread::spawn(move || read_loop(reader_port, received, healthy, stop))
        };

        Ok(SerialTransport {
            port,
            received,
            healthy,
            stop,
            reader: Some(reader),
        })
    }

    /// `false` once reading or writing the port failed. The link never
    /// recovers from that; the port has to be opened again.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// A shared view of the health flag, for whoever supervises the link.
    pub fn health(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.healthy)
    }

    /// A reset line driven through the DTR signal of the same port.
    pub fn reset_line(&self) -> Result<DtrResetLine, serialport::Error> {
        Ok(DtrResetLine {
            port: self.port.try_clone()?,
        })
    }
}
impl Transport for SerialTransport {
    fn put_bytes(&mut self, _channel: u8, data: &[u8]) -> usize {
        match self.port.write(data) {
            Ok(count) => {
                trace!("sent {} of {} bytes", count, data.len());
                count
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => 0,
            Err(ref e) => {
                warn!("serial write failed: {}", e);
                self.healthy.store(false, Ordering::SeqCst);
                0
            }
        }
    }

    fn get_bytes(&mut self, _channel: u8, buffer: &mut [u8]) -> usize {
        lock_ring(&self.received).read(buffer)
    }
}
impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("serial reader thread panicked");
            }
        }
    }
}

/// Drives the module reset pin with the DTR modem line.
pub struct DtrResetLine {
    port: Box<dyn SerialPort>,
}
impl ResetLine for DtrResetLine {
    fn assert_reset(&mut self) {
        if let Err(e) = self.port.write_data_terminal_ready(true) {
            debug!("failed to assert DTR: {}", e);
        }
    }

    fn release_reset(&mut self) {
        if let Err(e) = self.port.write_data_terminal_ready(false) {
            debug!("failed to release DTR: {}", e);
        }
    }
}

// =============================================================================
// Private stuff
// =============================================================================

fn lock_ring(ring: &Mutex<ByteRing>) -> MutexGuard<'_, ByteRing> {
    ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_loop(
    mut port: Box<dyn SerialPort>,
    received: Arc<Mutex<ByteRing>>,
    healthy: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
) {
    let mut chunk = [0u8; 256];
    while !stop.load(Ordering::SeqCst) {
        // Only read what is already there so that `read` never blocks.
        match port.bytes_to_read() {
            Ok(0) => thread::sleep(Duration::from_millis(1)),
            Ok(available) => {
                let wanted = std::cmp::min(available as usize, chunk.len());
                match port.read(&mut chunk[..wanted]) {
                    Ok(count) => {
                        let accepted = lock_ring(&received).try_write(&chunk[..count]);
                        if accepted < count {
                            warn!("receive buffer full, dropped {} bytes", count - accepted);
                        }
                        trace!("received {} bytes", count);
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {}
                    Err(ref e) => {
                        info!("error: {:?}", e.to_string());
                        healthy.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
            Err(ref e) => {
                info!("error: {:?}", e.to_string());
                healthy.store(false, Ordering::SeqCst);
                break;
            }
        }
    }
    debug!("serial reader thread stopped");
}
