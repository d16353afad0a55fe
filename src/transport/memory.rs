//! In-memory transport: one side is the link, the other side is a script
//! playing the radio module.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ResetLine, Transport};

#[derive(Debug, Default)]
struct Pipe {
    to_host: VecDeque<u8>,
    from_host: Vec<u8>,
    reset_asserted: bool,
    reset_pulses: usize,
}

/// A cloneable loopback transport. All clones share the same pipe, so a test
/// keeps one clone to inject module output and inspect what the link sent.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    pipe: Arc<Mutex<Pipe>>,
}
impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `data` available to the next `get_bytes` calls, as if the module
    /// had sent it.
    pub fn inject(&self, data: &[u8]) {
        self.lock().to_host.extend(data.iter().copied());
    }

    /// Takes everything the link sent so far.
    pub fn take_sent(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().from_host)
    }

    /// The number of injected bytes the link has not read yet.
    pub fn pending(&self) -> usize {
        self.lock().to_host.len()
    }

    /// A reset line whose state can be observed through this transport.
    pub fn reset_line(&self) -> MemoryResetLine {
        MemoryResetLine {
            pipe: Arc::clone(&self.pipe),
        }
    }

    pub fn reset_asserted(&self) -> bool {
        self.lock().reset_asserted
    }

    /// How many times the reset line went from released to asserted.
    pub fn reset_pulses(&self) -> usize {
        self.lock().reset_pulses
    }

    fn lock(&self) -> MutexGuard<'_, Pipe> {
        lock_pipe(&self.pipe)
    }
}
impl Transport for MemoryTransport {
    fn put_bytes(&mut self, _channel: u8, data: &[u8]) -> usize {
        self.lock().from_host.extend_from_slice(data);
        data.len()
    }

    fn get_bytes(&mut self, _channel: u8, buffer: &mut [u8]) -> usize {
        let mut pipe = self.lock();
        let count = buffer.len().min(pipe.to_host.len());
        for (slot, byte) in buffer.iter_mut().zip(pipe.to_host.drain(..count)) {
            *slot = byte;
        }
        count
    }
}

#[derive(Debug, Clone)]
pub struct MemoryResetLine {
    pipe: Arc<Mutex<Pipe>>,
}
impl ResetLine for MemoryResetLine {
    fn assert_reset(&mut self) {
        let mut pipe = lock_pipe(&self.pipe);
        if !pipe.reset_asserted {
            pipe.reset_pulses += 1;
        }
        pipe.reset_asserted = true;
    }

    fn release_reset(&mut self) {
        lock_pipe(&self.pipe).reset_asserted = false;
    }
}

fn lock_pipe(pipe: &Mutex<Pipe>) -> MutexGuard<'_, Pipe> {
    // A panicking test thread must not take the other side down with it.
    pipe.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn injected_bytes_are_read_in_order() {
    let script = MemoryTransport::new();
    let mut link = script.clone();
    script.inject(b"\r\nOK\r\n");

    let mut buffer = [0u8; 4];
    assert_eq!(link.get_bytes(0, &mut buffer), 4);
    assert_eq!(&buffer, b"\r\nOK");
    assert_eq!(script.pending(), 2);
    assert_eq!(link.get_bytes(0, &mut buffer), 2);
    assert_eq!(link.get_bytes(0, &mut buffer), 0);
}

#[test]
fn sent_bytes_are_collected() {
    let script = MemoryTransport::new();
    let mut link = script.clone();
    assert_eq!(link.put_bytes(0, b"AT"), 2);
    link.put_bytes(0, b"\r");
    assert_eq!(script.take_sent(), b"AT\r".to_vec());
    assert!(script.take_sent().is_empty());
}

#[test]
fn reset_line_is_observable() {
    let script = MemoryTransport::new();
    let mut reset = script.reset_line();
    reset.assert_reset();
    reset.assert_reset();
    assert!(script.reset_asserted());
    reset.release_reset();
    assert!(!script.reset_asserted());
    assert_eq!(script.reset_pulses(), 1);
}
