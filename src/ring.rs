//! Fixed capacity circular byte buffer.
//!
//! Every layer of the radio link reads its input out of a [`ByteRing`]. Bytes
//! are appended at the write index by the transport and only leave the ring
//! when a parser has recognized a complete unit (an AT response, a MUX frame)
//! and explicitly drains it. Parsers look at the buffered bytes through an
//! offset relative to the read index, which lets them start over from the same
//! point when a unit is still incomplete.
//!
//! ```text
//!            read_idx              write_idx
//!               |                     |
//!   [ . . . . . x x x x x x x x x x x . . . . ]
//!               '---- available ------'
//! ```
//!
//! The buffer never grows. Writes beyond the free space are truncated and the
//! caller learns about it only through the returned count.

use std::cmp::min;

// =============================================================================
// Public Interface
// =============================================================================

/// A circular byte buffer with a fixed capacity.
#[derive(Debug, Clone)]
pub struct ByteRing {
    buffer: Box<[u8]>,
    read_idx: usize,
    write_idx: usize,
    free: usize,
}

impl ByteRing {
    /// Creates an empty ring able to hold `capacity` bytes.
    ///
    /// # Panics
    ///
    /// A ring with no capacity is a configuration error and panics.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "a byte ring needs a non-zero capacity");
        ByteRing {
            buffer: vec![0; capacity].into_boxed_slice(),
            read_idx: 0,
            write_idx: 0,
            free: capacity,
        }
    }

    /// The total number of bytes the ring can hold.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// The number of bytes currently stored.
    pub fn available(&self) -> usize {
        self.capacity() - self.free
    }

    /// The number of bytes that can still be written.
    pub fn free_space(&self) -> usize {
        self.free
    }

    pub fn is_empty(&self) -> bool {
        self.free == self.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.free == 0
    }

    /// Appends as many bytes of `data` as the free space allows, wrapping
    /// around the end of the buffer. Returns the number of bytes accepted.
    pub fn try_write(&mut self, data: &[u8]) -> usize {
        let count = min(data.len(), self.free);
        let first = min(count, self.capacity() - self.write_idx);

        self.buffer[self.write_idx..self.write_idx + first].copy_from_slice(&data[..first]);
        self.buffer[..count - first].copy_from_slice(&data[first..count]);

        self.commit_write(count);
        count
    }

    /// Lets `producer` write directly into the contiguous free region that
    /// starts at the write index, then commits the number of bytes it reports.
    ///
    /// The region stops at the physical end of the buffer, so a producer may be
    /// offered less than [`free_space`](Self::free_space) bytes. Returns the
    /// number of bytes committed.
    pub fn fill_with<F>(&mut self, producer: F) -> usize
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let space = min(self.capacity() - self.write_idx, self.free);
        if space == 0 {
            return 0;
        }

        let start = self.write_idx;
        let written = min(producer(&mut self.buffer[start..start + space]), space);
        self.commit_write(written);
        written
    }

    /// Returns the byte stored `offset` positions after the read index.
    pub fn peek(&self, offset: usize) -> Option<u8> {
        if offset < self.available() {
            Some(self.buffer[self.physical(offset)])
        } else {
            None
        }
    }

    /// Copies stored bytes, starting `offset` positions after the read index,
    /// into `dest` without consuming them. Returns the number of bytes copied.
    pub fn copy_out(&self, offset: usize, dest: &mut [u8]) -> usize {
        let count = min(dest.len(), self.available().saturating_sub(offset));
        if count == 0 {
            return 0;
        }

        let start = self.physical(offset);
        let first = min(count, self.capacity() - start);
        dest[..first].copy_from_slice(&self.buffer[start..start + first]);
        dest[first..count].copy_from_slice(&self.buffer[..count - first]);
        count
    }

    /// Commits a parsed prefix: consumes the `offset` bytes in front of the
    /// parsed unit and the `count` bytes of the unit itself. Never consumes
    /// more than what is stored. Returns the number of bytes released.
    pub fn drain(&mut self, offset: usize, count: usize) -> usize {
        let released = min(offset.saturating_add(count), self.available());
        self.read_idx = (self.read_idx + released) % self.capacity();
        self.free += released;
        released
    }

    /// Copies the oldest bytes into `dest` and consumes them.
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        let count = self.copy_out(0, dest);
        self.drain(0, count)
    }

    /// Discards everything stored in the ring.
    pub fn clear(&mut self) {
        self.read_idx = self.write_idx;
        self.free = self.capacity();
    }

    fn physical(&self, offset: usize) -> usize {
        (self.read_idx + offset) % self.capacity()
    }

    fn commit_write(&mut self, count: usize) {
        self.write_idx = (self.write_idx + count) % self.capacity();
        self.free -= count;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
