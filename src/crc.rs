//! Stateful CRC32 accumulator for the framed application protocol.
//!
//! The radio firmware feeds frames through the CRC peripheral of its MCU
//! (initial value all ones, input and output reflected, no final XOR). On the
//! host the same algorithm is the catalogued `CRC-32/JAMCRC`, computed by the
//! `crc` crate. Because there is no final XOR, running the accumulator over a
//! frame followed by its own little endian checksum yields zero.

use crc::{Crc, CRC_32_JAMCRC};

/// Running CRC computation over consecutive chunks.
pub trait CrcAccumulator {
    /// Starts a new computation.
    fn reset(&mut self);
    /// Feeds `data` and returns the CRC of everything fed since the last reset.
    fn accumulate(&mut self, data: &[u8]) -> u32;
}

static JAMCRC: Crc<u32> = Crc::<u32>::new(&CRC_32_JAMCRC);

/// Software rendition of the peripheral, backed by the `crc` crate.
///
/// Frames are small, so the bytes fed since the last reset are kept and the
/// running value is recomputed over them on each call.
#[derive(Debug, Clone, Default)]
pub struct Crc32 {
    fed: Vec<u8>,
}
impl Crc32 {
    pub fn new() -> Self {
        Crc32 { fed: Vec::new() }
    }

    /// One-shot checksum of `data`.
    pub fn checksum(data: &[u8]) -> u32 {
        JAMCRC.checksum(data)
    }
}
impl CrcAccumulator for Crc32 {
    fn reset(&mut self) {
        self.fed.clear();
    }

    fn accumulate(&mut self, data: &[u8]) -> u32 {
        self.fed.extend_from_slice(data);
        JAMCRC.checksum(&self.fed)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn matches_the_catalogue_check_value() {
    let mut crc = Crc32::new();
    assert_eq!(crc.accumulate(b"123456789"), 0x340b_c6d9);
}

#[test]
fn accumulates_across_chunks_until_reset() {
    let mut crc = Crc32::new();
    crc.accumulate(b"1234");
    assert_eq!(crc.accumulate(b"56789"), Crc32::checksum(b"123456789"));

    crc.reset();
    assert_eq!(crc.accumulate(b"1234"), Crc32::checksum(b"1234"));
}

#[test]
fn residue_over_own_checksum_is_zero() {
    let mut crc = Crc32::new();
    let sum = crc.accumulate(b"\x04\x01\x00\x02\x00\x04\x00\x2a\x00\x00\x00");
    assert_eq!(crc.accumulate(&sum.to_le_bytes()), 0);
}
