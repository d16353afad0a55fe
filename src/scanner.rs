//! Non-destructive ASCII and binary field scanning over buffered bytes.
//!
//! All the parsing in the radio link follows the same contract: a scan starts
//! at an offset relative to the oldest buffered byte and either finds what it
//! is looking for ([`Scan::Succeeded`] with the offset just after it), detects
//! a protocol violation ([`Scan::Failed`]), or runs out of buffered bytes
//! before it can decide ([`Scan::Incomplete`]). Nothing is ever consumed by a
//! scan. The caller drains the ring once a whole logical unit has been
//! recognized, and simply scans again from the same offset on the next tick
//! when more bytes have arrived.
//!
//! The functions are generic over [`ByteSource`], implemented for the receive
//! [`ByteRing`] and for plain byte slices (e.g. a MUX payload already copied
//! out of the ring).
//!
//! **Example**
//!
//! ```ignore
//! match scanner::read_integer(&ring, 0, b",", 10) {
//!     Scan::Succeeded((value, offset)) => ring.drain(0, offset + 1),
//!     Scan::Incomplete => return, // try again on the next tick
//!     Scan::Failed => ring.clear(),
//! };
//! ```

use crate::ring::ByteRing;

// =============================================================================
// Public Interface
// =============================================================================

/// Outcome of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan<T> {
    /// Not enough bytes are buffered to decide; retry with more data.
    Incomplete,
    /// The buffered bytes violate the expected format.
    Failed,
    /// The scan completed.
    Succeeded(T),
}

/// Random access to a sequence of buffered bytes.
pub trait ByteSource {
    /// The number of bytes that can be scanned.
    fn buffered(&self) -> usize;
    /// The byte at `index`, which must be lower than `buffered()`.
    fn byte_at(&self, index: usize) -> u8;
}

impl ByteSource for ByteRing {
    fn buffered(&self) -> usize {
        self.available()
    }

    fn byte_at(&self, index: usize) -> u8 {
        self.peek(index).unwrap_or_default()
    }
}

impl ByteSource for [u8] {
    fn buffered(&self) -> usize {
        self.len()
    }

    fn byte_at(&self, index: usize) -> u8 {
        self[index]
    }
}

impl ByteSource for Vec<u8> {
    fn buffered(&self) -> usize {
        self.len()
    }

    fn byte_at(&self, index: usize) -> u8 {
        self[index]
    }
}

/// Parses a decimal integer, optionally preceded by a single minus sign.
///
/// The scan stops successfully on the first byte found in `delimiters`, or
/// after `max_len` bytes. The returned offset points at the delimiter (it is
/// not consumed), or just after the last digit when `max_len` was reached.
/// Overflow wraps silently.
pub fn read_integer<S>(
    src: &S,
    offset: usize,
    delimiters: &[u8],
    max_len: usize,
) -> Scan<(i32, usize)>
where
    S: ByteSource + ?Sized,
{
    scan_number(src, offset, delimiters, max_len, true)
}

/// Same as [`read_integer`] but a minus sign is a format violation.
pub fn read_unsigned<S>(
    src: &S,
    offset: usize,
    delimiters: &[u8],
    max_len: usize,
) -> Scan<(u32, usize)>
where
    S: ByteSource + ?Sized,
{
    match scan_number(src, offset, delimiters, max_len, false) {
        Scan::Succeeded((value, end)) => Scan::Succeeded((value as u32, end)),
        Scan::Incomplete => Scan::Incomplete,
        Scan::Failed => Scan::Failed,
    }
}

/// Copies bytes up to the first delimiter, or up to `max_len` bytes.
///
/// Mirrors [`read_integer`] for free text fields: the returned offset points at
/// the delimiter. Any byte is accepted as content.
pub fn read_string<S>(
    src: &S,
    offset: usize,
    delimiters: &[u8],
    max_len: usize,
) -> Scan<(Vec<u8>, usize)>
where
    S: ByteSource + ?Sized,
{
    let len = src.buffered().saturating_sub(offset);
    let mut text = Vec::new();
    for i in 0..len {
        if i >= max_len {
            return Scan::Succeeded((text, offset + i));
        }
        let byte = src.byte_at(offset + i);
        if delimiters.contains(&byte) {
            return Scan::Succeeded((text, offset + i));
        }
        text.push(byte);
    }
    if len >= max_len {
        Scan::Succeeded((text, offset + len))
    } else {
        Scan::Incomplete
    }
}

/// Looks for `literal` anywhere at or after `offset`.
///
/// On success the offset points just past the match. A stream can always
/// deliver the literal later, so a search that found nothing yet is
/// `Incomplete`, never `Failed`.
pub fn find_literal<S>(src: &S, offset: usize, literal: &[u8]) -> Scan<usize>
where
    S: ByteSource + ?Sized,
{
    let buffered = src.buffered();
    if literal.is_empty() {
        return Scan::Succeeded(offset);
    }

    let mut start = offset;
    while start < buffered {
        let window = (buffered - start).min(literal.len());
        let matched = (0..window).all(|i| src.byte_at(start + i) == literal[i]);
        if matched {
            if window == literal.len() {
                return Scan::Succeeded(start + window);
            }
            // A prefix of the literal sits at the very end of the buffer.
            return Scan::Incomplete;
        }
        start += 1;
    }
    Scan::Incomplete
}

/// Matches `literal` byte by byte starting exactly at `offset`, skipping any
/// byte from `ignore` that appears in between.
pub fn compare_literal<S>(src: &S, offset: usize, literal: &[u8], ignore: &[u8]) -> Scan<usize>
where
    S: ByteSource + ?Sized,
{
    let buffered = src.buffered();
    let mut position = offset;
    let mut matched = 0;
    while matched < literal.len() {
        if position >= buffered {
            return Scan::Incomplete;
        }
        let byte = src.byte_at(position);
        if byte == literal[matched] {
            matched += 1;
        } else if !ignore.contains(&byte) {
            return Scan::Failed;
        }
        position += 1;
    }
    Scan::Succeeded(position)
}

/// Succeeds when at least `count` bytes are buffered after `offset`.
pub fn check_length<S>(src: &S, offset: usize, count: usize) -> Scan<usize>
where
    S: ByteSource + ?Sized,
{
    if src.buffered().saturating_sub(offset) >= count {
        Scan::Succeeded(offset + count)
    } else {
        Scan::Incomplete
    }
}

/// Copies raw bytes starting at `offset` into `dest`. Returns the number of
/// bytes copied.
pub fn copy_bytes<S>(src: &S, offset: usize, dest: &mut [u8]) -> usize
where
    S: ByteSource + ?Sized,
{
    let count = dest.len().min(src.buffered().saturating_sub(offset));
    for (i, slot) in dest.iter_mut().take(count).enumerate() {
        *slot = src.byte_at(offset + i);
    }
    count
}

/// Renders `value` in `base` (2 to 16) with upper-case digits, left padded
/// with zeros to at least `min_len` digits.
pub fn format_number(value: i64, base: u32, min_len: usize) -> String {
    let base = u64::from(base.max(2).min(16));
    let mut magnitude = value.unsigned_abs();
    let mut digits = Vec::new();
    while magnitude > 0 {
        let digit = (magnitude % base) as u8;
        digits.push(if digit < 10 { b'0' + digit } else { b'A' + digit - 10 });
        magnitude /= base;
    }
    while digits.len() < min_len.max(1) {
        digits.push(b'0');
    }
    if value < 0 {
        digits.push(b'-');
    }
    digits.iter().rev().map(|&b| b as char).collect()
}

/// Decodes two ASCII hex digits, most significant first. A byte that is not a
/// hex digit counts as zero.
pub fn decode_hex_byte(high: u8, low: u8) -> u8 {
    (hex_nibble(high) << 4) | hex_nibble(low)
}

// =============================================================================
// Private stuff
// =============================================================================

fn hex_nibble(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

fn scan_number<S>(
    src: &S,
    offset: usize,
    delimiters: &[u8],
    max_len: usize,
    signed: bool,
) -> Scan<(i32, usize)>
where
    S: ByteSource + ?Sized,
{
    let len = src.buffered().saturating_sub(offset);
    let mut value: i32 = 0;
    let mut negative = false;

    let finish = |value: i32, negative: bool, end: usize| {
        Scan::Succeeded((if negative { value.wrapping_neg() } else { value }, end))
    };

    for i in 0..len {
        if i >= max_len {
            return finish(value, negative, offset + i);
        }
        let byte = src.byte_at(offset + i);
        if delimiters.contains(&byte) {
            return finish(value, negative, offset + i);
        }
        match byte {
            b'0'..=b'9' => {
                value = value.wrapping_mul(10).wrapping_add(i32::from(byte - b'0'));
            }
            b'-' if signed && i == 0 => negative = true,
            _ => return Scan::Failed,
        }
    }

    if len >= max_len {
        finish(value, negative, offset + len)
    } else {
        Scan::Incomplete
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
