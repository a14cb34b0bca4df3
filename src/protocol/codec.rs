//! Bit-field accessors and scalar encodings shared by every message shape
//!
//! All multi-byte integers on the wire are little-endian. Packed words are
//! described by [`Field`] mask/shift pairs rather than struct layouts.

use bytes::{Buf, BufMut, BytesMut};

/// A contiguous bit range inside a 32-bit little-endian word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    mask: u32,
    shift: u32,
}

impl Field {
    /// Bits `low..=high`
    pub const fn range(low: u32, high: u32) -> Self {
        let width = high - low + 1;
        let mask = if width >= 32 { u32::MAX } else { (1u32 << width) - 1 };
        Field { mask, shift: low }
    }

    /// A single bit
    pub const fn bit(n: u32) -> Self {
        Field::range(n, n)
    }

    /// Extracts the field from `word`
    pub const fn get(self, word: u32) -> u32 {
        (word >> self.shift) & self.mask
    }

    /// Returns true when any bit of the field is set
    pub const fn is_set(self, word: u32) -> bool {
        self.get(word) != 0
    }

    /// Places `value` into the field position, truncating excess bits
    pub const fn prep(self, value: u32) -> u32 {
        (value & self.mask) << self.shift
    }
}

/// Clock attribute word (CLOCK_ATTRIBUTES response)
pub mod clock_attr {
    use super::Field;

    pub const RATE_CHANGED_NOTIF: Field = Field::bit(31);
    pub const RATE_CHANGE_REQUESTED_NOTIF: Field = Field::bit(30);
    pub const EXTENDED_NAMES: Field = Field::bit(29);
    pub const PARENT_CLOCK: Field = Field::bit(28);
    pub const GET_PERMISSIONS: Field = Field::bit(1);
    /// Legacy firmware reports the gate state here
    pub const ENABLED: Field = Field::bit(0);
}

/// Permission word (GET_PERMISSIONS response)
pub mod permissions {
    use super::Field;

    pub const STATE_CONTROL_ALLOWED: Field = Field::bit(31);
    pub const PARENT_CONTROL_ALLOWED: Field = Field::bit(30);
    pub const RATE_CONTROL_ALLOWED: Field = Field::bit(29);
}

/// Returned/remaining word of DESCRIBE_RATES replies
pub mod describe_rates {
    use super::Field;

    pub const NUM_RETURNED: Field = Field::range(0, 11);
    /// Set for a (min, max, step) triplet, clear for a discrete list
    pub const RANGE_FORMAT: Field = Field::bit(12);
    pub const NUM_REMAINING: Field = Field::range(16, 31);
}

/// Returned/remaining word of POSSIBLE_PARENTS_GET replies
pub mod possible_parents {
    use super::Field;

    pub const NUM_RETURNED: Field = Field::range(0, 7);
    pub const NUM_REMAINING: Field = Field::range(24, 31);
}

/// Flags word of RATE_SET requests
pub mod rate_set {
    use super::Field;

    pub const ASYNC: Field = Field::bit(0);
    pub const IGNORE_DELAYED_RESPONSE: Field = Field::bit(1);
    pub const ROUND_UP: Field = Field::bit(2);
    pub const ROUND_AUTO: Field = Field::bit(3);
}

/// Configuration words of CONFIG_SET / CONFIG_GET
pub mod config {
    use super::Field;

    /// OEM type of a v2 CONFIG_SET attributes word
    pub const OEM_TYPE_SET: Field = Field::range(16, 23);
    /// Clock state of a CONFIG_SET attributes word
    pub const STATE: Field = Field::range(0, 1);
    /// OEM type of a CONFIG_GET flags word
    pub const OEM_TYPE_GET: Field = Field::range(0, 7);
    /// Gate state in the CONFIG_GET config word
    pub const ENABLED: Field = Field::bit(0);
    /// OEM type meaning "no OEM configuration"
    pub const NULL_OEM_TYPE: u8 = 0;
}

/// Rate notification enable word
pub mod notify {
    use super::Field;

    pub const ENABLE: Field = Field::bit(0);
}

/// Splits a 64-bit rate into its (low, high) 32-bit halves
pub const fn split_rate(rate: u64) -> (u32, u32) {
    (rate as u32, (rate >> 32) as u32)
}

/// Joins (low, high) 32-bit halves back into a 64-bit rate
pub const fn join_rate(low: u32, high: u32) -> u64 {
    low as u64 | (high as u64) << 32
}

/// Writes a 64-bit rate as two little-endian halves
pub fn put_rate(dst: &mut BytesMut, rate: u64) {
    let (low, high) = split_rate(rate);
    dst.put_u32_le(low);
    dst.put_u32_le(high);
}

/// Reads a 64-bit rate stored as two little-endian halves
pub fn get_rate(src: &mut impl Buf) -> u64 {
    let low = src.get_u32_le();
    let high = src.get_u32_le();
    join_rate(low, high)
}

/// Reads the little-endian u32 at `offset`; caller guarantees the length
pub fn u32_at(buf: &[u8], offset: usize) -> u32 {
    let mut src = &buf[offset..offset + 4];
    src.get_u32_le()
}

/// Reads the split 64-bit rate at `offset`; caller guarantees the length
pub fn rate_at(buf: &[u8], offset: usize) -> u64 {
    let mut src = &buf[offset..offset + 8];
    get_rate(&mut src)
}

/// Decodes a NUL-padded fixed-size name, lossily
pub fn decode_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
