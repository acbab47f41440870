// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Byte-field unpacking with struct-style format strings.
//!
//! Format characters: `h` signed 16-bit, `H` unsigned 16-bit, `i` signed
//! 32-bit, `I` unsigned 32-bit. An optional leading `>`/`!` (big-endian),
//! `<` (little-endian) or `@` (native) selects the byte order; without one
//! native order is used.

use crate::error::{Result, WatcherError};

/// Byte order of the packed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
    Native,
}

impl ByteOrder {
    /// Parse a byte-order selector character.
    pub fn from_selector(c: char) -> Option<Self> {
        match c {
            '>' | '!' => Some(Self::Big),
            '<' => Some(Self::Little),
            '@' => Some(Self::Native),
            _ => None,
        }
    }

    fn is_little(&self) -> bool {
        match self {
            Self::Big => false,
            Self::Little => true,
            Self::Native => cfg!(target_endian = "little"),
        }
    }
}

/// Width of a field for a format character.
pub fn field_width(format: char) -> Result<usize> {
    match format {
        'h' | 'H' => Ok(2),
        'i' | 'I' => Ok(4),
        other => Err(WatcherError::InvalidFormat(other)),
    }
}

/// Unsigned 16-bit, most-significant byte first.
pub fn raw_u16(bytes: [u8; 2]) -> i64 {
    ((bytes[0] as i64) << 8) | bytes[1] as i64
}

/// Signed 16-bit, most-significant byte first.
pub fn raw_i16(bytes: [u8; 2]) -> i64 {
    let x = raw_u16(bytes);
    if (x >> 15) & 1 == 1 {
        -(((x ^ 0x7FFF) & 0x7FFF) + 1)
    } else {
        x
    }
}

/// Unsigned 32-bit, most-significant byte first.
pub fn raw_u32(bytes: [u8; 4]) -> i64 {
    ((bytes[0] as i64) << 24)
        | ((bytes[1] as i64) << 16)
        | ((bytes[2] as i64) << 8)
        | bytes[3] as i64
}

/// Signed 32-bit, most-significant byte first.
pub fn raw_i32(bytes: [u8; 4]) -> i64 {
    let x = raw_u32(bytes);
    if (x >> 31) & 1 == 1 {
        -(((x ^ 0x7FFF_FFFF) & 0x7FFF_FFFF) + 1)
    } else {
        x
    }
}

/// Decode a single field. `value` must be exactly as wide as the field.
pub fn unpack_single(format: char, value: &[u8], order: ByteOrder) -> Result<i64> {
    let expected = field_width(format)?;
    if value.len() != expected {
        return Err(WatcherError::FormatLengthMismatch {
            expected,
            actual: value.len(),
        });
    }

    let mut bytes = value.to_vec();
    if order.is_little() {
        bytes.reverse();
    }

    let decoded = match format {
        'h' => raw_i16([bytes[0], bytes[1]]),
        'H' => raw_u16([bytes[0], bytes[1]]),
        'i' => raw_i32([bytes[0], bytes[1], bytes[2], bytes[3]]),
        _ => raw_u32([bytes[0], bytes[1], bytes[2], bytes[3]]),
    };

    Ok(decoded)
}

/// Total byte length consumed by a format string.
pub fn calc_size(format: &str) -> Result<usize> {
    let (_, fields) = split_format(format);
    fields.chars().map(field_width).sum()
}

/// Decode every field of `format` from `values`, in format-string order.
///
/// The summed field widths must equal `values.len()` exactly.
pub fn unpack(format: &str, values: &[u8]) -> Result<Vec<i64>> {
    let expected = calc_size(format)?;
    if expected != values.len() {
        return Err(WatcherError::FormatLengthMismatch {
            expected,
            actual: values.len(),
        });
    }

    let (order, fields) = split_format(format);
    let mut result = Vec::with_capacity(fields.len());
    let mut offset = 0;

    for c in fields.chars() {
        let width = field_width(c)?;
        result.push(unpack_single(c, &values[offset..offset + width], order)?);
        offset += width;
    }

    Ok(result)
}

fn split_format(format: &str) -> (ByteOrder, &str) {
    let mut chars = format.chars();
    match chars.next().and_then(ByteOrder::from_selector) {
        Some(order) => (order, chars.as_str()),
        None => (ByteOrder::Native, format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_u16() {
        assert_eq!(raw_u16([0x04, 0xEC]), 1260);
        assert_eq!(raw_u16([0xFF, 0xFF]), 65535);
        for b in [[0x00, 0x01], [0x80, 0x00], [0x12, 0x34]] {
            assert_eq!(raw_u16(b), ((b[0] as i64) << 8) | b[1] as i64);
        }
    }

    #[test]
    fn test_raw_i16_twos_complement() {
        assert_eq!(raw_i16([0xFF, 0xFF]), -1);
        assert_eq!(raw_i16([0x80, 0x00]), -32768);
        assert_eq!(raw_i16([0x7F, 0xFF]), 32767);
        assert_eq!(raw_i16([0xFF, 0x38]), -200);
    }

    #[test]
    fn test_raw_32() {
        assert_eq!(raw_u32([0x00, 0x01, 0x86, 0xA0]), 100_000);
        assert_eq!(raw_u32([0xFF, 0xFF, 0xFF, 0xFF]), 4_294_967_295);
        assert_eq!(raw_i32([0xFF, 0xFF, 0xFF, 0xFF]), -1);
        assert_eq!(raw_i32([0x80, 0x00, 0x00, 0x00]), -2_147_483_648);
    }

    #[test]
    fn test_unpack_big_endian() {
        assert_eq!(unpack("!H", &[0x04, 0xEC]).unwrap(), vec![1260]);
        assert_eq!(unpack(">h", &[0xFF, 0xFE]).unwrap(), vec![-2]);
        assert_eq!(unpack("!I", &[0x00, 0x00, 0x30, 0x39]).unwrap(), vec![12345]);
    }

    #[test]
    fn test_unpack_little_endian() {
        assert_eq!(unpack("<H", &[0xEC, 0x04]).unwrap(), vec![1260]);
        assert_eq!(unpack("<I", &[0x39, 0x30, 0x00, 0x00]).unwrap(), vec![12345]);
        assert_eq!(unpack("<h", &[0xFF, 0xFF]).unwrap(), vec![-1]);
    }

    #[test]
    fn test_unpack_native_order() {
        let native = 0x1234u16.to_ne_bytes();
        assert_eq!(unpack("H", &native).unwrap(), vec![0x1234]);
        assert_eq!(unpack("@H", &native).unwrap(), vec![0x1234]);
    }

    #[test]
    fn test_unpack_mixed_fields() {
        let bytes = [0x09, 0x63, 0x04, 0xEC, 0x00, 0x00, 0x01, 0xF4];
        let values = unpack("!HHI", &bytes).unwrap();
        assert_eq!(values, vec![0x0963, 1260, 500]);
    }

    #[test]
    fn test_length_mismatch() {
        let err = unpack("!H", &[0x01, 0x02, 0x03]).unwrap_err();
        assert!(matches!(
            err,
            WatcherError::FormatLengthMismatch {
                expected: 2,
                actual: 3
            }
        ));

        let err = unpack("!I", &[0x01, 0x02]).unwrap_err();
        assert!(matches!(err, WatcherError::FormatLengthMismatch { .. }));

        let err = unpack_single('h', &[0x01], ByteOrder::Big).unwrap_err();
        assert!(matches!(err, WatcherError::FormatLengthMismatch { .. }));
    }

    #[test]
    fn test_invalid_format() {
        assert!(matches!(
            unpack("!Q", &[0; 8]),
            Err(WatcherError::InvalidFormat('Q'))
        ));
        assert!(matches!(
            unpack_single('x', &[0, 0], ByteOrder::Big),
            Err(WatcherError::InvalidFormat('x'))
        ));
    }

    #[test]
    fn test_calc_size() {
        assert_eq!(calc_size("!HHIHH").unwrap(), 12);
        assert_eq!(calc_size("").unwrap(), 0);
        assert_eq!(calc_size("<").unwrap(), 0);
    }
}
