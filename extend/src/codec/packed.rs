//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Variable-length integer encoding.
//!
//! Unsigned values are written seven bits at a time, least significant group
//! first, with the high bit of each byte marking a continuation. Signed values
//! are zig-zag mapped first so small negative numbers stay short.

use crate::codec::CodecError;

const MAX_PACKED_LEN: usize = 10;

/// Appends `value` as an unsigned packed integer.
pub fn write_packed_u64(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Appends `value` as a zig-zag packed integer.
pub fn write_packed_i64(out: &mut Vec<u8>, value: i64) {
    write_packed_u64(out, ((value << 1) ^ (value >> 63)) as u64);
}

/// Appends `value` as a zig-zag packed integer.
pub fn write_packed_i32(out: &mut Vec<u8>, value: i32) {
    write_packed_i64(out, i64::from(value));
}

/// Reads an unsigned packed integer, advancing `input` past it.
pub fn read_packed_u64(input: &mut &[u8]) -> Result<u64, CodecError> {
    let mut value = 0u64;
    for position in 0..MAX_PACKED_LEN {
        let Some((&byte, rest)) = input.split_first() else {
            return Err(CodecError::Truncated { needed: 1 });
        };
        *input = rest;
        let shift = position * 7;
        if shift == 63 && byte > 1 {
            return Err(CodecError::MalformedInteger);
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(CodecError::MalformedInteger)
}

/// Reads a zig-zag packed integer, advancing `input` past it.
pub fn read_packed_i64(input: &mut &[u8]) -> Result<i64, CodecError> {
    let raw = read_packed_u64(input)?;
    Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
}

/// Reads a zig-zag packed integer that must fit in 32 bits.
pub fn read_packed_i32(input: &mut &[u8]) -> Result<i32, CodecError> {
    let value = read_packed_i64(input)?;
    i32::try_from(value).map_err(|_| CodecError::Overflow(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_values_are_one_byte() {
        let mut out = Vec::new();
        write_packed_i32(&mut out, 0);
        write_packed_i32(&mut out, -1);
        write_packed_i32(&mut out, 63);
        assert_eq!(out, vec![0x00, 0x01, 0x7e]);
    }

    #[test]
    fn test_extremes() {
        for value in [i64::MIN, i64::MAX, -64, 64, 300, -300] {
            let mut out = Vec::new();
            write_packed_i64(&mut out, value);
            let mut input = out.as_slice();
            assert_eq!(read_packed_i64(&mut input).unwrap(), value);
            assert!(input.is_empty());
        }
    }

    #[test]
    fn test_truncated_input() {
        let mut input: &[u8] = &[0x80, 0x80];
        assert_eq!(
            read_packed_u64(&mut input),
            Err(CodecError::Truncated { needed: 1 })
        );
    }

    #[test]
    fn test_overlong_input() {
        let bytes = [0xffu8; 11];
        let mut input: &[u8] = &bytes;
        assert_eq!(read_packed_u64(&mut input), Err(CodecError::MalformedInteger));
    }

    #[test]
    fn test_i32_overflow() {
        let mut out = Vec::new();
        write_packed_i64(&mut out, i64::from(i32::MAX) + 1);
        let mut input = out.as_slice();
        assert!(matches!(
            read_packed_i32(&mut input),
            Err(CodecError::Overflow(_))
        ));
    }
}
