// src/utils/io.rs

//! Integer serialization used by the stream headers.
//!
//! Unsigned values are written as LEB128-style varints: seven data bits per
//! byte, least significant group first, high bit set while more groups follow.
//! Signed values that must survive sign extension use a fixed eight-byte
//! little-endian form.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Writes `value` as a varint and returns the number of bytes written.
pub fn vl_write<W: Write + ?Sized>(out: &mut W, mut value: u64) -> io::Result<usize> {
    let mut written = 0;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.write_u8(byte)?;
        written += 1;
        if value == 0 {
            return Ok(written);
        }
    }
}

/// Reads a varint written by [`vl_write`].
pub fn vl_read<R: Read + ?Sized>(input: &mut R) -> io::Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = input.read_u8()?;
        if shift >= 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "varint longer than 64 bits",
            ));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Number of bytes [`vl_write`] would emit for `value`.
pub fn vl_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Fixed-width signed write, low byte first regardless of host order.
pub fn write_i64_le<W: Write + ?Sized>(out: &mut W, value: i64) -> io::Result<usize> {
    out.write_i64::<LittleEndian>(value)?;
    Ok(std::mem::size_of::<i64>())
}

pub fn read_i64_le<R: Read + ?Sized>(input: &mut R) -> io::Result<i64> {
    input.read_i64::<LittleEndian>()
}

/// Rounds a bit count up to whole bytes.
#[inline]
pub fn bits_to_bytes(bits: usize) -> usize {
    (bits >> 3) + usize::from(bits & 0x7 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_vl_boundaries() {
        for &value in &[0u64, 1, 127, 128, 255, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            let n = vl_write(&mut buf, value).unwrap();
            assert_eq!(n, buf.len());
            assert_eq!(n, vl_len(value));
            let mut cursor = Cursor::new(buf);
            assert_eq!(vl_read(&mut cursor).unwrap(), value);
        }
    }

    #[test]
    fn test_vl_layout() {
        let mut buf = Vec::new();
        vl_write(&mut buf, 300).unwrap();
        assert_eq!(buf, vec![0xac, 0x02]);
    }

    #[test]
    fn test_vl_truncated_input() {
        let mut cursor = Cursor::new(vec![0x80u8, 0x80]);
        assert!(vl_read(&mut cursor).is_err());
    }

    #[test]
    fn test_i64_low_byte_first() {
        let mut buf = Vec::new();
        write_i64_le(&mut buf, -2).unwrap();
        assert_eq!(buf, vec![0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(read_i64_le(&mut Cursor::new(buf)).unwrap(), -2);
    }

    #[test]
    fn test_bits_to_bytes() {
        assert_eq!(bits_to_bytes(0), 0);
        assert_eq!(bits_to_bytes(1), 1);
        assert_eq!(bits_to_bytes(8), 1);
        assert_eq!(bits_to_bytes(9), 2);
    }
}
