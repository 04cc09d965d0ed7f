// src/bitstream/buffered.rs

//! Bit streams over `io::Write` / `io::Read` with a fixed-size staging buffer.

use std::io::{Read, Write};

use super::{
    BitResult, BitStreamError, DEFAULT_BIT_BUFSIZE, InputBitStream, OutputBitStream, bit_at,
    insert_bits,
};
use crate::utils::io::bits_to_bytes;

/// Writes bits into a `bufsize`-byte buffer and hands full buffers to `W`.
pub struct BufferedOutputBitStream<W: Write> {
    writer: Option<W>,
    buf: Vec<u8>,
    cur_bits: usize,
    bits: usize,
    out_bytes: usize,
    byte_budget: usize,
}

impl<W: Write> BufferedOutputBitStream<W> {
    pub fn new(writer: W) -> Self {
        Self::with_bufsize(writer, DEFAULT_BIT_BUFSIZE)
    }

    pub fn with_bufsize(writer: W, bufsize: usize) -> Self {
        let bufsize = bufsize.max(1);
        BufferedOutputBitStream {
            writer: Some(writer),
            buf: vec![0; bufsize],
            cur_bits: 0,
            bits: 0,
            out_bytes: 0,
            byte_budget: 0,
        }
    }

    /// Limits the total output to `byte_budget` bytes (0 = unlimited).
    pub fn set_byte_budget(&mut self, byte_budget: usize) {
        self.byte_budget = byte_budget;
    }

    #[inline]
    fn capacity_bits(&self) -> usize {
        self.buf.len() << 3
    }

    #[inline]
    fn check_budget(&self, extra_bits: usize) -> BitResult<()> {
        if self.byte_budget != 0 && bits_to_bytes(self.bits + extra_bits) > self.byte_budget {
            return Err(BitStreamError::BudgetExceeded(self.byte_budget));
        }
        Ok(())
    }

    /// Writes out the staged bytes. Only called on a byte boundary.
    fn drain(&mut self) -> BitResult<()> {
        debug_assert_eq!(self.cur_bits & 7, 0);
        let bytes = self.cur_bits >> 3;
        if bytes == 0 {
            return Ok(());
        }
        let writer = self.writer.as_mut().ok_or(BitStreamError::WriterUnavailable)?;
        writer.write_all(&self.buf[..bytes])?;
        self.out_bytes += bytes;
        self.buf[..bytes].iter_mut().for_each(|b| *b = 0);
        self.cur_bits = 0;
        Ok(())
    }

    #[inline]
    fn push(&mut self, bit: bool) -> BitResult<()> {
        self.check_budget(1)?;
        if bit {
            self.buf[self.cur_bits >> 3] |= 0x80 >> (self.cur_bits & 7);
        }
        self.cur_bits += 1;
        self.bits += 1;
        if self.cur_bits == self.capacity_bits() {
            self.drain()?;
        }
        Ok(())
    }

    /// Pads to a byte boundary, flushes and returns the writer.
    pub fn finish(mut self) -> BitResult<W> {
        self.flush()?;
        self.writer.take().ok_or(BitStreamError::WriterUnavailable)
    }
}

impl<W: Write> OutputBitStream for BufferedOutputBitStream<W> {
    fn put_zero(&mut self) -> BitResult<()> {
        self.push(false)
    }

    fn put_one(&mut self) -> BitResult<()> {
        self.push(true)
    }

    fn write_bits(&mut self, src: &[u8], bit_count: usize, bit_offset: usize) -> BitResult<()> {
        self.check_budget(bit_count)?;
        let mut done = 0;
        while done < bit_count {
            let room = self.capacity_bits() - self.cur_bits;
            let n = room.min(bit_count - done);
            insert_bits(&mut self.buf, src, n, self.cur_bits, bit_offset + done);
            self.cur_bits += n;
            self.bits += n;
            done += n;
            if self.cur_bits == self.capacity_bits() {
                self.drain()?;
            }
        }
        Ok(())
    }

    fn next_byte(&mut self) -> BitResult<()> {
        let pad = (8 - (self.bits & 7)) & 7;
        self.bits += pad;
        self.cur_bits += pad;
        if self.cur_bits == self.capacity_bits() {
            self.drain()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> BitResult<()> {
        self.next_byte()?;
        self.drain()?;
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn in_bits(&self) -> usize {
        self.bits
    }

    fn out_bytes(&self) -> usize {
        self.out_bytes
    }
}

impl<W: Write> Drop for BufferedOutputBitStream<W> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            let _ = self.flush();
        }
    }
}

/// Reads bits from `R`, refilling a `bufsize`-byte buffer as needed.
pub struct BufferedInputBitStream<R: Read> {
    reader: R,
    buf: Vec<u8>,
    filled: usize,
    pos: usize,
    bits: usize,
    eof: bool,
}

impl<R: Read> BufferedInputBitStream<R> {
    pub fn new(reader: R) -> Self {
        Self::with_bufsize(reader, DEFAULT_BIT_BUFSIZE)
    }

    pub fn with_bufsize(reader: R, bufsize: usize) -> Self {
        BufferedInputBitStream {
            reader,
            buf: vec![0; bufsize.max(1)],
            filled: 0,
            pos: 0,
            bits: 0,
            eof: false,
        }
    }

    fn refill(&mut self) -> BitResult<()> {
        self.filled = 0;
        self.pos = 0;
        while self.filled < self.buf.len() {
            let n = self.reader.read(&mut self.buf[self.filled..])?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.filled += n;
        }
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> InputBitStream for BufferedInputBitStream<R> {
    fn get_bit(&mut self) -> BitResult<bool> {
        if self.pos == self.filled << 3 {
            if self.eof {
                return Err(BitStreamError::eof());
            }
            self.refill()?;
            if self.filled == 0 {
                return Err(BitStreamError::eof());
            }
        }
        let bit = bit_at(&self.buf, self.pos);
        self.pos += 1;
        self.bits += 1;
        Ok(bit)
    }

    fn good(&mut self) -> bool {
        if self.pos < self.filled << 3 {
            return true;
        }
        if self.eof {
            return false;
        }
        self.refill().is_ok() && self.filled > 0
    }

    fn next_byte(&mut self) -> BitResult<()> {
        let skip = (8 - (self.bits & 7)) & 7;
        self.pos += skip;
        self.bits += skip;
        Ok(())
    }

    fn in_bits(&self) -> usize {
        self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_small_buffer_flushes_in_order() {
        let mut out = BufferedOutputBitStream::with_bufsize(Vec::new(), 1);
        out.write_bits(&[0xde, 0xad, 0xbe], 20, 4).unwrap();
        out.put_one().unwrap();
        assert_eq!(out.in_bits(), 21);
        let bytes = out.finish().unwrap();
        // 0xeadbe followed by a one bit, padded
        assert_eq!(bytes, vec![0xea, 0xdb, 0xe8]);
    }

    #[test]
    fn test_matches_vector_stream() {
        let mut out = BufferedOutputBitStream::with_bufsize(Vec::new(), 2);
        for i in 0..13 {
            out.put_bit(i % 3 == 0).unwrap();
        }
        out.write_bits(&[0xff], 8, 0).unwrap();
        let bytes = out.finish().unwrap();

        let mut reference = crate::bitstream::VecOutputBitStream::new();
        for i in 0..13 {
            reference.put_bit(i % 3 == 0).unwrap();
        }
        reference.write_bits(&[0xff], 8, 0).unwrap();
        assert_eq!(bytes, reference.into_bytes());
    }

    #[test]
    fn test_reader_refills() {
        let data = vec![0b1010_1010u8, 0b1100_1100, 0b1111_0000];
        let mut input = BufferedInputBitStream::with_bufsize(Cursor::new(data), 1);
        let mut bits = Vec::new();
        while input.good() {
            bits.push(input.get_bit().unwrap());
        }
        assert_eq!(bits.len(), 24);
        assert_eq!(&bits[..4], &[true, false, true, false]);
        assert_eq!(&bits[20..], &[false; 4]);
        assert!(input.get_bit().is_err());
    }

    #[test]
    fn test_reader_next_byte() {
        let data = vec![0x80u8, 0x40];
        let mut input = BufferedInputBitStream::new(Cursor::new(data));
        assert!(input.get_bit().unwrap());
        input.next_byte().unwrap();
        assert!(!input.get_bit().unwrap());
        assert!(input.get_bit().unwrap());
        assert_eq!(input.in_bytes(), 2);
    }

    #[test]
    fn test_budget() {
        let mut out = BufferedOutputBitStream::with_bufsize(Vec::new(), 4);
        out.set_byte_budget(1);
        out.write_bits(&[0xff], 8, 0).unwrap();
        assert!(matches!(out.put_one(), Err(BitStreamError::BudgetExceeded(1))));
        assert_eq!(out.finish().unwrap(), vec![0xff]);
    }
}
