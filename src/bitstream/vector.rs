// src/bitstream/vector.rs

//! Growable in-memory bit streams.

use super::{BitResult, BitStreamError, InputBitStream, OutputBitStream, bit_at, insert_bits};
use crate::utils::io::bits_to_bytes;

/// Bit sink backed by a `Vec<u8>`. The buffer always holds exactly
/// `bits_to_bytes(in_bits())` bytes with unused trailing bits cleared.
#[derive(Debug, Default, Clone)]
pub struct VecOutputBitStream {
    buf: Vec<u8>,
    bits: usize,
    byte_budget: usize,
}

impl VecOutputBitStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream that refuses to grow past `byte_budget` bytes (0 = unlimited).
    pub fn with_budget(byte_budget: usize) -> Self {
        VecOutputBitStream { byte_budget, ..Self::default() }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    #[inline]
    fn check_budget(&self, extra_bits: usize) -> BitResult<()> {
        if self.byte_budget != 0 && bits_to_bytes(self.bits + extra_bits) > self.byte_budget {
            return Err(BitStreamError::BudgetExceeded(self.byte_budget));
        }
        Ok(())
    }

    #[inline]
    fn push(&mut self, bit: bool) -> BitResult<()> {
        self.check_budget(1)?;
        if self.bits & 7 == 0 {
            self.buf.push(0);
        }
        if bit {
            let last = self.buf.len() - 1;
            self.buf[last] |= 0x80 >> (self.bits & 7);
        }
        self.bits += 1;
        Ok(())
    }
}

impl OutputBitStream for VecOutputBitStream {
    fn put_zero(&mut self) -> BitResult<()> {
        self.push(false)
    }

    fn put_one(&mut self) -> BitResult<()> {
        self.push(true)
    }

    fn write_bits(&mut self, src: &[u8], bit_count: usize, bit_offset: usize) -> BitResult<()> {
        self.check_budget(bit_count)?;
        let needed = bits_to_bytes(self.bits + bit_count);
        if self.buf.capacity() < needed {
            self.buf.reserve(needed * 2 - self.buf.len());
        }
        if self.buf.len() < needed {
            self.buf.resize(needed, 0);
        }
        insert_bits(&mut self.buf, src, bit_count, self.bits, bit_offset);
        self.bits += bit_count;
        Ok(())
    }

    fn next_byte(&mut self) -> BitResult<()> {
        self.bits = self.buf.len() << 3;
        Ok(())
    }

    fn flush(&mut self) -> BitResult<()> {
        Ok(())
    }

    fn in_bits(&self) -> usize {
        self.bits
    }

    fn out_bytes(&self) -> usize {
        self.buf.len()
    }
}

/// Bit source over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct VecInputBitStream<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> VecInputBitStream<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        VecInputBitStream { buf, pos: 0, end: buf.len() << 3 }
    }

    /// Reads at most the first `byte_budget` bytes of `buf` (0 = all of it).
    pub fn with_budget(buf: &'a [u8], byte_budget: usize) -> Self {
        let mut stream = Self::new(buf);
        if byte_budget != 0 {
            stream.end = stream.end.min(byte_budget << 3);
        }
        stream
    }
}

impl InputBitStream for VecInputBitStream<'_> {
    #[inline]
    fn get_bit(&mut self) -> BitResult<bool> {
        if self.pos >= self.end {
            return Err(BitStreamError::eof());
        }
        let bit = bit_at(self.buf, self.pos);
        self.pos += 1;
        Ok(bit)
    }

    #[inline]
    fn good(&mut self) -> bool {
        self.pos < self.end
    }

    fn next_byte(&mut self) -> BitResult<()> {
        self.pos = bits_to_bytes(self.pos) << 3;
        Ok(())
    }

    fn in_bits(&self) -> usize {
        self.pos
    }
}
