//! Adaptive binary arithmetic coding.
//!
//! A counting model ([`AdaptiveBitModel`]) drives a range coder with 60-bit
//! precision, after Moffat, Neal and Witten, "Arithmetic Coding Revisited"
//! (ACM TOIS 16(3), 1998). The encoder emits bits MSB first with carry
//! handling through a pending-bit counter; the decoder mirrors it and reads
//! zero bits past the end of its input.

use std::io::{Read, Write};
use thiserror::Error;

/// Bits of precision in `low`/`range`.
const B: u32 = 60;
const HALF: u64 = 1 << (B - 1);
const QUARTER: u64 = 1 << (B - 2);

/// Counts are halved once their sum reaches this limit, which keeps the model
/// adaptive and far below the `2^30` total the coder can represent.
const MAX_TOTAL: u32 = 1 << 13;

#[derive(Error, Debug)]
pub enum ArithmeticError {
    #[error("I/O error during arithmetic coding: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot access writer after it has been finished or taken")]
    WriterUnavailable,
}

/// Adaptive probability estimate for a binary source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveBitModel {
    c0: u32,
    c1: u32,
}

impl Default for AdaptiveBitModel {
    fn default() -> Self {
        AdaptiveBitModel { c0: 1, c1: 1 }
    }
}

impl AdaptiveBitModel {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn counts(&self) -> (u32, u32) {
        (self.c0, self.c1)
    }

    #[inline]
    pub fn update(&mut self, bit: bool) {
        if bit {
            self.c1 += 1;
        } else {
            self.c0 += 1;
        }
        if self.c0 + self.c1 >= MAX_TOTAL {
            self.c0 = (self.c0 + 1) >> 1;
            self.c1 = (self.c1 + 1) >> 1;
        }
    }

    /// Split of `range` for the less probable symbol: `(lps, lps_range)`.
    #[inline]
    fn split(&self, range: u64) -> (bool, u64) {
        let (lps, c_lps) = if self.c0 < self.c1 { (false, self.c0) } else { (true, self.c1) };
        let r = range / u64::from(self.c0 + self.c1);
        (lps, r * u64::from(c_lps))
    }
}

/// Binary arithmetic encoder writing to `W`.
pub struct ArithmeticEncoder<W: Write> {
    writer: Option<W>,
    out_buf: u8,
    out_bits: u32,
    pending: u64,
    low: u64,
    range: u64,
    code_bytes: usize,
}

impl<W: Write> ArithmeticEncoder<W> {
    pub fn new(writer: W) -> Self {
        ArithmeticEncoder {
            writer: Some(writer),
            out_buf: 0,
            out_bits: 0,
            pending: 0,
            low: 0,
            range: HALF,
            code_bytes: 0,
        }
    }

    /// Bytes emitted to the writer so far.
    #[inline]
    pub fn code_bytes(&self) -> usize {
        self.code_bytes
    }

    fn out_byte(&mut self) -> Result<(), ArithmeticError> {
        let writer = self.writer.as_mut().ok_or(ArithmeticError::WriterUnavailable)?;
        writer.write_all(&[self.out_buf])?;
        self.code_bytes += 1;
        self.out_buf = 0;
        self.out_bits = 0;
        Ok(())
    }

    #[inline]
    fn out_raw(&mut self, bit: bool) -> Result<(), ArithmeticError> {
        self.out_buf = (self.out_buf << 1) | u8::from(bit);
        self.out_bits += 1;
        if self.out_bits == 8 {
            self.out_byte()?;
        }
        Ok(())
    }

    fn out_plus_pending(&mut self, bit: bool) -> Result<(), ArithmeticError> {
        self.out_raw(bit)?;
        while self.pending > 0 {
            self.out_raw(!bit)?;
            self.pending -= 1;
        }
        Ok(())
    }

    /// Codes `bit` under `model`, then adapts the model.
    pub fn encode(&mut self, bit: bool, model: &mut AdaptiveBitModel) -> Result<(), ArithmeticError> {
        let (lps, r_lps) = model.split(self.range);
        if bit == lps {
            self.low += self.range - r_lps;
            self.range = r_lps;
        } else {
            self.range -= r_lps;
        }
        model.update(bit);

        while self.range <= QUARTER {
            if self.low + self.range <= HALF {
                self.out_plus_pending(false)?;
            } else if self.low >= HALF {
                self.out_plus_pending(true)?;
                self.low -= HALF;
            } else {
                self.pending += 1;
                self.low -= QUARTER;
            }
            self.low <<= 1;
            self.range <<= 1;
        }
        Ok(())
    }

    /// Flushes the final interval and returns the writer.
    pub fn finish(mut self) -> Result<W, ArithmeticError> {
        for _ in 0..B {
            let bit = (self.low >> (B - 1)) & 1 == 1;
            self.out_plus_pending(bit)?;
            self.low = (self.low << 1) & ((1u64 << B) - 1);
        }
        // Two trailing zeros let the decoder's look-ahead settle on the last symbol.
        self.out_plus_pending(false)?;
        self.out_plus_pending(false)?;
        if self.out_bits > 0 {
            self.out_buf <<= 8 - self.out_bits;
            self.out_byte()?;
        }
        let mut writer = self.writer.take().ok_or(ArithmeticError::WriterUnavailable)?;
        writer.flush()?;
        Ok(writer)
    }
}

/// Binary arithmetic decoder reading from `R`.
pub struct ArithmeticDecoder<R: Read> {
    reader: R,
    in_buf: u8,
    in_bits: u32,
    range: u64,
    d: u64,
}

impl<R: Read> ArithmeticDecoder<R> {
    /// Primes the decoder with the first 60 code bits.
    pub fn new(reader: R) -> Result<Self, ArithmeticError> {
        let mut decoder = ArithmeticDecoder { reader, in_buf: 0, in_bits: 0, range: HALF, d: 0 };
        for _ in 0..B {
            decoder.d = (decoder.d << 1) | u64::from(decoder.next_bit()?);
        }
        Ok(decoder)
    }

    fn next_bit(&mut self) -> Result<bool, ArithmeticError> {
        if self.in_bits == 0 {
            let mut byte = [0u8; 1];
            self.in_buf = match self.reader.read(&mut byte)? {
                0 => 0,
                _ => byte[0],
            };
            self.in_bits = 8;
        }
        self.in_bits -= 1;
        let bit = self.in_buf & 0x80 != 0;
        self.in_buf <<= 1;
        Ok(bit)
    }

    pub fn decode(&mut self, model: &mut AdaptiveBitModel) -> Result<bool, ArithmeticError> {
        let (lps, r_lps) = model.split(self.range);
        let bit = if self.d >= self.range - r_lps {
            self.d -= self.range - r_lps;
            self.range = r_lps;
            lps
        } else {
            self.range -= r_lps;
            !lps
        };
        model.update(bit);

        while self.range <= QUARTER {
            self.range <<= 1;
            self.d = (self.d << 1) | u64::from(self.next_bit()?);
        }
        Ok(bit)
    }
}
