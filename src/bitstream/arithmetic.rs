// src/bitstream/arithmetic.rs

//! Bit streams coded with an adaptive binary arithmetic coder.
//!
//! Input bits are coded in blocks of `bufsize` bytes. Each block is written as
//! `vl(raw_bytes) vl(coded_bytes)` followed by the coded bytes, so a reader can
//! find block boundaries without decoding. The bit model carries over from one
//! block to the next.

use std::io::{BufRead, Write};

use log::debug;

use super::{BitResult, BitStreamError, DEFAULT_BIT_BUFSIZE, InputBitStream, OutputBitStream, bit_at};
use crate::arithmetic_coder::{AdaptiveBitModel, ArithmeticDecoder, ArithmeticEncoder};
use crate::utils::io::{bits_to_bytes, vl_read, vl_write};

pub struct ArithmeticOutputBitStream<W: Write> {
    writer: Option<W>,
    model: AdaptiveBitModel,
    encoder: ArithmeticEncoder<Vec<u8>>,
    bufsize: usize,
    byte_budget: usize,
    cur_bits: usize,
    bits: usize,
    coded_bytes: usize,
}

impl<W: Write> ArithmeticOutputBitStream<W> {
    /// `byte_budget` caps the coded output in bytes (0 = unlimited).
    pub fn new(writer: W, byte_budget: usize) -> Self {
        Self::with_bufsize(writer, byte_budget, DEFAULT_BIT_BUFSIZE)
    }

    pub fn with_bufsize(writer: W, byte_budget: usize, bufsize: usize) -> Self {
        let bufsize = bufsize.max(1);
        ArithmeticOutputBitStream {
            writer: Some(writer),
            model: AdaptiveBitModel::new(),
            encoder: ArithmeticEncoder::new(Vec::with_capacity(bufsize)),
            bufsize,
            byte_budget,
            cur_bits: 0,
            bits: 0,
            coded_bytes: 0,
        }
    }

    #[inline]
    fn check_budget(&self) -> BitResult<()> {
        if self.byte_budget != 0 && self.encoder.code_bytes() + self.coded_bytes >= self.byte_budget {
            return Err(BitStreamError::BudgetExceeded(self.byte_budget));
        }
        Ok(())
    }

    #[inline]
    fn code(&mut self, bit: bool) -> BitResult<()> {
        self.encoder.encode(bit, &mut self.model)?;
        self.cur_bits += 1;
        self.bits += 1;
        if self.cur_bits >> 3 == self.bufsize {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> BitResult<()> {
        if self.cur_bits == 0 {
            return Ok(());
        }
        let encoder = std::mem::replace(
            &mut self.encoder,
            ArithmeticEncoder::new(Vec::with_capacity(self.bufsize)),
        );
        let coded = encoder.finish()?;
        let raw_bytes = bits_to_bytes(self.cur_bits);

        let writer = self.writer.as_mut().ok_or(BitStreamError::WriterUnavailable)?;
        self.coded_bytes += vl_write(writer, raw_bytes as u64)?;
        self.coded_bytes += vl_write(writer, coded.len() as u64)?;
        writer.write_all(&coded)?;
        self.coded_bytes += coded.len();
        debug!("arithmetic block: {} raw bytes -> {} coded", raw_bytes, coded.len());

        self.cur_bits = 0;
        Ok(())
    }

    /// Codes the pending block, flushes and returns the writer.
    pub fn finish(mut self) -> BitResult<W> {
        self.flush()?;
        self.writer.take().ok_or(BitStreamError::WriterUnavailable)
    }
}

impl<W: Write> OutputBitStream for ArithmeticOutputBitStream<W> {
    fn put_zero(&mut self) -> BitResult<()> {
        self.check_budget()?;
        self.code(false)
    }

    fn put_one(&mut self) -> BitResult<()> {
        self.check_budget()?;
        self.code(true)
    }

    fn write_bits(&mut self, src: &[u8], bit_count: usize, bit_offset: usize) -> BitResult<()> {
        for i in 0..bit_count {
            self.check_budget()?;
            self.code(bit_at(src, bit_offset + i))?;
        }
        Ok(())
    }

    fn next_byte(&mut self) -> BitResult<()> {
        while self.bits & 7 != 0 {
            self.put_zero()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> BitResult<()> {
        self.flush_block()?;
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn in_bits(&self) -> usize {
        self.bits
    }

    fn out_bytes(&self) -> usize {
        self.coded_bytes
    }
}

impl<W: Write> Drop for ArithmeticOutputBitStream<W> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            let _ = self.flush();
        }
    }
}

pub struct ArithmeticInputBitStream<R: BufRead> {
    reader: R,
    model: AdaptiveBitModel,
    decoder: Option<ArithmeticDecoder<std::io::Cursor<Vec<u8>>>>,
    bufsize: usize,
    byte_budget: usize,
    cur_bits: usize,
    bits: usize,
    total_bits: usize,
    read_bytes: usize,
}

impl<R: BufRead> ArithmeticInputBitStream<R> {
    /// `byte_budget` caps the decoded bits at `8 * byte_budget` (0 = unlimited).
    pub fn new(reader: R, byte_budget: usize) -> Self {
        Self::with_bufsize(reader, byte_budget, DEFAULT_BIT_BUFSIZE)
    }

    pub fn with_bufsize(reader: R, byte_budget: usize, bufsize: usize) -> Self {
        ArithmeticInputBitStream {
            reader,
            model: AdaptiveBitModel::new(),
            decoder: None,
            bufsize: bufsize.max(1),
            byte_budget,
            cur_bits: 0,
            bits: 0,
            total_bits: 0,
            read_bytes: 0,
        }
    }

    /// Coded bytes consumed from the reader, block headers included.
    pub fn read_bytes(&self) -> usize {
        self.read_bytes
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_block(&mut self) -> BitResult<()> {
        let raw_bytes = vl_read(&mut self.reader)? as usize;
        let coded_bytes = vl_read(&mut self.reader)? as usize;
        if raw_bytes > self.bufsize {
            return Err(BitStreamError::BlockTooLarge { size: raw_bytes, max: self.bufsize });
        }
        let mut coded = vec![0u8; coded_bytes];
        self.reader.read_exact(&mut coded)?;
        self.read_bytes += crate::utils::io::vl_len(raw_bytes as u64)
            + crate::utils::io::vl_len(coded_bytes as u64)
            + coded_bytes;

        self.decoder = Some(ArithmeticDecoder::new(std::io::Cursor::new(coded))?);
        self.bits = raw_bytes << 3;
        self.cur_bits = 0;
        Ok(())
    }
}

impl<R: BufRead> InputBitStream for ArithmeticInputBitStream<R> {
    fn get_bit(&mut self) -> BitResult<bool> {
        if self.byte_budget != 0 && self.total_bits >= self.byte_budget << 3 {
            return Err(BitStreamError::BudgetExceeded(self.byte_budget));
        }
        while self.cur_bits == self.bits {
            self.read_block()?;
        }
        let decoder = self.decoder.as_mut().ok_or_else(BitStreamError::eof)?;
        let bit = decoder.decode(&mut self.model)?;
        self.cur_bits += 1;
        self.total_bits += 1;
        Ok(bit)
    }

    fn good(&mut self) -> bool {
        if self.byte_budget != 0 && self.total_bits >= self.byte_budget << 3 {
            return false;
        }
        self.cur_bits < self.bits || self.reader.fill_buf().is_ok_and(|b| !b.is_empty())
    }

    fn next_byte(&mut self) -> BitResult<()> {
        while self.total_bits & 7 != 0 {
            self.get_bit()?;
        }
        Ok(())
    }

    fn in_bits(&self) -> usize {
        self.total_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_multi_block_round_trip() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 37 % 11) as u8).collect();
        let mut out = ArithmeticOutputBitStream::with_bufsize(Vec::new(), 0, 64);
        out.write_bits(&data, data.len() * 8, 0).unwrap();
        assert_eq!(out.in_bytes(), 1000);
        let coded = out.finish().unwrap();

        let mut input = ArithmeticInputBitStream::with_bufsize(Cursor::new(&coded[..]), 0, 64);
        let mut back = crate::bitstream::VecOutputBitStream::new();
        while input.good() {
            back.put_bit(input.get_bit().unwrap()).unwrap();
        }
        assert_eq!(back.into_bytes(), data);
        assert_eq!(input.read_bytes(), coded.len());
    }

    #[test]
    fn test_block_header_layout() {
        let mut out = ArithmeticOutputBitStream::new(Vec::new(), 0);
        out.put_one().unwrap();
        out.next_byte().unwrap();
        let coded = out.finish().unwrap();
        // one raw byte, then the coded length, then that many bytes
        assert_eq!(coded[0], 1);
        assert_eq!(coded[1] as usize, coded.len() - 2);
    }

    #[test]
    fn test_output_budget() {
        let mut out = ArithmeticOutputBitStream::with_bufsize(Vec::new(), 4, 1);
        let mut result = Ok(());
        for i in 0..10_000u32 {
            result = out.put_bit(i.wrapping_mul(2_654_435_761) >> 31 == 1);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(BitStreamError::BudgetExceeded(4))));
        assert!(out.out_bytes() >= 4);
    }

    #[test]
    fn test_input_budget() {
        let mut out = ArithmeticOutputBitStream::new(Vec::new(), 0);
        out.write_bits(&[0xaa, 0xbb], 16, 0).unwrap();
        let coded = out.finish().unwrap();

        let mut input = ArithmeticInputBitStream::new(Cursor::new(coded), 1);
        for _ in 0..8 {
            input.get_bit().unwrap();
        }
        assert!(!input.good());
        assert!(matches!(input.get_bit(), Err(BitStreamError::BudgetExceeded(1))));
    }

    #[test]
    fn test_oversized_block_rejected() {
        let mut out = ArithmeticOutputBitStream::with_bufsize(Vec::new(), 0, 16);
        out.write_bits(&[0u8; 16], 128, 0).unwrap();
        let coded = out.finish().unwrap();
        let mut input = ArithmeticInputBitStream::with_bufsize(Cursor::new(coded), 0, 8);
        assert!(matches!(
            input.get_bit(),
            Err(BitStreamError::BlockTooLarge { size: 16, max: 8 })
        ));
    }
}
