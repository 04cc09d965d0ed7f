// src/bitstream/mod.rs

//! Sequential bit sinks and sources.
//!
//! Bits are packed most significant bit first inside each byte. Every stream
//! accepts bulk, non-byte-aligned writes through [`OutputBitStream::write_bits`],
//! which is built on the [`insert_bits`] splicing primitive.
//!
//! Three implementations are provided:
//! - [`VecOutputBitStream`] / [`VecInputBitStream`]: growable in-memory buffer
//! - [`BufferedOutputBitStream`] / [`BufferedInputBitStream`]: fixed-size
//!   buffer flushed to / refilled from an `io` stream
//! - [`ArithmeticOutputBitStream`] / [`ArithmeticInputBitStream`]: bits are
//!   coded with an adaptive binary model in length-prefixed blocks

use thiserror::Error;

pub mod arithmetic;
pub mod buffered;
pub mod insert;
pub mod vector;

pub use arithmetic::{ArithmeticInputBitStream, ArithmeticOutputBitStream};
pub use buffered::{BufferedInputBitStream, BufferedOutputBitStream};
pub use insert::insert_bits;
pub use vector::{VecInputBitStream, VecOutputBitStream};

/// Default block size, in bytes of input bits, for buffered and arithmetic streams.
pub const DEFAULT_BIT_BUFSIZE: usize = 1 << 16;

#[derive(Error, Debug)]
pub enum BitStreamError {
    #[error("byte budget of {0} bytes exceeded")]
    BudgetExceeded(usize),
    #[error("I/O error in bit stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("coded block of {size} bytes exceeds buffer size {max}")]
    BlockTooLarge { size: usize, max: usize },
    #[error("cannot access writer after it has been finished or taken")]
    WriterUnavailable,
    #[error("arithmetic coder error: {0}")]
    Coder(#[from] crate::arithmetic_coder::ArithmeticError),
}

impl BitStreamError {
    pub(crate) fn eof() -> Self {
        BitStreamError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "read past end of bit stream",
        ))
    }
}

pub type BitResult<T> = std::result::Result<T, BitStreamError>;

/// A sequential bit sink.
pub trait OutputBitStream {
    fn put_zero(&mut self) -> BitResult<()>;

    fn put_one(&mut self) -> BitResult<()>;

    #[inline]
    fn put_bit(&mut self, bit: bool) -> BitResult<()> {
        if bit { self.put_one() } else { self.put_zero() }
    }

    /// Appends `bit_count` bits of `src`, starting `bit_offset` bits into it.
    fn write_bits(&mut self, src: &[u8], bit_count: usize, bit_offset: usize) -> BitResult<()>;

    /// Pads with zero bits up to the next byte boundary.
    fn next_byte(&mut self) -> BitResult<()>;

    fn flush(&mut self) -> BitResult<()>;

    /// Bits accepted so far.
    fn in_bits(&self) -> usize;

    fn in_bytes(&self) -> usize {
        crate::utils::io::bits_to_bytes(self.in_bits())
    }

    /// Bytes handed to the underlying sink so far.
    fn out_bytes(&self) -> usize;
}

/// A sequential bit source.
pub trait InputBitStream {
    fn get_bit(&mut self) -> BitResult<bool>;

    /// True while at least one more bit can be read.
    fn good(&mut self) -> bool;

    /// Skips to the next byte boundary.
    fn next_byte(&mut self) -> BitResult<()>;

    /// Bits consumed so far.
    fn in_bits(&self) -> usize;

    fn in_bytes(&self) -> usize {
        crate::utils::io::bits_to_bytes(self.in_bits())
    }
}

impl<T: OutputBitStream + ?Sized> OutputBitStream for &mut T {
    fn put_zero(&mut self) -> BitResult<()> {
        (**self).put_zero()
    }
    fn put_one(&mut self) -> BitResult<()> {
        (**self).put_one()
    }
    fn write_bits(&mut self, src: &[u8], bit_count: usize, bit_offset: usize) -> BitResult<()> {
        (**self).write_bits(src, bit_count, bit_offset)
    }
    fn next_byte(&mut self) -> BitResult<()> {
        (**self).next_byte()
    }
    fn flush(&mut self) -> BitResult<()> {
        (**self).flush()
    }
    fn in_bits(&self) -> usize {
        (**self).in_bits()
    }
    fn out_bytes(&self) -> usize {
        (**self).out_bytes()
    }
}

impl<T: InputBitStream + ?Sized> InputBitStream for &mut T {
    fn get_bit(&mut self) -> BitResult<bool> {
        (**self).get_bit()
    }
    fn good(&mut self) -> bool {
        (**self).good()
    }
    fn next_byte(&mut self) -> BitResult<()> {
        (**self).next_byte()
    }
    fn in_bits(&self) -> usize {
        (**self).in_bits()
    }
}

#[inline]
pub(crate) fn bit_at(src: &[u8], bit: usize) -> bool {
    src[bit >> 3] & (0x80 >> (bit & 7)) != 0
}
