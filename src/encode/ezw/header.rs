// src/encode/ezw/header.rs

//! Self-describing header in front of every EZW payload.
//!
//! Layout: `vl(rows) vl(cols) vl(level) i64le(mean) vl(scale) i8(log2 threshold)
//! u8(encoding) vl(blocks) vl(passes) vl(ezw_size) vl(rle_size) vl(enc_size)`.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::utils::bits::{is_divisible_by_2, log2, log2_pow2};
use crate::utils::error::{Result, WaveletError};
use crate::utils::io::{read_i64_le, vl_len, vl_read, vl_write, write_i64_le};

/// Second-stage coder applied after run-length coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncodingKind {
    None,
    Rle,
    Huffman,
    #[default]
    Arithmetic,
}

impl EncodingKind {
    pub fn code(self) -> u8 {
        match self {
            EncodingKind::None => 0,
            EncodingKind::Rle => 1,
            EncodingKind::Huffman => 2,
            EncodingKind::Arithmetic => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(EncodingKind::None),
            1 => Some(EncodingKind::Rle),
            2 => Some(EncodingKind::Huffman),
            3 => Some(EncodingKind::Arithmetic),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EncodingKind::None => "none",
            EncodingKind::Rle => "rle",
            EncodingKind::Huffman => "huffman",
            EncodingKind::Arithmetic => "arithmetic",
        }
    }
}

impl fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EncodingKind {
    type Err = WaveletError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(EncodingKind::None),
            "rle" => Ok(EncodingKind::Rle),
            "huffman" => Ok(EncodingKind::Huffman),
            "arithmetic" => Ok(EncodingKind::Arithmetic),
            other => Err(WaveletError::config(format!("unknown encoding '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EzwHeader {
    pub rows: usize,
    pub cols: usize,
    /// Transform level of the coded coefficients.
    pub level: usize,
    /// Mean of the quantized coefficients, removed before coding.
    pub mean: i64,
    /// Fixed-point multiplier applied before rounding.
    pub scale: u64,
    /// Initial threshold; zero or a power of two.
    pub threshold: u64,
    pub encoding: EncodingKind,
    /// Independently coded sub-streams, one per encoding rank.
    pub blocks: usize,
    /// Threshold passes present in each block.
    pub passes: usize,
    /// Bytes of EZW bit stream.
    pub ezw_size: usize,
    /// Bytes after run-length coding.
    pub rle_size: usize,
    /// Bytes after the second-stage coder.
    pub enc_size: usize,
}

impl Default for EzwHeader {
    fn default() -> Self {
        EzwHeader {
            rows: 0,
            cols: 0,
            level: 0,
            mean: 0,
            scale: 1,
            threshold: 0,
            encoding: EncodingKind::default(),
            blocks: 1,
            passes: 0,
            ezw_size: 0,
            rle_size: 0,
            enc_size: 0,
        }
    }
}

impl EzwHeader {
    pub fn new(
        rows: usize,
        cols: usize,
        level: usize,
        mean: i64,
        scale: u64,
        threshold: u64,
        encoding: EncodingKind,
    ) -> Self {
        EzwHeader { rows, cols, level, mean, scale, threshold, encoding, ..Self::default() }
    }

    /// Writes the header and returns its length in bytes.
    pub fn write<W: Write + ?Sized>(&self, out: &mut W) -> Result<usize> {
        let mut n = vl_write(out, self.rows as u64)?;
        n += vl_write(out, self.cols as u64)?;
        n += vl_write(out, self.level as u64)?;
        n += write_i64_le(out, self.mean)?;
        n += vl_write(out, self.scale)?;
        out.write_i8(log2_pow2(self.threshold))?;
        out.write_u8(self.encoding.code())?;
        n += 2;
        n += vl_write(out, self.blocks as u64)?;
        n += vl_write(out, self.passes as u64)?;
        n += vl_write(out, self.ezw_size as u64)?;
        n += vl_write(out, self.rle_size as u64)?;
        n += vl_write(out, self.enc_size as u64)?;
        Ok(n)
    }

    pub fn read<R: Read + ?Sized>(input: &mut R) -> Result<Self> {
        let rows = vl_read(input)? as usize;
        let cols = vl_read(input)? as usize;
        let level = vl_read(input)? as usize;
        let mean = read_i64_le(input)?;
        let scale = vl_read(input)?;
        let log2_threshold = input.read_i8()?;
        let encoding_code = input.read_u8()?;
        let blocks = vl_read(input)? as usize;
        let passes = vl_read(input)? as usize;
        let ezw_size = vl_read(input)? as usize;
        let rle_size = vl_read(input)? as usize;
        let enc_size = vl_read(input)? as usize;

        let threshold = match log2_threshold {
            -1 => 0,
            0..=62 => 1u64 << log2_threshold,
            other => return Err(WaveletError::corrupt(format!("bad threshold exponent {}", other))),
        };
        let encoding = EncodingKind::from_code(encoding_code).ok_or_else(|| {
            WaveletError::corrupt(format!("unknown encoding code {}", encoding_code))
        })?;
        if scale == 0 {
            return Err(WaveletError::corrupt("header scale is zero"));
        }
        if blocks == 0 {
            return Err(WaveletError::corrupt("header declares zero blocks"));
        }
        if level >= usize::BITS as usize {
            return Err(WaveletError::corrupt(format!("bad transform level {}", level)));
        }

        let header = EzwHeader {
            rows,
            cols,
            level,
            mean,
            scale,
            threshold,
            encoding,
            blocks,
            passes,
            ezw_size,
            rle_size,
            enc_size,
        };
        header.validate()?;
        Ok(header)
    }

    /// Checks that the matrix shape, level and block count describe a
    /// decodable quadtree of a size that can be allocated.
    pub fn validate(&self) -> Result<()> {
        let (rows, cols, level) = (self.rows, self.cols, self.level);
        if rows == 0 || cols == 0 {
            return Err(WaveletError::corrupt(format!("empty {}x{} matrix", rows, cols)));
        }
        let cells = rows
            .checked_mul(cols)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f64>()))
            .filter(|&bytes| bytes <= isize::MAX as usize);
        if cells.is_none() {
            return Err(WaveletError::corrupt(format!("{}x{} matrix is too large", rows, cols)));
        }
        if level > log2(rows.min(cols)) {
            return Err(WaveletError::corrupt(format!(
                "level {} is too deep for a {}x{} matrix",
                level, rows, cols
            )));
        }
        if !is_divisible_by_2(rows, level) || !is_divisible_by_2(cols, level) {
            return Err(WaveletError::corrupt(format!(
                "{}x{} matrix is not divisible by 2^{}",
                rows, cols, level
            )));
        }
        if self.blocks == 0 || (rows >> level) % self.blocks != 0 {
            return Err(WaveletError::corrupt(format!(
                "{} block(s) do not split {} low band rows",
                self.blocks,
                rows >> level
            )));
        }
        Ok(())
    }

    /// Serialized size of this header.
    pub fn encoded_len(&self) -> usize {
        vl_len(self.rows as u64)
            + vl_len(self.cols as u64)
            + vl_len(self.level as u64)
            + std::mem::size_of::<i64>()
            + vl_len(self.scale)
            + 2
            + vl_len(self.blocks as u64)
            + vl_len(self.passes as u64)
            + vl_len(self.ezw_size as u64)
            + vl_len(self.rle_size as u64)
            + vl_len(self.enc_size as u64)
    }

    /// Bytes of payload following the header.
    pub fn payload_len(&self) -> usize {
        match self.encoding {
            EncodingKind::Huffman | EncodingKind::Arithmetic => self.enc_size,
            EncodingKind::None | EncodingKind::Rle => self.rle_size,
        }
    }

    /// Raw matrix bytes (`f64` cells) over header plus payload bytes.
    pub fn compression_ratio(&self) -> f64 {
        let raw = (self.rows * self.cols * std::mem::size_of::<f64>()) as f64;
        raw / (self.encoded_len() + self.payload_len()) as f64
    }
}

impl fmt::Display for EzwHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} level {}, mean {}, scale {}, threshold {}, {} block(s), {} pass(es), \
             {}: ezw {} B, rle {} B, enc {} B",
            self.rows,
            self.cols,
            self.level,
            self.mean,
            self.scale,
            self.threshold,
            self.blocks,
            self.passes,
            self.encoding,
            self.ezw_size,
            self.rle_size,
            self.enc_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> EzwHeader {
        EzwHeader {
            blocks: 2,
            passes: 17,
            ezw_size: 100_000,
            rle_size: 40_000,
            enc_size: 31_337,
            ..EzwHeader::new(512, 256, 8, -123_456, 1000, 1 << 40, EncodingKind::Huffman)
        }
    }

    #[test]
    fn test_write_read() {
        let header = sample();
        let mut buf = Vec::new();
        let n = header.write(&mut buf).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(n, header.encoded_len());
        assert_eq!(EzwHeader::read(&mut Cursor::new(&buf)).unwrap(), header);
    }

    #[test]
    fn test_zero_threshold_uses_minus_one() {
        let header = EzwHeader::new(8, 8, 3, 5, 1, 0, EncodingKind::Rle);
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        // rows, cols, level, 8 mean bytes, scale
        assert_eq!(buf[3 + 8 + 1] as i8, -1);
        assert_eq!(EzwHeader::read(&mut Cursor::new(&buf)).unwrap().threshold, 0);
    }

    #[test]
    fn test_rejects_garbage() {
        let mut buf = Vec::new();
        EzwHeader { encoding: EncodingKind::Rle, ..sample() }.write(&mut buf).unwrap();
        let enc_pos = vl_len(512) + vl_len(256) + 1 + 8 + vl_len(1000) + 1;
        buf[enc_pos] = 9;
        assert!(matches!(
            EzwHeader::read(&mut Cursor::new(&buf)),
            Err(WaveletError::Corrupt(_))
        ));
        assert!(matches!(
            EzwHeader::read(&mut Cursor::new(&buf[..5])),
            Err(WaveletError::Io(_))
        ));
    }

    fn read_back(header: &EzwHeader) -> Result<EzwHeader> {
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        EzwHeader::read(&mut Cursor::new(&buf))
    }

    #[test]
    fn test_rejects_inconsistent_shapes() {
        let base = EzwHeader::new(8, 8, 3, 0, 1, 4, EncodingKind::Rle);
        assert!(read_back(&base).is_ok());

        let bad = [
            EzwHeader { rows: 0, ..base.clone() },
            EzwHeader { cols: 0, ..base.clone() },
            // not divisible by 2^3
            EzwHeader { rows: 12, ..base.clone() },
            // deeper than log2(8)
            EzwHeader { level: 5, ..base.clone() },
            EzwHeader { rows: usize::MAX, cols: 2, level: 0, ..base.clone() },
            EzwHeader { rows: 1 << 40, cols: 1 << 40, level: 0, ..base.clone() },
            // one low band row cannot be split into two blocks
            EzwHeader { blocks: 2, ..base.clone() },
        ];
        for header in bad {
            let err = read_back(&header).unwrap_err();
            assert!(matches!(err, WaveletError::Corrupt(_)), "{}: {}", header, err);
        }

        assert!(read_back(&EzwHeader { rows: 16, blocks: 2, ..base.clone() }).is_ok());
        assert!(read_back(&EzwHeader { rows: 8, cols: 32, level: 3, ..base }).is_ok());
    }

    #[test]
    fn test_encoding_names() {
        for kind in [
            EncodingKind::None,
            EncodingKind::Rle,
            EncodingKind::Huffman,
            EncodingKind::Arithmetic,
        ] {
            assert_eq!(kind.to_string().parse::<EncodingKind>().unwrap(), kind);
            assert_eq!(EncodingKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!("HUFFMAN".parse::<EncodingKind>().unwrap(), EncodingKind::Huffman);
        assert!("zip".parse::<EncodingKind>().is_err());
    }

    #[test]
    fn test_compression_ratio() {
        let header = sample();
        let total = header.encoded_len() + header.enc_size;
        let expected = (512 * 256 * 8) as f64 / total as f64;
        assert!((header.compression_ratio() - expected).abs() < 1e-12);
        assert!(header.to_string().contains("512x256 level 8"));
    }
}
