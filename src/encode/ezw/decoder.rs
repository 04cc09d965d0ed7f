// src/encode/ezw/decoder.rs

//! EZW decoder. Replays the encoder's traversal driven only by the bits.

use std::io::{BufRead, Read};

use log::{debug, info};

use super::header::{EncodingKind, EzwHeader};
use super::traversal::Quadtree;
use super::EzwCode;
use crate::bitstream::{ArithmeticInputBitStream, InputBitStream, VecInputBitStream};
use crate::comm::RadixIterator;
use crate::encode::{huffman, rle};
use crate::utils::error::{Result, WaveletError};
use crate::utils::matrix::Matrix;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderParams {
    /// Transform levels to reconstruct. `None` means all encoded levels;
    /// fewer levels yield a smaller matrix holding only the coarse bands.
    pub level: Option<usize>,
    /// Maximum threshold passes to decode per block, 0 for all.
    pub pass_limit: usize,
    /// Decode only this many leading bytes of the EZW bit stream, 0 for all.
    pub byte_budget: usize,
}

#[derive(Debug, Clone)]
pub struct DecodeOutput {
    /// Reconstructed wavelet coefficients, mean and scale restored.
    pub matrix: Matrix<f64>,
    /// Transform level of `matrix`.
    pub level: usize,
    /// Bytes of EZW bit stream consumed.
    pub bytes_read: usize,
    pub header: EzwHeader,
}

/// Cell state while decoding one block.
struct BlockDecoder<'m> {
    decoded: &'m mut Matrix<i64>,
    threshold: i64,
    sub_list: Vec<(usize, usize)>,
    /// Cleared once the pass limit is reached: the rest of the block is read
    /// only to find where the next block starts.
    store: bool,
}

impl BlockDecoder<'_> {
    fn decode_value<I: InputBitStream>(&mut self, row: usize, col: usize, input: &mut I) -> EzwCode {
        let (Ok(hi), Ok(lo)) = (input.get_bit(), input.get_bit()) else {
            return EzwCode::Stop;
        };
        let code = EzwCode::from_bits(hi, lo);
        if hi {
            self.sub_list.push((row, col));
            // cells outside a reduced-size output are tracked but not stored
            if self.store && self.decoded.in_bounds(row, col) {
                self.decoded[(row, col)] =
                    if code == EzwCode::Positive { self.threshold } else { -self.threshold };
            }
        }
        code
    }

    /// Returns `false` once the stream runs dry.
    fn subordinate_pass<I: InputBitStream>(&mut self, input: &mut I) -> bool {
        for &(row, col) in &self.sub_list {
            let Ok(bit) = input.get_bit() else {
                return false;
            };
            if bit && self.store && self.decoded.in_bounds(row, col) {
                let cell = &mut self.decoded[(row, col)];
                if *cell < 0 {
                    *cell -= self.threshold;
                } else {
                    *cell += self.threshold;
                }
            }
        }
        true
    }
}

/// Reads exactly `len` bytes, reporting a short stream as corruption.
fn read_payload<R: Read + ?Sized>(input: &mut R, len: usize, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len);
    input.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(WaveletError::corrupt(format!(
            "{} payload ends after {} of {} bytes",
            what,
            buf.len(),
            len
        )));
    }
    Ok(buf)
}

#[derive(Debug, Clone, Default)]
pub struct EzwDecoder {
    params: DecoderParams,
}

impl EzwDecoder {
    pub fn new(params: DecoderParams) -> Self {
        EzwDecoder { params }
    }

    pub fn params(&self) -> &DecoderParams {
        &self.params
    }

    /// Reads a header and its payload from `input`.
    pub fn decode<R: BufRead>(&self, input: &mut R) -> Result<DecodeOutput> {
        let header = EzwHeader::read(input)?;
        self.decode_with_header(input, header)
    }

    /// Decodes the payload that follows an already-read `header`.
    pub fn decode_with_header<R: BufRead>(&self, input: &mut R, header: EzwHeader) -> Result<DecodeOutput> {
        header.validate()?;
        let ezw = Self::initial_decode(input, &header)?;

        let passes = match (header.passes, self.params.pass_limit) {
            (p, 0) => p,
            (0, limit) => limit,
            (p, limit) => p.min(limit),
        };
        let tree = Quadtree::new(header.rows, header.cols, header.level);
        let level = self.params.level.map_or(header.level, |l| l.min(header.level));
        let mut decoded = Matrix::<i64>::new(tree.low_rows << level, tree.low_cols << level);
        let threshold = i64::try_from(header.threshold)
            .map_err(|_| WaveletError::corrupt("threshold out of range"))?;

        let mut bits = VecInputBitStream::with_budget(&ezw, self.params.byte_budget);
        let order: Vec<usize> = RadixIterator::new(header.blocks).collect();
        for (i, &block) in order.iter().enumerate() {
            let last = i + 1 == order.len();
            let mut state = BlockDecoder {
                decoded: &mut decoded,
                threshold,
                sub_list: Vec::new(),
                store: true,
            };
            let mut count = 0;
            while state.threshold != 0 && bits.good() && (header.passes == 0 || count < header.passes) {
                if passes != 0 && count == passes {
                    // the next block starts after every pass of this one
                    if last {
                        break;
                    }
                    state.store = false;
                }
                let completed = tree.dominant_pass(header.blocks, block, |cell| {
                    state.decode_value(cell.row, cell.col, &mut bits)
                });
                if !completed {
                    break;
                }
                state.threshold >>= 1;
                if state.threshold > 0 && !state.subordinate_pass(&mut bits) {
                    break;
                }
                count += 1;
            }
            debug!("block {}: {} pass(es) read, {} significant", block, count, state.sub_list.len());
            // blocks start on byte boundaries
            bits.next_byte()?;
        }

        let inv_scale = 1.0 / header.scale as f64;
        let mean = header.mean;
        let matrix = decoded.map(|v| (v.saturating_add(mean)) as f64 * inv_scale);
        let bytes_read = bits.in_bytes().min(ezw.len());
        info!(
            "EZW decode: {}x{} at level {}, {} of {} bytes",
            matrix.rows(),
            matrix.cols(),
            level,
            bytes_read,
            header.ezw_size
        );
        Ok(DecodeOutput { matrix, level, bytes_read, header })
    }

    /// Undoes the entropy coding, returning the raw EZW bit stream.
    fn initial_decode<R: BufRead>(input: &mut R, header: &EzwHeader) -> Result<Vec<u8>> {
        let rle_bytes = match header.encoding {
            EncodingKind::Huffman => {
                let coded = read_payload(input, header.enc_size, "Huffman")?;
                huffman::uncompress(&coded, header.rle_size)?
            }
            EncodingKind::Arithmetic => {
                let coded = read_payload(input, header.enc_size, "arithmetic")?;
                let mut bits = ArithmeticInputBitStream::new(coded.as_slice(), 0);
                let mut out = vec![0u8; header.rle_size];
                for byte in out.iter_mut() {
                    for _ in 0..8 {
                        let bit = bits.get_bit().map_err(|_| {
                            WaveletError::corrupt(format!(
                                "arithmetic payload ends before {} bytes",
                                header.rle_size
                            ))
                        })?;
                        *byte = (*byte << 1) | u8::from(bit);
                    }
                }
                out
            }
            EncodingKind::Rle => read_payload(input, header.rle_size, "RLE")?,
            EncodingKind::None => {
                return Err(WaveletError::corrupt("stream declares no encoding"));
            }
        };

        let ezw = rle::uncompress(&rle_bytes)?;
        if ezw.len() != header.ezw_size {
            return Err(WaveletError::corrupt(format!(
                "run-length data expands to {} bytes, header says {}",
                ezw.len(),
                header.ezw_size
            )));
        }
        Ok(ezw)
    }
}
