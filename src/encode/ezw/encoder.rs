// src/encode/ezw/encoder.rs

//! Sequential EZW encoder.

use std::io::Write;

use log::{debug, info, warn};

use super::header::{EncodingKind, EzwHeader};
use super::traversal::Quadtree;
use super::EzwCode;
use crate::bitstream::{
    ArithmeticOutputBitStream, BitResult, BitStreamError, OutputBitStream, VecOutputBitStream,
};
use crate::encode::{huffman, rle};
use crate::utils::bits::{is_divisible_by_2, le_power_of_2, log2};
use crate::utils::error::{Result, WaveletError};
use crate::utils::matrix::Matrix;

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderParams {
    /// Fixed-point multiplier applied before rounding to integers.
    pub scale: u64,
    /// Maximum threshold passes, 0 for as many as the data needs.
    pub pass_limit: usize,
    /// Maximum bytes of EZW bit stream, 0 for unlimited.
    pub byte_budget: usize,
    pub encoding: EncodingKind,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self {
            scale: 1,
            pass_limit: 0,
            byte_budget: 0,
            encoding: EncodingKind::Huffman,
        }
    }
}

impl EncoderParams {
    pub fn validate(&self) -> Result<()> {
        if self.scale == 0 {
            return Err(WaveletError::config("scale must be positive"));
        }
        if self.encoding == EncodingKind::None {
            return Err(WaveletError::config(
                "encoding 'none' is not a valid output; use rle, huffman or arithmetic",
            ));
        }
        Ok(())
    }
}

/// Output of the threshold passes over one matrix, before entropy coding.
#[derive(Debug, Default)]
pub(crate) struct PassBits {
    pub bytes: Vec<u8>,
    /// Bits written by each dominant pass.
    pub dom_sizes: Vec<usize>,
    /// Bits written by each subordinate pass.
    pub sub_sizes: Vec<usize>,
}

impl PassBits {
    pub fn passes(&self) -> usize {
        self.dom_sizes.len()
    }
}

/// Working state of one encode: the mean-free coefficients, their zerotree
/// map and the magnitudes found significant so far.
pub(crate) struct PassCoder {
    quantized: Matrix<i64>,
    tree: Quadtree,
    map: Matrix<u64>,
    threshold: u64,
    sub_list: Vec<u64>,
}

impl PassCoder {
    pub fn new(quantized: Matrix<i64>, level: usize, threshold: u64) -> Self {
        let tree = Quadtree::new(quantized.rows(), quantized.cols(), level);
        let map = tree.zerotree_map(&quantized);
        PassCoder { quantized, tree, map, threshold, sub_list: Vec::new() }
    }

    fn encode_value<O: OutputBitStream>(&mut self, row: usize, col: usize, out: &mut O) -> BitResult<EzwCode> {
        let value = self.quantized[(row, col)];
        let magnitude = value.unsigned_abs();
        let code = if magnitude >= self.threshold {
            self.sub_list.push(magnitude);
            self.quantized[(row, col)] = 0;
            if value >= 0 { EzwCode::Positive } else { EzwCode::Negative }
        } else if self.threshold & self.map[(row, col)] != 0 {
            EzwCode::Zero
        } else {
            EzwCode::ZeroTree
        };
        if let Some((hi, lo)) = code.bits() {
            out.put_bit(hi)?;
            out.put_bit(lo)?;
        }
        Ok(code)
    }

    fn dominant_pass<O: OutputBitStream>(&mut self, out: &mut O) -> BitResult<()> {
        let tree = self.tree;
        let mut failure = None;
        tree.dominant_pass(1, 0, |cell| match self.encode_value(cell.row, cell.col, out) {
            Ok(code) => code,
            Err(e) => {
                failure = Some(e);
                EzwCode::Stop
            }
        });
        failure.map_or(Ok(()), Err)
    }

    fn subordinate_pass<O: OutputBitStream>(&self, out: &mut O) -> BitResult<()> {
        for &magnitude in &self.sub_list {
            out.put_bit(magnitude & self.threshold != 0)?;
        }
        Ok(())
    }

    /// Runs dominant and subordinate passes until the threshold reaches zero
    /// or `pass_limit` passes are written. With a `byte_budget` the stream
    /// ends at the budget and the interrupted pass counts as written.
    pub fn encode_passes(mut self, pass_limit: usize, byte_budget: usize) -> Result<PassBits> {
        let mut out = VecOutputBitStream::with_budget(byte_budget);
        let mut bits = PassBits::default();

        while self.threshold != 0 && (pass_limit == 0 || bits.passes() < pass_limit) {
            let start = out.in_bits();
            let dominant = self.dominant_pass(&mut out);
            let mid = out.in_bits();

            self.threshold >>= 1;
            let subordinate = match dominant {
                Ok(()) if self.threshold > 0 => self.subordinate_pass(&mut out),
                other => other,
            };
            bits.dom_sizes.push(mid - start);
            bits.sub_sizes.push(out.in_bits() - mid);
            debug!(
                "pass {}: threshold {}, {} dominant bits, {} subordinate bits",
                bits.passes() - 1,
                self.threshold << 1,
                mid - start,
                out.in_bits() - mid
            );

            match subordinate {
                Ok(()) => {}
                Err(BitStreamError::BudgetExceeded(budget)) => {
                    warn!(
                        "byte budget of {} bytes reached in pass {}, stream truncated",
                        budget,
                        bits.passes() - 1
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        out.flush()?;
        bits.bytes = out.into_bytes();
        Ok(bits)
    }
}

/// Quantizes `mat` and removes the rounded mean, returning the mean.
pub(crate) fn quantize(mat: &Matrix<f64>, scale: u64) -> (Matrix<i64>, i64) {
    let mut quantized = mat.quantize(scale);
    let total = quantized.as_slice().iter().fold(0i64, |a, &v| a.saturating_add(v));
    let mean = rounded_mean(total, quantized.len());
    subtract_mean(&mut quantized, mean);
    (quantized, mean)
}

pub(crate) fn rounded_mean(total: i64, count: usize) -> i64 {
    if count == 0 { 0 } else { (total as f64 / count as f64).round() as i64 }
}

pub(crate) fn subtract_mean(quantized: &mut Matrix<i64>, mean: i64) {
    for v in quantized.as_mut_slice() {
        *v = v.saturating_sub(mean);
    }
}

/// Largest magnitude, clamped so it survives an `i64` reduction.
pub(crate) fn abs_max(quantized: &Matrix<i64>) -> i64 {
    let max = quantized.as_slice().iter().map(|v| v.unsigned_abs()).max().unwrap_or(0);
    max.min(i64::MAX as u64) as i64
}

/// Resolves the transform level the coded matrix was built with. `None`
/// means as deep as the shorter side allows; deeper requests are clamped.
pub(crate) fn resolve_level(rows: usize, cols: usize, level: Option<usize>) -> Result<usize> {
    let max = log2(rows.min(cols));
    let level = level.map_or(max, |l| l.min(max));
    if rows == 0 || cols == 0 {
        return Err(WaveletError::config(format!("cannot encode a {}x{} matrix", rows, cols)));
    }
    if !is_divisible_by_2(rows, level) || !is_divisible_by_2(cols, level) {
        return Err(WaveletError::config(format!(
            "{}x{} matrix is not divisible by 2^{}",
            rows, cols, level
        )));
    }
    Ok(level)
}

/// Entropy codes `buffer` behind `header` and writes both to `out`.
///
/// `buffer` holds the EZW bit stream, or its run-length coding when
/// `rle_done` is set (the caller has then filled in `header.rle_size`).
/// Returns the total number of bytes written.
pub(crate) fn finish_encode<W: Write>(
    header: &mut EzwHeader,
    buffer: &[u8],
    rle_done: bool,
    out: &mut W,
) -> Result<usize> {
    let compressed;
    let rle_bytes = if rle_done {
        buffer
    } else {
        compressed = rle::compress(buffer);
        header.rle_size = compressed.len();
        &compressed[..]
    };

    let payload = match header.encoding {
        EncodingKind::Huffman => huffman::compress(rle_bytes)?,
        EncodingKind::Arithmetic => {
            let mut coder = ArithmeticOutputBitStream::new(Vec::new(), 0);
            coder.write_bits(rle_bytes, rle_bytes.len() << 3, 0)?;
            coder.finish()?
        }
        EncodingKind::Rle => rle_bytes.to_vec(),
        EncodingKind::None => {
            return Err(WaveletError::config("cannot finish a stream with encoding 'none'"));
        }
    };
    header.enc_size = match header.encoding {
        EncodingKind::Huffman | EncodingKind::Arithmetic => payload.len(),
        _ => 0,
    };

    let header_len = header.write(out)?;
    out.write_all(&payload)?;
    out.flush()?;
    info!("EZW encode: {}", header);
    Ok(header_len + payload.len())
}

/// Encodes transformed matrices.
///
/// ```no_run
/// use ezw_wavelet::encode::ezw::{EncoderParams, EzwEncoder};
/// use ezw_wavelet::utils::matrix::Matrix;
///
/// let coefficients = Matrix::<f64>::new(64, 64);
/// let encoder = EzwEncoder::new(EncoderParams { scale: 1000, ..Default::default() })?;
/// let mut out = Vec::new();
/// let header = encoder.encode(&coefficients, &mut out, None)?;
/// println!("{:.1}x smaller", header.compression_ratio());
/// # Ok::<(), ezw_wavelet::WaveletError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct EzwEncoder {
    params: EncoderParams,
}

impl EzwEncoder {
    pub fn new(params: EncoderParams) -> Result<Self> {
        params.validate()?;
        Ok(EzwEncoder { params })
    }

    pub fn params(&self) -> &EncoderParams {
        &self.params
    }

    /// Encodes `mat`, which holds wavelet coefficients transformed to
    /// `level`, and writes header and payload to `out`.
    pub fn encode<W: Write>(
        &self,
        mat: &Matrix<f64>,
        out: &mut W,
        level: Option<usize>,
    ) -> Result<EzwHeader> {
        self.params.validate()?;
        let level = resolve_level(mat.rows(), mat.cols(), level)?;

        let (quantized, mean) = quantize(mat, self.params.scale);
        let threshold = le_power_of_2(abs_max(&quantized) as u64);
        let mut header = EzwHeader::new(
            mat.rows(),
            mat.cols(),
            level,
            mean,
            self.params.scale,
            threshold,
            self.params.encoding,
        );

        let bits = PassCoder::new(quantized, level, threshold)
            .encode_passes(self.params.pass_limit, self.params.byte_budget)?;
        header.passes = bits.passes();
        header.ezw_size = bits.bytes.len();

        finish_encode(&mut header, &bits.bytes, false, out)?;
        Ok(header)
    }
}
