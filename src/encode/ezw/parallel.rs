// src/encode/ezw/parallel.rs

//! EZW encoding of a row-distributed transform.
//!
//! Every rank codes the rows it owns with global statistics (mean and
//! threshold), then the per-rank streams are merged into one file written by
//! the root. Two merges are offered:
//!
//! - [`MergeStrategy::SequentialOrder`] splices the raw pass bits up an
//!   order-preserving binary tree so the result is bit-for-bit what the
//!   sequential encoder produces for the reassembled matrix.
//! - [`MergeStrategy::RadixBlock`] run-length codes each rank's stream
//!   locally and merges the coded buffers up the radix tree. The file then
//!   holds one byte-aligned block per rank in radix preorder.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use log::{debug, info};

use super::encoder::{
    EncoderParams, PassBits, PassCoder, abs_max, finish_encode, resolve_level, rounded_mean,
    subtract_mean,
};
use super::header::EzwHeader;
use crate::bitstream::{OutputBitStream, VecOutputBitStream};
use crate::comm::{Communicator, Tag, bs_relatives, bs_root, bytes_to_u64s, radix_relatives, wait_all};
use crate::encode::rle;
use crate::utils::bits::{is_power_of_2, le_power_of_2};
use crate::utils::error::{Result, WaveletError};
use crate::utils::matrix::Matrix;

const TAG_STITCH_SIZES: Tag = 0x0200;
const TAG_STITCH_BITS: Tag = 0x0201;
const TAG_RLE_GATHER: Tag = 0x0202;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Bit-stitch passes into a single-block stream.
    SequentialOrder,
    /// Merge locally run-length coded blocks.
    #[default]
    RadixBlock,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MergeStrategy::SequentialOrder => "sequential",
            MergeStrategy::RadixBlock => "radix",
        })
    }
}

impl FromStr for MergeStrategy {
    type Err = WaveletError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" | "sequential-order" => Ok(MergeStrategy::SequentialOrder),
            "radix" | "radix-block" => Ok(MergeStrategy::RadixBlock),
            other => Err(WaveletError::config(format!("unknown merge strategy '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParallelEncoderParams {
    pub base: EncoderParams,
    pub merge: MergeStrategy,
}

#[derive(Debug, Clone, Default)]
pub struct ParallelEzwEncoder {
    params: ParallelEncoderParams,
}

impl ParallelEzwEncoder {
    pub fn new(params: ParallelEncoderParams) -> Result<Self> {
        Self::validate(&params)?;
        Ok(ParallelEzwEncoder { params })
    }

    fn validate(params: &ParallelEncoderParams) -> Result<()> {
        params.base.validate()?;
        if params.base.byte_budget != 0 {
            return Err(WaveletError::config("byte budgets are not supported when encoding in parallel"));
        }
        Ok(())
    }

    pub fn params(&self) -> &ParallelEncoderParams {
        &self.params
    }

    /// Rank that writes the output for a world of `size` ranks.
    pub fn root(&self, size: usize) -> usize {
        match self.params.merge {
            MergeStrategy::SequentialOrder => bs_root(size),
            MergeStrategy::RadixBlock => 0,
        }
    }

    /// Encodes this rank's rows of a distributed transform. Every rank must
    /// call this with the same `level` and equally sized blocks of rows.
    ///
    /// Only the root writes to `out`; it gets the header back, every other
    /// rank gets `None`.
    pub fn encode<C, W>(
        &self,
        local: &Matrix<f64>,
        out: &mut W,
        level: Option<usize>,
        comm: &C,
    ) -> Result<Option<EzwHeader>>
    where
        C: Communicator + ?Sized,
        W: Write,
    {
        Self::validate(&self.params)?;
        let size = comm.size();
        if !is_power_of_2(size) {
            return Err(WaveletError::config(format!(
                "parallel encoding needs a power-of-two number of ranks, got {}",
                size
            )));
        }
        let level = resolve_level(local.rows(), local.cols(), level)?;
        let base = &self.params.base;

        // global mean and threshold
        let mut quantized = local.quantize(base.scale);
        let local_total = quantized.as_slice().iter().fold(0i64, |a, &v| a.saturating_add(v));
        let total = comm.all_reduce_sum_i64(local_total)?;
        let mean = rounded_mean(total, quantized.len() * size);
        subtract_mean(&mut quantized, mean);
        let max = comm.all_reduce_max_i64(abs_max(&quantized))?;
        let threshold = le_power_of_2(max as u64);

        let mut header = EzwHeader::new(
            local.rows() * size,
            local.cols(),
            level,
            mean,
            base.scale,
            threshold,
            base.encoding,
        );
        let bits = PassCoder::new(quantized, level, threshold).encode_passes(base.pass_limit, 0)?;
        header.passes = bits.passes();
        debug!(
            "rank {}: {} pass(es), {} bytes of local EZW bits",
            comm.rank(),
            bits.passes(),
            bits.bytes.len()
        );

        let header = match self.params.merge {
            MergeStrategy::SequentialOrder => bit_stitch_encode(bits, header, out, comm)?,
            MergeStrategy::RadixBlock => block_encode(bits, header, out, comm)?,
        };
        if let Some(header) = &header {
            info!("parallel EZW encode ({} merge over {} ranks): {}", self.params.merge, size, header);
        }
        Ok(header)
    }
}

/// Bits of pass `p`'s subordinate output that belong to entries first found
/// significant in pass `p`.
fn sub_chunk(sub_sizes: &[usize], p: usize) -> Result<usize> {
    let before = if p == 0 { 0 } else { sub_sizes[p - 1] };
    sub_sizes[p]
        .checked_sub(before)
        .ok_or_else(|| WaveletError::Comm(format!("subordinate list shrank in pass {}", p)))
}

/// Interleaves the passes of `parts`, given in row order, into one stream
/// laid out as if a single encoder had walked all of their rows.
fn stitch(parts: &[&PassBits], threshold: u64) -> Result<PassBits> {
    let passes = parts.first().map_or(0, |p| p.passes());
    let mut offsets = vec![0usize; parts.len()];
    let mut merged = VecOutputBitStream::new();
    let mut result = PassBits::default();
    let mut threshold = threshold;

    for i in 0..passes {
        for (part, offset) in parts.iter().zip(offsets.iter_mut()) {
            merged.write_bits(&part.bytes, part.dom_sizes[i], *offset)?;
            *offset += part.dom_sizes[i];
        }
        threshold >>= 1;
        if threshold != 0 {
            // the subordinate list is ordered by the pass that found each entry
            for p in 0..=i {
                for (part, offset) in parts.iter().zip(offsets.iter_mut()) {
                    let chunk = sub_chunk(&part.sub_sizes, p)?;
                    merged.write_bits(&part.bytes, chunk, *offset)?;
                    *offset += chunk;
                }
            }
        }
        result.dom_sizes.push(parts.iter().map(|p| p.dom_sizes[i]).sum());
        result.sub_sizes.push(parts.iter().map(|p| p.sub_sizes[i]).sum());
    }
    result.bytes = merged.into_bytes();
    Ok(result)
}

fn send_pass_bits<C: Communicator + ?Sized>(comm: &C, dest: usize, bits: &PassBits) -> Result<()> {
    let sizes: Vec<u64> = bits.dom_sizes.iter().chain(&bits.sub_sizes).map(|&n| n as u64).collect();
    comm.send_u64s(dest, TAG_STITCH_SIZES, &sizes)?;
    comm.send(dest, TAG_STITCH_BITS, &bits.bytes)
}

fn unpack_pass_bits(sizes: &[u8], bytes: Vec<u8>, passes: usize, source: usize) -> Result<PassBits> {
    let sizes = bytes_to_u64s(sizes)?;
    if sizes.len() != 2 * passes {
        return Err(WaveletError::Comm(format!(
            "rank {} sent sizes for {} passes, expected {}",
            source,
            sizes.len() / 2,
            passes
        )));
    }
    let (dom, sub) = sizes.split_at(passes);
    let bits = PassBits {
        bytes,
        dom_sizes: dom.iter().map(|&n| n as usize).collect(),
        sub_sizes: sub.iter().map(|&n| n as usize).collect(),
    };
    let total: usize = bits.dom_sizes.iter().chain(&bits.sub_sizes).sum();
    if total > bits.bytes.len() << 3 {
        return Err(WaveletError::Comm(format!(
            "rank {} sent {} bits in {} bytes",
            source,
            total,
            bits.bytes.len()
        )));
    }
    Ok(bits)
}

/// Reduces pass streams up the order-preserving tree, merging
/// `left, own, right` at every node.
fn bit_stitch_encode<C, W>(
    own: PassBits,
    mut header: EzwHeader,
    out: &mut W,
    comm: &C,
) -> Result<Option<EzwHeader>>
where
    C: Communicator + ?Sized,
    W: Write,
{
    let rels = bs_relatives(comm.rank(), comm.size());
    debug!("bit stitch {}", rels);
    let children: Vec<usize> = [rels.left, rels.right].into_iter().flatten().collect();

    let mut requests = Vec::new();
    for &child in &children {
        requests.push(comm.irecv(child, TAG_STITCH_SIZES));
        requests.push(comm.irecv(child, TAG_STITCH_BITS));
    }
    let mut received = wait_all(comm, requests)?.into_iter().map(Option::unwrap_or_default);
    let mut from_child = |child: usize| -> Result<PassBits> {
        let sizes = received.next().unwrap_or_default();
        let bytes = received.next().unwrap_or_default();
        unpack_pass_bits(&sizes, bytes, own.passes(), child)
    };
    let left = rels.left.map(&mut from_child).transpose()?;
    let right = rels.right.map(&mut from_child).transpose()?;

    let parts: Vec<&PassBits> = [left.as_ref(), Some(&own), right.as_ref()].into_iter().flatten().collect();
    let merged = stitch(&parts, header.threshold)?;

    match rels.parent {
        Some(parent) => {
            send_pass_bits(comm, parent, &merged)?;
            Ok(None)
        }
        None => {
            header.ezw_size = merged.bytes.len();
            let coded = rle::compress(&merged.bytes);
            header.rle_size = coded.len();
            finish_encode(&mut header, &coded, true, out)?;
            Ok(Some(header))
        }
    }
}

/// Merges run-length coded buffers up the radix tree in preorder
/// (own, left subtree, right subtree). The root gets the result.
fn rle_gather<C: Communicator + ?Sized>(comm: &C, own: Vec<u8>) -> Result<Option<Vec<u8>>> {
    let rels = radix_relatives(comm.rank(), comm.size());
    let children: Vec<usize> = [rels.left, rels.right].into_iter().flatten().collect();

    let requests = children.iter().map(|&c| comm.irecv(c, TAG_RLE_GATHER)).collect();
    let received: Vec<Vec<u8>> = wait_all(comm, requests)?
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect();

    let merged = if received.is_empty() {
        own
    } else {
        let mut buffers = vec![own.as_slice()];
        buffers.extend(received.iter().map(Vec::as_slice));
        rle::merge(&buffers)?
    };

    match rels.parent {
        Some(parent) => {
            comm.send(parent, TAG_RLE_GATHER, &merged)?;
            Ok(None)
        }
        None => Ok(Some(merged)),
    }
}

fn block_encode<C, W>(
    own: PassBits,
    mut header: EzwHeader,
    out: &mut W,
    comm: &C,
) -> Result<Option<EzwHeader>>
where
    C: Communicator + ?Sized,
    W: Write,
{
    header.blocks = comm.size();
    let total = comm.reduce_sum_usize(own.bytes.len(), 0)?;
    let coded = rle::compress(&own.bytes);
    let gathered = rle_gather(comm, coded)?;

    match (total, gathered) {
        (Some(total), Some(gathered)) => {
            header.ezw_size = total;
            header.rle_size = gathered.len();
            finish_encode(&mut header, &gathered, true, out)?;
            Ok(Some(header))
        }
        _ => Ok(None),
    }
}
