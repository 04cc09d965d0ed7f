// src/encode/rle.rs

//! Byte-oriented run-length coding with an escape marker.
//!
//! The first output byte is the marker, chosen as the least frequent byte of
//! the input (lowest value on ties). After it, the stream is a sequence of
//! tokens:
//!
//! - any byte other than the marker stands for itself
//! - `marker, n` with `n <= 2` stands for `n + 1` marker bytes
//! - `marker, n, sym` with `3 <= n < 128` stands for `n + 1` copies of `sym`
//! - `marker, 0x80 | hi, lo, sym` stands for `((hi << 8) | lo) + 1` copies
//!
//! Runs are capped at [`MAX_RUN`] bytes, so the count always fits in 15 bits.
//!
//! Besides plain compression this module can re-derive a marker across several
//! compressed buffers and splice them together ([`merge`]), working on the
//! token stream instead of the uncompressed bytes.

use crate::utils::error::{Result, WaveletError};

/// Longest run a single token can describe.
pub const MAX_RUN: usize = 32_768;

/// Worst-case compressed size for `len` input bytes.
pub fn max_compressed_len(len: usize) -> usize {
    (len * 257).div_ceil(256) + 1
}

fn write_rep(out: &mut Vec<u8>, marker: u8, symbol: u8, count: usize) {
    debug_assert!((1..=MAX_RUN).contains(&count));
    if count <= 3 {
        if symbol == marker {
            out.push(marker);
            out.push((count - 1) as u8);
        } else {
            out.extend(std::iter::repeat_n(symbol, count));
        }
    } else {
        let count = count - 1;
        out.push(marker);
        if count >= 128 {
            out.push(((count >> 8) as u8) | 0x80);
        }
        out.push((count & 0xff) as u8);
        out.push(symbol);
    }
}

fn write_non_rep(out: &mut Vec<u8>, marker: u8, symbol: u8) {
    out.push(symbol);
    if symbol == marker {
        out.push(0);
    }
}

/// Emits an arbitrarily long run, splitting it into tokens of at most `MAX_RUN`.
fn write_run(out: &mut Vec<u8>, marker: u8, symbol: u8, mut count: usize) {
    while count > 1 {
        let n = count.min(MAX_RUN);
        write_rep(out, marker, symbol, n);
        count -= n;
    }
    if count == 1 {
        write_non_rep(out, marker, symbol);
    }
}

/// Lowest byte value with the smallest count.
fn least_frequent(histogram: &[usize; 256]) -> u8 {
    let mut marker = 0usize;
    for (i, &n) in histogram.iter().enumerate().skip(1) {
        if n < histogram[marker] {
            marker = i;
        }
    }
    marker as u8
}

/// Iterator over the `(symbol, run length)` tokens of a compressed payload.
///
/// Consecutive literal bytes with the same value are folded into one run.
pub struct Tokens<'a> {
    input: &'a [u8],
    marker: u8,
    pos: usize,
}

impl<'a> Tokens<'a> {
    /// `payload` is the token stream without the leading marker byte.
    pub fn new(payload: &'a [u8], marker: u8) -> Self {
        Tokens { input: payload, marker, pos: 0 }
    }

    /// Splits a full compressed buffer into its marker and tokens.
    pub fn of(buffer: &'a [u8]) -> Self {
        match buffer.split_first() {
            Some((&marker, payload)) => Tokens::new(payload, marker),
            None => Tokens::new(&[], 0),
        }
    }

    fn byte(&mut self) -> Result<u8> {
        let b = self
            .input
            .get(self.pos)
            .copied()
            .ok_or_else(|| WaveletError::corrupt("RLE token truncated"))?;
        self.pos += 1;
        Ok(b)
    }

    fn parse(&mut self) -> Result<(u8, usize)> {
        let symbol = self.byte()?;
        if symbol != self.marker {
            let mut count = 1;
            while self.input.get(self.pos) == Some(&symbol) {
                self.pos += 1;
                count += 1;
            }
            return Ok((symbol, count));
        }

        let mut count = usize::from(self.byte()?);
        if count <= 2 {
            return Ok((self.marker, count + 1));
        }
        if count & 0x80 != 0 {
            count = ((count & 0x7f) << 8) | usize::from(self.byte()?);
        }
        let symbol = self.byte()?;
        Ok((symbol, count + 1))
    }
}

impl Iterator for Tokens<'_> {
    type Item = Result<(u8, usize)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.input.len() {
            return None;
        }
        let token = self.parse();
        if token.is_err() {
            self.pos = self.input.len();
        }
        Some(token)
    }
}

/// Compresses `input`. Empty input yields empty output.
pub fn compress(input: &[u8]) -> Vec<u8> {
    if input.is_empty() {
        return Vec::new();
    }
    let mut histogram = [0usize; 256];
    for &b in input {
        histogram[usize::from(b)] += 1;
    }
    let marker = least_frequent(&histogram);

    let mut out = Vec::with_capacity(max_compressed_len(input.len()));
    out.push(marker);

    let mut i = 0;
    while i < input.len() {
        let symbol = input[i];
        let mut run = 1;
        while run < MAX_RUN && i + run < input.len() && input[i + run] == symbol {
            run += 1;
        }
        if run == 1 {
            write_non_rep(&mut out, marker, symbol);
        } else {
            write_rep(&mut out, marker, symbol, run);
        }
        i += run;
    }
    out
}

/// Expands a buffer produced by [`compress`] or [`merge`].
pub fn uncompress(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 2);
    for token in Tokens::of(input) {
        let (symbol, count) = token?;
        out.extend(std::iter::repeat_n(symbol, count));
    }
    Ok(out)
}

/// Adds the symbol counts encoded in `buffer` to `histogram` without expanding it.
pub fn add_to_histogram(histogram: &mut [usize; 256], buffer: &[u8]) -> Result<()> {
    for token in Tokens::of(buffer) {
        let (symbol, count) = token?;
        histogram[usize::from(symbol)] += count;
    }
    Ok(())
}

/// Re-encodes a token payload (no leading marker byte) from `old_marker` to
/// `new_marker`. The result has no leading marker byte either.
pub fn rewrite(payload: &[u8], old_marker: u8, new_marker: u8) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(max_compressed_len(payload.len()));
    for token in Tokens::new(payload, old_marker) {
        let (symbol, count) = token?;
        write_run(&mut out, new_marker, symbol, count);
    }
    Ok(out)
}

/// Joins compressed buffers into one buffer that uncompresses to the
/// concatenation of their contents.
///
/// A single marker is chosen from the combined histogram, and runs that
/// continue across buffer boundaries are coalesced. Buffers shorter than two
/// bytes carry no data and are skipped.
pub fn merge(buffers: &[&[u8]]) -> Result<Vec<u8>> {
    let mut histogram = [0usize; 256];
    for buffer in buffers {
        add_to_histogram(&mut histogram, buffer)?;
    }
    let marker = least_frequent(&histogram);

    let total: usize = buffers.iter().map(|b| b.len()).sum();
    let mut out = Vec::with_capacity(max_compressed_len(total));
    out.push(marker);

    let mut current: Option<(u8, usize)> = None;
    for buffer in buffers.iter().filter(|b| b.len() >= 2) {
        for token in Tokens::of(buffer) {
            let (symbol, count) = token?;
            current = match current {
                Some((s, c)) if s == symbol => Some((s, c + count)),
                Some((s, c)) => {
                    write_run(&mut out, marker, s, c);
                    Some((symbol, count))
                }
                None => Some((symbol, count)),
            };
        }
    }

    match current {
        Some((s, c)) => {
            write_run(&mut out, marker, s, c);
            Ok(out)
        }
        None => Ok(Vec::new()),
    }
}
