// src/encode/ezw/mod.rs

//! Embedded zerotree wavelet coding of transformed matrices.
//!
//! The encoder quantizes a transformed matrix, removes its mean and emits
//! alternating dominant and subordinate passes while halving a power-of-two
//! threshold. The decoder replays the same traversal from the bits alone.
//! The bit stream is then run-length coded and optionally Huffman or
//! arithmetic coded, behind a self-describing [`EzwHeader`].

pub mod decoder;
pub mod encoder;
pub mod header;
pub mod parallel;
pub mod traversal;

pub use decoder::{DecodeOutput, DecoderParams, EzwDecoder};
pub use encoder::{EncoderParams, EzwEncoder};
pub use header::{EncodingKind, EzwHeader};
pub use parallel::{MergeStrategy, ParallelEncoderParams, ParallelEzwEncoder};
pub use traversal::Quadtree;

/// Symbol emitted for one cell in a dominant pass.
///
/// Each symbol takes two bits: the first says whether the cell became
/// significant, the second carries its sign or whether any descendant may
/// still be significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EzwCode {
    /// `11`
    Positive,
    /// `10`
    Negative,
    /// `01`: insignificant, but some descendant is not.
    Zero,
    /// `00`: the cell and all of its descendants are insignificant.
    ZeroTree,
    /// Abort the traversal. Never written to a stream.
    Stop,
}

impl EzwCode {
    /// The two bits that encode this symbol, or `None` for [`EzwCode::Stop`].
    pub fn bits(self) -> Option<(bool, bool)> {
        match self {
            EzwCode::Positive => Some((true, true)),
            EzwCode::Negative => Some((true, false)),
            EzwCode::Zero => Some((false, true)),
            EzwCode::ZeroTree => Some((false, false)),
            EzwCode::Stop => None,
        }
    }

    pub fn from_bits(hi: bool, lo: bool) -> Self {
        match (hi, lo) {
            (true, true) => EzwCode::Positive,
            (true, false) => EzwCode::Negative,
            (false, true) => EzwCode::Zero,
            (false, false) => EzwCode::ZeroTree,
        }
    }
}
