// src/encode/wavelet/mod.rs

//! Discrete wavelet transforms.
//!
//! A [`Kernel1d`] transforms one contiguous sequence in place, leaving the
//! low band in the first half and the high band in the second. Two kernels
//! compute the same CDF 9/7 transform: [`DirectKernel`] by convolution over
//! a symmetric extension, and [`LiftingKernel`] by lifting steps.
//! [`Transform2d`] applies a kernel to the rows and columns of a matrix, and
//! [`ParallelTransform`] does the same over row blocks spread across ranks.

use std::fmt;
use std::str::FromStr;

use crate::utils::error::WaveletError;

pub mod direct;
pub mod filter_bank;
pub mod lifting;
pub mod parallel;
pub mod transform;

pub use direct::DirectKernel;
pub use filter_bank::FilterBank;
pub use lifting::LiftingKernel;
pub use parallel::{ParallelTransform, reassemble};
pub use transform::Transform2d;

/// One-dimensional forward/inverse wavelet step.
///
/// `temp` is scratch space the kernel may resize; callers reuse it between
/// calls to avoid allocating per row.
pub trait Kernel1d: Send + Sync {
    /// Transforms `data` (even length) into `[low | high]`.
    fn forward_1d_single(&self, data: &mut [f64], temp: &mut Vec<f64>);

    /// Undoes [`Kernel1d::forward_1d_single`].
    fn inverse_1d_single(&self, data: &mut [f64], temp: &mut Vec<f64>);
}

/// Selects the 1D kernel behind a [`Transform2d`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformKind {
    Direct,
    #[default]
    Lifting,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformKind::Direct => write!(f, "direct"),
            TransformKind::Lifting => write!(f, "lifting"),
        }
    }
}

impl FromStr for TransformKind {
    type Err = WaveletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(TransformKind::Direct),
            "lifting" | "lift" => Ok(TransformKind::Lifting),
            other => Err(WaveletError::config(format!("unknown transform '{}'", other))),
        }
    }
}
