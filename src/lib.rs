//! # EZW Wavelet Library
//!
//! Lossy compression of dense performance-data matrices (one row per
//! process, one column per time step) with a CDF 9/7 wavelet transform,
//! embedded zerotree wavelet (EZW) coding and a choice of entropy coders.
//!
//! This library is organized into several modules:
//! - `utils`: error handling, integer serialization, bit helpers and the dense matrix type
//! - `bitstream`: bit-level sinks and sources, including an arithmetic-coded stream
//! - `arithmetic_coder`: adaptive binary arithmetic coder driving the arithmetic stream
//! - `encode`: run-length and Huffman coders, wavelet transforms and the EZW codec
//! - `comm`: message passing between ranks for the distributed transform and encoder
//!
//! A typical sequential round trip:
//!
//! ```no_run
//! use ezw_wavelet::encode::ezw::{EncoderParams, EzwDecoder, EzwEncoder};
//! use ezw_wavelet::encode::wavelet::Transform2d;
//! use ezw_wavelet::utils::matrix::Matrix;
//!
//! let mut data = Matrix::from_fn(64, 256, |i, j| (i * j) as f64 * 0.01);
//! let transform = Transform2d::default();
//! let level = transform.forward_2d(&mut data, None)?;
//!
//! let mut file = Vec::new();
//! let encoder = EzwEncoder::new(EncoderParams { scale: 1000, ..Default::default() })?;
//! encoder.encode(&data, &mut file, Some(level))?;
//!
//! let mut decoded = EzwDecoder::default().decode(&mut file.as_slice())?;
//! transform.inverse_2d(&mut decoded.matrix, Some(decoded.level), None)?;
//! # Ok::<(), ezw_wavelet::WaveletError>(())
//! ```

// Re-export commonly used types at the crate root
pub use utils::error::{Result, WaveletError};

// Core modules
pub mod utils {
    pub mod bits;
    pub mod error;
    pub mod io;
    pub mod matrix;
}

pub mod arithmetic_coder;
pub mod bitstream;
pub mod comm;

pub mod encode {
    pub mod huffman;
    pub mod rle;
    pub mod wavelet;

    pub mod ezw;

    // Re-export the codec entry points
    pub use self::ezw::{
        DecodeOutput, DecoderParams, EncoderParams, EncodingKind, EzwDecoder, EzwEncoder,
        EzwHeader, MergeStrategy, ParallelEncoderParams, ParallelEzwEncoder,
    };
    pub use self::wavelet::{ParallelTransform, Transform2d, TransformKind};
}

// Public API exports
pub use comm::{Communicator, LocalWorld};
pub use utils::matrix::Matrix;

/// Version of the stream format written by [`encode::EzwEncoder`].
pub const FORMAT_VERSION: &str = "0.9.0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(FORMAT_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_root_exports() {
        let m: Matrix<f64> = Matrix::new(2, 2);
        assert_eq!(m.len(), 4);
        let err = WaveletError::Config("x".to_string());
        assert!(!err.is_recoverable());
    }
}
