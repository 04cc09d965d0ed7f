// src/encode/wavelet/transform.rs

//! Separable 2D transform built from a 1D kernel.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use log::debug;

use super::direct::DirectKernel;
use super::lifting::LiftingKernel;
use super::{Kernel1d, TransformKind};
use crate::utils::bits::{is_divisible_by_2, log2};
use crate::utils::error::{Result, WaveletError};
use crate::utils::matrix::Matrix;

/// Applies a [`Kernel1d`] to every row, then every column, once per level.
/// Each level only subdivides the low-low quadrant of the previous one.
pub struct Transform2d {
    kernel: Box<dyn Kernel1d>,
}

impl Transform2d {
    pub fn new<K: Kernel1d + 'static>(kernel: K) -> Self {
        Transform2d { kernel: Box::new(kernel) }
    }

    pub fn from_kind(kind: TransformKind) -> Self {
        match kind {
            TransformKind::Direct => Self::new(DirectKernel::default()),
            TransformKind::Lifting => Self::new(LiftingKernel),
        }
    }

    /// Deepest level a `rows x cols` matrix supports.
    pub fn max_level(rows: usize, cols: usize) -> usize {
        log2(rows.min(cols))
    }

    fn resolve_level(mat: &Matrix<f64>, level: Option<usize>) -> Result<usize> {
        let max = Self::max_level(mat.rows(), mat.cols());
        let level = level.unwrap_or(max);
        if level > max {
            return Err(WaveletError::config(format!(
                "level {} exceeds the maximum {} for a {}x{} matrix",
                level,
                max,
                mat.rows(),
                mat.cols()
            )));
        }
        if !is_divisible_by_2(mat.rows(), level) || !is_divisible_by_2(mat.cols(), level) {
            return Err(WaveletError::config(format!(
                "{}x{} matrix is not divisible by 2^{}",
                mat.rows(),
                mat.cols(),
                level
            )));
        }
        Ok(level)
    }

    /// Forward transform in place. `None` transforms as deep as possible.
    /// Returns the level applied.
    pub fn forward_2d(&self, mat: &mut Matrix<f64>, level: Option<usize>) -> Result<usize> {
        let level = Self::resolve_level(mat, level)?;
        let (mut rows, mut cols) = (mat.rows(), mat.cols());
        for _ in 0..level {
            if cols > 1 {
                self.rows_pass(mat, rows, cols, false);
            }
            if rows > 1 {
                self.cols_pass(mat, rows, cols, false);
            }
            rows = (rows >> 1).max(1);
            cols = (cols >> 1).max(1);
        }
        debug!("forward 2D transform of {}x{} to level {}", mat.rows(), mat.cols(), level);
        Ok(level)
    }

    /// Undoes up to `iwt_level` of the `fwt_level` levels of a forward
    /// transform, coarsest first. `None` means all of them. Returns the number
    /// of levels undone.
    pub fn inverse_2d(
        &self,
        mat: &mut Matrix<f64>,
        fwt_level: Option<usize>,
        iwt_level: Option<usize>,
    ) -> Result<usize> {
        let fwt_level = Self::resolve_level(mat, fwt_level)?;
        let iwt_level = iwt_level.unwrap_or(fwt_level).min(fwt_level);
        for i in (fwt_level - iwt_level..fwt_level).rev() {
            let rows = (mat.rows() >> i).max(1);
            let cols = (mat.cols() >> i).max(1);
            if rows > 1 {
                self.cols_pass(mat, rows, cols, true);
            }
            if cols > 1 {
                self.rows_pass(mat, rows, cols, true);
            }
        }
        Ok(iwt_level)
    }

    fn apply(&self, data: &mut [f64], temp: &mut Vec<f64>, inverse: bool) {
        if inverse {
            self.kernel.inverse_1d_single(data, temp);
        } else {
            self.kernel.forward_1d_single(data, temp);
        }
    }

    /// Transforms the first `cols` entries of the first `rows` rows.
    fn rows_pass(&self, mat: &mut Matrix<f64>, rows: usize, cols: usize, inverse: bool) {
        let stride = mat.cols();
        let data = &mut mat.as_mut_slice()[..rows * stride];

        #[cfg(feature = "rayon")]
        data.par_chunks_mut(stride)
            .for_each_init(Vec::new, |temp, row| self.apply(&mut row[..cols], temp, inverse));

        #[cfg(not(feature = "rayon"))]
        {
            let mut temp = Vec::new();
            for row in data.chunks_mut(stride) {
                self.apply(&mut row[..cols], &mut temp, inverse);
            }
        }
    }

    /// Transforms the first `rows` entries of the first `cols` columns.
    fn cols_pass(&self, mat: &mut Matrix<f64>, rows: usize, cols: usize, inverse: bool) {
        let mut column = vec![0.0; rows];
        let mut temp = Vec::new();
        for c in 0..cols {
            mat.read_column(c, rows, &mut column);
            self.apply(&mut column, &mut temp, inverse);
            mat.write_column(c, rows, &column);
        }
    }
}

impl Default for Transform2d {
    fn default() -> Self {
        Self::from_kind(TransformKind::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::matrix::nrmse;

    const TOLERANCE: f64 = 1e-4;

    fn sample(rows: usize, cols: usize) -> Matrix<f64> {
        Matrix::from_fn(rows, cols, |i, j| {
            let (i, j) = (i as f64, j as f64);
            ((i * 7.0 + j * 3.0) % 5.0) * 0.1 + i + 0.4 * i * i - 0.02 * i * i * j
        })
    }

    #[test]
    fn test_round_trip_both_kernels() {
        for kind in [TransformKind::Direct, TransformKind::Lifting] {
            let t = Transform2d::from_kind(kind);
            for (rows, cols) in [(16, 16), (32, 64), (128, 16)] {
                let orig = sample(rows, cols);
                let mut mat = orig.clone();
                let level = t.forward_2d(&mut mat, None).unwrap();
                assert_eq!(level, log2(rows.min(cols)));
                t.inverse_2d(&mut mat, Some(level), None).unwrap();
                let err = nrmse(&orig, &mat).unwrap();
                assert!(err <= TOLERANCE, "{} {}x{}: {}", kind, rows, cols, err);
            }
        }
    }

    #[test]
    fn test_kernels_agree() {
        let direct = Transform2d::from_kind(TransformKind::Direct);
        let lifting = Transform2d::from_kind(TransformKind::Lifting);
        for (rows, cols) in [(16, 16), (64, 32)] {
            let orig = sample(rows, cols);
            let mut a = orig.clone();
            let mut b = orig.clone();
            direct.forward_2d(&mut a, Some(2)).unwrap();
            lifting.forward_2d(&mut b, Some(2)).unwrap();
            let err = nrmse(&a, &b).unwrap();
            assert!(err <= TOLERANCE, "{}x{}: {}", rows, cols, err);
        }
    }

    #[test]
    fn test_partial_inverse_restores_coarse_band() {
        let t = Transform2d::default();
        let orig = sample(32, 32);
        let mut full = orig.clone();
        t.forward_2d(&mut full, Some(3)).unwrap();

        // undo two of three levels, then compare against a one-level transform
        let mut partial = full.clone();
        assert_eq!(t.inverse_2d(&mut partial, Some(3), Some(2)).unwrap(), 2);
        let mut one = orig.clone();
        t.forward_2d(&mut one, Some(1)).unwrap();
        let err = nrmse(&one, &partial).unwrap();
        assert!(err <= TOLERANCE, "{}", err);
    }

    #[test]
    fn test_level_validation() {
        let t = Transform2d::default();
        let mut mat = sample(16, 8);
        assert!(matches!(t.forward_2d(&mut mat, Some(4)), Err(WaveletError::Config(_))));
        let mut odd = sample(12, 16);
        assert!(t.forward_2d(&mut odd, Some(3)).is_err());
        assert_eq!(t.forward_2d(&mut odd, Some(2)).unwrap(), 2);
    }
}
