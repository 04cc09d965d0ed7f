// src/utils/matrix.rs

//! Dense row-major matrices and the error metrics used to judge a
//! reconstruction against its original.

use std::io::{self, BufRead, Write};
use std::ops::{Index, IndexMut, Range};

use crate::utils::error::{Result, WaveletError};

/// A dense, row-major 2D array.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> Matrix<T> {
    /// Creates a `rows x cols` matrix filled with `T::default()`.
    pub fn new(rows: usize, cols: usize) -> Self {
        Matrix { rows, cols, data: vec![T::default(); rows * cols] }
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Matrix { rows, cols, data }
    }

    /// Wraps an existing row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(WaveletError::config(format!(
                "buffer of {} values cannot form a {}x{} matrix",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Matrix { rows, cols, data })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn in_bounds(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Copies the first `len` entries of column `col` into `buf`.
    pub fn read_column(&self, col: usize, len: usize, buf: &mut [T]) {
        for (i, slot) in buf[..len].iter_mut().enumerate() {
            *slot = self.data[i * self.cols + col];
        }
    }

    /// Inverse of [`Matrix::read_column`].
    pub fn write_column(&mut self, col: usize, len: usize, buf: &[T]) {
        for (i, &value) in buf[..len].iter().enumerate() {
            self.data[i * self.cols + col] = value;
        }
    }

    /// Copy of the rows in `range`.
    pub fn row_block(&self, range: Range<usize>) -> Self {
        let rows = range.len();
        Matrix {
            rows,
            cols: self.cols,
            data: self.data[range.start * self.cols..range.end * self.cols].to_vec(),
        }
    }

    /// Stacks matrices with equal column counts on top of each other.
    pub fn vstack(blocks: &[Matrix<T>]) -> Result<Self> {
        let cols = blocks.first().map_or(0, |m| m.cols);
        if blocks.iter().any(|m| m.cols != cols) {
            return Err(WaveletError::config("cannot stack matrices with different widths"));
        }
        let rows = blocks.iter().map(|m| m.rows).sum();
        let mut data = Vec::with_capacity(rows * cols);
        for block in blocks {
            data.extend_from_slice(&block.data);
        }
        Ok(Matrix { rows, cols, data })
    }

    pub fn map<U: Copy + Default>(&self, f: impl Fn(T) -> U) -> Matrix<U> {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }
}

impl<T> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &T {
        &self.data[row * self.cols + col]
    }
}

impl<T> IndexMut<(usize, usize)> for Matrix<T> {
    #[inline]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        &mut self.data[row * self.cols + col]
    }
}

impl Matrix<f64> {
    /// Fixed-point quantization: `round(v * scale)`, NaN becomes zero.
    pub fn quantize(&self, scale: u64) -> Matrix<i64> {
        let scale = scale as f64;
        self.map(|v| if v.is_nan() { 0 } else { (v * scale).round() as i64 })
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn abs_max(&self) -> f64 {
        self.data.iter().fold(0.0, |m: f64, v| m.max(v.abs()))
    }

    /// Rescales the matrix to zero mean and unit standard deviation.
    pub fn standardize(&mut self) {
        let n = self.data.len() as f64;
        if n == 0.0 {
            return;
        }
        let sum: f64 = self.data.iter().sum();
        let sum2: f64 = self.data.iter().map(|v| v * v).sum();
        let mean = sum / n;
        let std_dev_inv = 1.0 / (sum2 / n - mean * mean).sqrt();
        for v in &mut self.data {
            *v = (*v - mean) * std_dev_inv;
        }
    }

    /// Reads whitespace separated values, one matrix row per line.
    pub fn read_text<R: BufRead>(input: R) -> Result<Self> {
        let mut data = Vec::new();
        let mut cols = None;
        let mut rows = 0;
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let start = data.len();
            for token in line.split_whitespace() {
                let value: f64 = token.parse().map_err(|_| {
                    WaveletError::corrupt(format!("'{}' is not a number (row {})", token, rows))
                })?;
                data.push(value);
            }
            let width = data.len() - start;
            match cols {
                None => cols = Some(width),
                Some(c) if c != width => {
                    return Err(WaveletError::corrupt(format!(
                        "row {} has {} columns, expected {}",
                        rows, width, c
                    )));
                }
                _ => {}
            }
            rows += 1;
        }
        Matrix::from_vec(rows, cols.unwrap_or(0), data)
    }

    pub fn write_text<W: Write>(&self, mut out: W) -> io::Result<()> {
        for i in 0..self.rows {
            let line: Vec<String> = self.row(i).iter().map(|v| v.to_string()).collect();
            writeln!(out, "{}", line.join(" "))?;
        }
        out.flush()
    }
}

impl From<&Matrix<i64>> for Matrix<f64> {
    fn from(m: &Matrix<i64>) -> Self {
        m.map(|v| v as f64)
    }
}

/// Accumulated squared error and value ranges of a comparison.
#[derive(Debug, Clone, Copy)]
pub struct ErrorSummary {
    pub sum_squares: f64,
    pub orig_max: f64,
    pub orig_min: f64,
    pub repro_max: f64,
    pub repro_min: f64,
    pub count: usize,
}

impl ErrorSummary {
    pub fn of(orig: &Matrix<f64>, repro: &Matrix<f64>) -> Result<Self> {
        if orig.rows != repro.rows || orig.cols != repro.cols {
            return Err(WaveletError::config(format!(
                "cannot compare {}x{} with {}x{}",
                orig.rows, orig.cols, repro.rows, repro.cols
            )));
        }
        let mut summary = ErrorSummary {
            sum_squares: 0.0,
            orig_max: f64::NEG_INFINITY,
            orig_min: f64::INFINITY,
            repro_max: f64::NEG_INFINITY,
            repro_min: f64::INFINITY,
            count: orig.data.len(),
        };
        for (&o, &r) in orig.data.iter().zip(&repro.data) {
            let diff = r - o;
            summary.sum_squares += diff * diff;
            summary.orig_max = summary.orig_max.max(o);
            summary.orig_min = summary.orig_min.min(o);
            summary.repro_max = summary.repro_max.max(r);
            summary.repro_min = summary.repro_min.min(r);
        }
        Ok(summary)
    }

    pub fn rmse(&self) -> f64 {
        if self.count == 0 { 0.0 } else { (self.sum_squares / self.count as f64).sqrt() }
    }

    fn normalized(&self, range: f64) -> f64 {
        let rmse = self.rmse();
        if rmse == 0.0 { 0.0 } else { rmse / range }
    }
}

/// Root mean squared error.
pub fn rmse(orig: &Matrix<f64>, repro: &Matrix<f64>) -> Result<f64> {
    Ok(ErrorSummary::of(orig, repro)?.rmse())
}

/// RMSE divided by the value range of `orig`.
pub fn nrmse(orig: &Matrix<f64>, repro: &Matrix<f64>) -> Result<f64> {
    let s = ErrorSummary::of(orig, repro)?;
    Ok(s.normalized(s.orig_max - s.orig_min))
}

/// Peak signal to noise ratio in dB; infinite for an exact match.
pub fn psnr(orig: &Matrix<f64>, repro: &Matrix<f64>) -> Result<f64> {
    let s = ErrorSummary::of(orig, repro)?;
    Ok(20.0 * ((s.orig_max - s.orig_min) / s.rmse()).log10())
}

/// Symmetric NRMSE, range taken over both matrices.
pub fn similarity(orig: &Matrix<f64>, repro: &Matrix<f64>) -> Result<f64> {
    let s = ErrorSummary::of(orig, repro)?;
    let range = s.orig_max.max(s.repro_max) - s.orig_min.min(s.repro_min);
    Ok(s.normalized(range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    #[test]
    fn test_indexing_and_columns() {
        let mut m = Matrix::from_fn(3, 4, |i, j| (i * 10 + j) as f64);
        assert_eq!(m[(2, 3)], 23.0);
        let mut col = vec![0.0; 3];
        m.read_column(1, 3, &mut col);
        assert_eq!(col, vec![1.0, 11.0, 21.0]);
        col.iter_mut().for_each(|v| *v = -*v);
        m.write_column(1, 2, &col);
        assert_eq!(m[(0, 1)], -1.0);
        assert_eq!(m[(1, 1)], -11.0);
        assert_eq!(m[(2, 1)], 21.0);
    }

    #[test]
    fn test_vstack_and_blocks() {
        let m = Matrix::from_fn(4, 2, |i, j| (i * 2 + j) as f64);
        let top = m.row_block(0..1);
        let bottom = m.row_block(1..4);
        assert_eq!(Matrix::vstack(&[top, bottom]).unwrap(), m);
        assert!(Matrix::vstack(&[Matrix::<f64>::new(1, 2), Matrix::new(1, 3)]).is_err());
    }

    #[test]
    fn test_quantize_rounds_and_zeroes_nan() {
        let m = Matrix::from_vec(1, 4, vec![1.2345, -0.0006, f64::NAN, 2.5]).unwrap();
        let q = m.quantize(1000);
        assert_eq!(q.as_slice(), &[1235, -1, 0, 2500]);
    }

    #[test]
    fn test_metrics() {
        let orig = Matrix::from_vec(1, 4, vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(nrmse(&orig, &orig).unwrap(), 0.0);
        assert!(psnr(&orig, &orig).unwrap().is_infinite());

        let repro = Matrix::from_vec(1, 4, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_relative_eq!(rmse(&orig, &repro).unwrap(), 1.0);
        assert_relative_eq!(nrmse(&orig, &repro).unwrap(), 1.0 / 3.0);
        assert_relative_eq!(similarity(&orig, &repro).unwrap(), 0.25);
        assert_relative_eq!(psnr(&orig, &repro).unwrap(), 20.0 * 3f64.log10());
        assert!(nrmse(&orig, &Matrix::new(2, 2)).is_err());
    }

    #[test]
    fn test_standardize() {
        let mut m = Matrix::from_vec(1, 4, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        m.standardize();
        assert_relative_eq!(m.sum(), 0.0, epsilon = 1e-12);
        let var: f64 = m.as_slice().iter().map(|v| v * v).sum::<f64>() / 4.0;
        assert_relative_eq!(var, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_text_round_trip() {
        let m = Matrix::from_fn(3, 2, |i, j| i as f64 - 0.5 * j as f64);
        let mut buf = Vec::new();
        m.write_text(&mut buf).unwrap();
        let back = Matrix::read_text(Cursor::new(buf)).unwrap();
        assert_eq!(back, m);

        let ragged = "1 2 3\n4 5\n";
        assert!(matches!(
            Matrix::read_text(Cursor::new(ragged)),
            Err(WaveletError::Corrupt(_))
        ));
    }
}
