// src/encode/wavelet/parallel.rs

//! Wavelet transform over a matrix split into row blocks, one per rank.
//!
//! Row transforms are local. Column transforms need `half()` samples beyond
//! each end of the local block, so every level exchanges boundary rows with
//! the neighbouring ranks before filtering. The first and last rank mirror
//! their outer border exactly like the sequential [`DirectKernel`].
//!
//! After a forward transform each rank holds its own low and high bands, so
//! a plain gather interleaves the bands of different ranks. [`reassemble`]
//! restores the layout a sequential transform of the whole matrix produces.

use log::debug;

use super::direct::DirectKernel;
use super::filter_bank::FilterBank;
use super::Kernel1d;
use crate::comm::{Communicator, Tag, bytes_to_f64, wait_all};
use crate::utils::bits::{is_divisible_by_2, is_power_of_2};
use crate::utils::error::{Result, WaveletError};
use crate::utils::matrix::Matrix;

const TAG_FWT_UP: Tag = 0x0100;
const TAG_FWT_DOWN: Tag = 0x0101;
const TAG_IWT_UP: Tag = 0x0102;
const TAG_IWT_DOWN: Tag = 0x0103;

/// Halo rows in row-major order, `cols` values per row.
type Halo = Option<Vec<f64>>;

#[derive(Debug, Clone, Default)]
pub struct ParallelTransform {
    kernel: DirectKernel,
}

impl ParallelTransform {
    pub fn new(filter: FilterBank) -> Self {
        ParallelTransform { kernel: DirectKernel::new(filter) }
    }

    /// Deepest level that still needs only nearest-neighbour exchange.
    pub fn default_level(&self, local_rows: usize) -> usize {
        let h = self.kernel.filter().half();
        let mut rows = local_rows;
        let mut level = 0;
        while rows > h + 1 {
            rows >>= 1;
            level += 1;
        }
        level
    }

    fn check<C: Communicator + ?Sized>(&self, local: &Matrix<f64>, level: usize, comm: &C) -> Result<()> {
        if !is_power_of_2(comm.size()) {
            return Err(WaveletError::config(format!(
                "distributed transform needs a power-of-two rank count, got {}",
                comm.size()
            )));
        }
        if !is_divisible_by_2(local.rows(), level) || !is_divisible_by_2(local.cols(), level) {
            return Err(WaveletError::config(format!(
                "local block {}x{} is not divisible by 2^{}",
                local.rows(),
                local.cols(),
                level
            )));
        }
        let h = self.kernel.filter().half();
        if level > 0 && comm.size() > 1 && (local.rows() >> (level - 1)) < h + 2 {
            return Err(WaveletError::config(format!(
                "{} local rows are too few for a level {} distributed transform",
                local.rows(),
                level
            )));
        }
        Ok(())
    }

    /// Forward transform of this rank's block. `None` picks
    /// [`ParallelTransform::default_level`]. Returns the level used.
    pub fn forward<C: Communicator + ?Sized>(
        &self,
        local: &mut Matrix<f64>,
        level: Option<usize>,
        comm: &C,
    ) -> Result<usize> {
        let level = level.unwrap_or_else(|| self.default_level(local.rows()));
        self.check(local, level, comm)?;

        let mut temp = Vec::new();
        let mut column = Vec::new();
        for l in 0..level {
            let rows = local.rows() >> l;
            let cols = local.cols() >> l;
            for r in 0..rows {
                self.kernel.forward_1d_single(&mut local.row_mut(r)[..cols], &mut temp);
            }

            let (left, right) = self.fwt_exchange(local, rows, cols, comm)?;
            column.resize(rows, 0.0);
            for c in 0..cols {
                local.read_column(c, rows, &mut column);
                self.kernel.load(&column, false, &mut temp);
                self.extend_with_halos(&mut temp, rows, c, cols, &left, &right);
                self.kernel.convolve_forward(&temp, &mut column);
                local.write_column(c, rows, &column);
            }
        }
        debug!("rank {}: forward transform to level {}", comm.rank(), level);
        Ok(level)
    }

    /// Inverse of [`ParallelTransform::forward`] at the same level.
    pub fn inverse<C: Communicator + ?Sized>(
        &self,
        local: &mut Matrix<f64>,
        level: Option<usize>,
        comm: &C,
    ) -> Result<usize> {
        let level = level.unwrap_or_else(|| self.default_level(local.rows()));
        self.check(local, level, comm)?;

        let mut temp = Vec::new();
        let mut column = Vec::new();
        for l in (0..level).rev() {
            let rows = local.rows() >> l;
            let cols = local.cols() >> l;

            let (left, right) = self.iwt_exchange(local, rows, cols, comm)?;
            column.resize(rows, 0.0);
            for c in 0..cols {
                local.read_column(c, rows, &mut column);
                self.kernel.load(&column, true, &mut temp);
                self.extend_with_halos(&mut temp, rows, c, cols, &left, &right);
                self.kernel.convolve_inverse(&temp, &mut column);
                local.write_column(c, rows, &column);
            }

            for r in 0..rows {
                self.kernel.inverse_1d_single(&mut local.row_mut(r)[..cols], &mut temp);
            }
        }
        debug!("rank {}: inverse transform from level {}", comm.rank(), level);
        Ok(level)
    }

    fn extend_with_halos(
        &self,
        temp: &mut [f64],
        n: usize,
        col: usize,
        cols: usize,
        left: &Halo,
        right: &Halo,
    ) {
        let column_of = |halo: &Halo| -> Option<Vec<f64>> {
            halo.as_ref().map(|rows| rows.iter().skip(col).step_by(cols).copied().collect())
        };
        let left = column_of(left);
        let right = column_of(right);
        self.kernel.extend(temp, n, left.as_deref(), right.as_deref());
    }

    /// Sends the first `half()+1` rows up and the last `half()` rows down,
    /// receiving the matching halos from both neighbours.
    fn fwt_exchange<C: Communicator + ?Sized>(
        &self,
        local: &Matrix<f64>,
        rows: usize,
        cols: usize,
        comm: &C,
    ) -> Result<(Halo, Halo)> {
        let h = self.kernel.filter().half();
        let (rank, size) = (comm.rank(), comm.size());
        let has_left = rank > 0;
        let has_right = rank + 1 < size;

        let mut requests = Vec::new();
        if has_left {
            let up: Vec<usize> = (0..=h).collect();
            requests.push(comm.isend(rank - 1, TAG_FWT_UP, &pack_rows(local, &up, cols))?);
            requests.push(comm.irecv(rank - 1, TAG_FWT_DOWN));
        }
        if has_right {
            let down: Vec<usize> = (rows - h..rows).collect();
            requests.push(comm.isend(rank + 1, TAG_FWT_DOWN, &pack_rows(local, &down, cols))?);
            requests.push(comm.irecv(rank + 1, TAG_FWT_UP));
        }
        let received = wait_all(comm, requests)?;
        split_halos(received, has_left, has_right, h * cols, (h + 1) * cols)
    }

    /// Like [`Self::fwt_exchange`], but the halos are built from the band
    /// halves already interleaved, as the synthesis filter consumes them.
    fn iwt_exchange<C: Communicator + ?Sized>(
        &self,
        local: &Matrix<f64>,
        rows: usize,
        cols: usize,
        comm: &C,
    ) -> Result<(Halo, Halo)> {
        let h = self.kernel.filter().half();
        let half = rows / 2;
        let (rank, size) = (comm.rank(), comm.size());
        let has_left = rank > 0;
        let has_right = rank + 1 < size;
        let zipped = |k: usize, base: usize| if k % 2 == 0 { base + k / 2 } else { half + base + k / 2 };

        let mut requests = Vec::new();
        if has_left {
            // low0, high0, low1, high1, low2
            let up: Vec<usize> = (0..=h).map(|k| zipped(k, 0)).collect();
            requests.push(comm.isend(rank - 1, TAG_IWT_UP, &pack_rows(local, &up, cols))?);
            requests.push(comm.irecv(rank - 1, TAG_IWT_DOWN));
        }
        if has_right {
            let down: Vec<usize> = (0..h).map(|k| zipped(k, half - h / 2)).collect();
            requests.push(comm.isend(rank + 1, TAG_IWT_DOWN, &pack_rows(local, &down, cols))?);
            requests.push(comm.irecv(rank + 1, TAG_IWT_UP));
        }
        let received = wait_all(comm, requests)?;
        split_halos(received, has_left, has_right, h * cols, (h + 1) * cols)
    }

    /// Collects every rank's block at `root`, stacked in rank order.
    pub fn gather<C: Communicator + ?Sized>(
        local: &Matrix<f64>,
        comm: &C,
        root: usize,
    ) -> Result<Option<Matrix<f64>>> {
        let Some(parts) = comm.gather_bytes(bytemuck::cast_slice(local.as_slice()), root)? else {
            return Ok(None);
        };
        let mut data = Vec::with_capacity(local.len() * parts.len());
        for part in &parts {
            data.extend(bytes_to_f64(part)?);
        }
        let rows = data.len().checked_div(local.cols()).unwrap_or(0);
        Matrix::from_vec(rows, local.cols(), data).map(Some)
    }
}

fn pack_rows(local: &Matrix<f64>, rows: &[usize], cols: usize) -> Vec<u8> {
    let mut values = Vec::with_capacity(rows.len() * cols);
    for &r in rows {
        values.extend_from_slice(&local.row(r)[..cols]);
    }
    bytemuck::cast_slice(&values).to_vec()
}

fn split_halos(
    received: Vec<Option<Vec<u8>>>,
    has_left: bool,
    has_right: bool,
    left_len: usize,
    right_len: usize,
) -> Result<(Halo, Halo)> {
    // sends complete with no payload; the receives come out in posting order
    let mut payloads = received.into_iter().flatten();
    let mut take = |expected: usize| -> Result<Vec<f64>> {
        let bytes = payloads
            .next()
            .ok_or_else(|| WaveletError::Comm("missing halo".to_string()))?;
        let values = bytes_to_f64(&bytes)?;
        if values.len() != expected {
            return Err(WaveletError::Comm(format!(
                "halo of {} values, expected {}",
                values.len(),
                expected
            )));
        }
        Ok(values)
    };
    let left = if has_left { Some(take(left_len)?) } else { None };
    let right = if has_right { Some(take(right_len)?) } else { None };
    Ok((left, right))
}

/// Reorders the rows of a gathered forward transform of `procs` equal row
/// blocks taken to `level`, so that it matches the sequential layout.
pub fn reassemble(mat: &mut Matrix<f64>, procs: usize, level: usize) {
    if procs == 0 || level == 0 {
        return;
    }
    let cols = mat.cols();
    let block = mat.rows() / procs;
    let src = mat.clone();

    let mut copy = |dst_row: usize, src_row: usize, range: std::ops::Range<usize>| {
        mat.row_mut(dst_row)[range.clone()].copy_from_slice(&src.row(src_row)[range]);
    };

    let mut cstart = 0;
    for i in 0..level {
        // column band whose coarsest row split is at level - i
        let cend = cols >> (level - i - 1);
        let mut len = block >> (level - i);
        let mut row = 0;
        for p in 0..procs {
            for k in 0..len {
                copy(row, p * block + k, cstart..cend);
                row += 1;
            }
        }
        let mut offset = len;
        while len < block {
            for p in 0..procs {
                for k in 0..len {
                    copy(row, p * block + offset + k, cstart..cend);
                    row += 1;
                }
            }
            offset += len;
            len <<= 1;
        }
        cstart = cend;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalWorld;

    #[test]
    fn test_default_level() {
        let t = ParallelTransform::default();
        assert_eq!(t.default_level(128), 5);
        assert_eq!(t.default_level(8), 1);
        assert_eq!(t.default_level(4), 0);
    }

    #[test]
    fn test_reassemble_one_level() {
        // two ranks of four rows: [l0 l1 h0 h1] each
        let mut mat = Matrix::from_fn(8, 2, |i, _| i as f64);
        reassemble(&mut mat, 2, 1);
        let order: Vec<f64> = (0..8).map(|i| mat[(i, 0)]).collect();
        assert_eq!(order, vec![0.0, 1.0, 4.0, 5.0, 2.0, 3.0, 6.0, 7.0]);
    }

    #[test]
    fn test_single_rank_matches_direct() {
        use crate::encode::wavelet::Transform2d;
        let orig = Matrix::from_fn(32, 16, |i, j| (i * 3 + j) as f64 * 0.5 - (i * j) as f64 * 0.01);
        let results = LocalWorld::run(1, |comm| {
            let mut local = orig.clone();
            let level = ParallelTransform::default().forward(&mut local, Some(2), comm)?;
            Ok((level, local))
        })
        .unwrap();
        let mut seq = orig.clone();
        Transform2d::new(DirectKernel::default()).forward_2d(&mut seq, Some(2)).unwrap();
        assert_eq!(results[0].0, 2);
        assert_eq!(results[0].1, seq);
    }

    #[test]
    fn test_rejects_bad_layouts() {
        let results = LocalWorld::run(3, |comm| {
            let mut local = Matrix::new(16, 16);
            ParallelTransform::default().forward(&mut local, Some(1), comm)
        });
        assert!(matches!(results, Err(WaveletError::Config(_))));

        let results = LocalWorld::run(2, |comm| {
            let mut local = Matrix::new(8, 16);
            ParallelTransform::default().forward(&mut local, Some(3), comm)
        });
        assert!(matches!(results, Err(WaveletError::Config(_))));
    }
}
