// src/encode/ezw/traversal.rs

//! Quad-tree shape of a transformed matrix and the dominant-pass walk.
//!
//! Cells of the lowest frequency band (the roots) have three children, one in
//! each detail band of the coarsest level: `(r, c + low_cols)`,
//! `(r + low_rows, c)` and `(r + low_rows, c + low_cols)`. Every other cell
//! `(r, c)` has the four children `(2r..2r+2, 2c..2c+2)` when those exist.

use super::EzwCode;
use crate::utils::bits::le_power_of_2;
use crate::utils::matrix::Matrix;

/// A cell visited by a dominant pass. `depth` is 0 for roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quadtree {
    pub rows: usize,
    pub cols: usize,
    pub low_rows: usize,
    pub low_cols: usize,
}

impl Quadtree {
    /// Shape of a `rows x cols` matrix transformed to `level`.
    pub fn new(rows: usize, cols: usize, level: usize) -> Self {
        Quadtree {
            rows,
            cols,
            low_rows: (rows >> level).max(1),
            low_cols: (cols >> level).max(1),
        }
    }

    #[inline]
    pub fn is_root(&self, row: usize, col: usize) -> bool {
        row < self.low_rows && col < self.low_cols
    }

    #[inline]
    fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    /// Children of a root in the order a stack must receive them.
    fn root_children(&self, row: usize, col: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let (lr, lc) = (self.low_rows, self.low_cols);
        [(row + lr, col + lc), (row + lr, col), (row, col + lc)]
            .into_iter()
            .filter(move |&(r, c)| self.contains(r, c))
    }

    /// Children of a non-root cell, in stack order.
    fn node_children(&self, row: usize, col: usize) -> Option<[(usize, usize); 4]> {
        let (r, c) = (row << 1, col << 1);
        self.contains(r, c).then_some([(r + 1, c + 1), (r + 1, c), (r, c + 1), (r, c)])
    }

    /// Walks the roots of `block` (one of `blocks` equal row slabs of the
    /// lowest band) row-major, descending depth-first into each root's
    /// tree before moving on. The children of a non-root cell are skipped
    /// when `visit` returns [`EzwCode::ZeroTree`].
    ///
    /// Returns `false` if `visit` returned [`EzwCode::Stop`].
    pub fn dominant_pass<F>(&self, blocks: usize, block: usize, mut visit: F) -> bool
    where
        F: FnMut(Cell) -> EzwCode,
    {
        let slab = self.low_rows / blocks.max(1);
        let start_row = slab * block;
        let end_row = start_row + slab;

        let mut stack = Vec::with_capacity(slab * self.low_cols + 4 * self.rows.max(self.cols));
        for row in (start_row..end_row).rev() {
            for col in (0..self.low_cols).rev() {
                stack.push(Cell { row, col, depth: 0 });
            }
        }

        while let Some(cell) = stack.pop() {
            let code = visit(cell);
            #[cfg(feature = "debug-logging")]
            log::trace!("({}, {}) depth {}: {:?}", cell.row, cell.col, cell.depth, code);

            if code == EzwCode::Stop {
                return false;
            }
            let depth = cell.depth + 1;
            if cell.depth == 0 {
                stack.extend(
                    self.root_children(cell.row, cell.col)
                        .map(|(row, col)| Cell { row, col, depth }),
                );
            } else if code != EzwCode::ZeroTree {
                if let Some(children) = self.node_children(cell.row, cell.col) {
                    stack.extend(children.into_iter().map(|(row, col)| Cell { row, col, depth }));
                }
            }
        }
        true
    }

    /// Builds the zerotree map of `quantized`: each cell holds the largest
    /// power of two not above its magnitude, OR-ed with the map values of all
    /// of its descendants. A set bit `k` means some cell in the subtree has
    /// magnitude of at least `2^k`.
    pub fn zerotree_map(&self, quantized: &Matrix<i64>) -> Matrix<u64> {
        let mut map = quantized.map(|v| le_power_of_2(v.unsigned_abs()));
        for row in 0..self.low_rows {
            for col in 0..self.low_cols {
                self.fold_subtree(&mut map, row, col);
            }
        }
        map
    }

    fn fold_subtree(&self, map: &mut Matrix<u64>, row: usize, col: usize) -> u64 {
        let mut bits = map[(row, col)];
        if self.is_root(row, col) {
            for (r, c) in self.root_children(row, col) {
                bits |= self.fold_subtree(map, r, c);
            }
        } else if let Some(children) = self.node_children(row, col) {
            for (r, c) in children {
                bits |= self.fold_subtree(map, r, c);
            }
        }
        map[(row, col)] = bits;
        bits
    }
}
