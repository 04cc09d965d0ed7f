// src/comm/tree.rs

//! Reduction trees over ranks `0..size`.
//!
//! Two shapes are used. The binary-search tree keeps rank order: an in-order
//! walk visits ranks ascending, so merging `left, self, right` at every node
//! preserves row order. The radix tree is rooted at rank 0 and its preorder
//! walk is what [`RadixIterator`] yields.

use std::fmt;

/// Neighbours of one node in a reduction tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relatives {
    pub parent: Option<usize>,
    pub node: usize,
    pub left: Option<usize>,
    pub right: Option<usize>,
}

impl fmt::Display for Relatives {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |r: Option<usize>| r.map_or_else(|| "-".to_string(), |r| r.to_string());
        write!(
            f,
            "[{}: parent {}, left {}, right {}]",
            self.node,
            show(self.parent),
            show(self.left),
            show(self.right)
        )
    }
}

/// Finds `target` in the balanced binary-search tree over `low..=high`.
pub fn binary_relative_search(
    mut low: usize,
    mut high: usize,
    target: usize,
    mut parent: Option<usize>,
) -> Relatives {
    debug_assert!(low <= target && target <= high);
    loop {
        let pos = low + (high - low) / 2;
        if target == pos {
            let left = (pos > low).then(|| low + (pos - 1 - low) / 2);
            let right = (pos < high).then(|| pos + 1 + (high - (pos + 1)) / 2);
            return Relatives { parent, node: pos, left, right };
        }
        parent = Some(pos);
        if target < pos {
            high = pos - 1;
        } else {
            low = pos + 1;
        }
    }
}

/// Relatives of `rank` in the order-preserving tree over `0..size`.
pub fn bs_relatives(rank: usize, size: usize) -> Relatives {
    binary_relative_search(0, size - 1, rank, None)
}

/// Root of the order-preserving tree over `0..size`.
pub fn bs_root(size: usize) -> usize {
    (size - 1) / 2
}

/// Index of the highest set bit; `n` must be non-zero.
fn msb(n: usize) -> u32 {
    usize::BITS - 1 - n.leading_zeros()
}

fn radix_child(rank: usize, child: usize) -> usize {
    let r = rank + 1;
    let m = msb(r);
    ((1 << (m + 1)) | (child << m) | (r & ((1 << m) - 1))) - 1
}

fn radix_parent(rank: usize) -> Option<usize> {
    let r = rank + 1;
    let m = msb(r);
    if m == 0 {
        return None;
    }
    Some(((1 << (m - 1)) | (r & ((1 << (m - 1)) - 1))) - 1)
}

/// Relatives of `rank` in the radix tree over `0..size`.
pub fn radix_relatives(rank: usize, size: usize) -> Relatives {
    let in_range = |r: usize| (r < size).then_some(r);
    Relatives {
        parent: radix_parent(rank).and_then(in_range),
        node: rank,
        left: in_range(radix_child(rank, 0)),
        right: in_range(radix_child(rank, 1)),
    }
}

/// Preorder walk of the radix tree over `0..size`: node, left, right.
#[derive(Debug, Clone)]
pub struct RadixIterator {
    size: usize,
    path: Vec<usize>,
}

impl RadixIterator {
    pub fn new(size: usize) -> Self {
        let path = if size > 0 { vec![0] } else { Vec::new() };
        RadixIterator { size, path }
    }
}

impl Iterator for RadixIterator {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let rank = self.path.pop()?;
        let rels = radix_relatives(rank, self.size);
        self.path.extend(rels.right);
        self.path.extend(rels.left);
        Some(rank)
    }
}
