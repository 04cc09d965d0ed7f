// src/encode/huffman.rs

//! Static Huffman coding over a byte alphabet.
//!
//! The compressed buffer starts with the code tree in preorder (an internal
//! node is a `0` bit, a leaf is a `1` bit followed by its 8-bit symbol),
//! followed by the codes of the input bytes, MSB first. The decoder is told
//! the uncompressed length, so no end-of-block symbol is stored.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use log::debug;

use crate::bitstream::{BitStreamError, InputBitStream, OutputBitStream, VecInputBitStream, VecOutputBitStream};
use crate::utils::error::{Result, WaveletError};

/// Upper bound on the compressed size of `len` input bytes.
pub fn max_compressed_len(len: usize) -> usize {
    len * 101 / 100 + 384
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf(u8),
    Internal(usize, usize),
}

/// Code tree stored as an arena; the root is the last node.
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn build(histogram: &[usize; 256]) -> Self {
        let mut nodes = Vec::with_capacity(511);
        let mut heap = BinaryHeap::new();
        for (symbol, &count) in histogram.iter().enumerate() {
            if count > 0 {
                heap.push(Reverse((count, nodes.len())));
                nodes.push(Node::Leaf(symbol as u8));
            }
        }
        // A lone symbol still needs a one-bit code.
        if nodes.len() == 1 {
            if let Node::Leaf(symbol) = nodes[0] {
                heap.push(Reverse((0, 1)));
                nodes.push(Node::Leaf(symbol.wrapping_add(1)));
            }
        }

        while heap.len() > 1 {
            let (Some(Reverse((c0, a))), Some(Reverse((c1, b)))) = (heap.pop(), heap.pop()) else {
                break;
            };
            heap.push(Reverse((c0 + c1, nodes.len())));
            nodes.push(Node::Internal(a, b));
        }
        Tree { nodes }
    }

    fn root(&self) -> usize {
        self.nodes.len() - 1
    }

    fn write<O: OutputBitStream>(&self, out: &mut O) -> Result<()> {
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            match self.nodes[id] {
                Node::Leaf(symbol) => {
                    out.put_one()?;
                    out.write_bits(&[symbol], 8, 0)?;
                }
                Node::Internal(left, right) => {
                    out.put_zero()?;
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        Ok(())
    }

    fn read<I: InputBitStream>(input: &mut I) -> Result<Self> {
        // Children are filled in once both subtrees have been read.
        let mut nodes: Vec<Node> = Vec::with_capacity(511);
        let mut pending: Vec<(usize, Option<usize>)> = Vec::new();
        let mut leaves = 0usize;
        loop {
            let id = nodes.len();
            if input.get_bit()? {
                let mut symbol = 0u8;
                for _ in 0..8 {
                    symbol = (symbol << 1) | u8::from(input.get_bit()?);
                }
                nodes.push(Node::Leaf(symbol));
                leaves += 1;
                if leaves > 256 {
                    return Err(WaveletError::corrupt("Huffman tree has more than 256 leaves"));
                }
            } else {
                nodes.push(Node::Internal(0, 0));
                pending.push((id, None));
                continue;
            }

            // Attach the completed subtree `child` to its waiting parents.
            let mut child = id;
            loop {
                match pending.last_mut() {
                    None => {
                        // Re-root so the root is the last node, like `build` produces.
                        let root = nodes[child];
                        nodes.push(root);
                        return Ok(Tree { nodes });
                    }
                    Some((_, left @ None)) => {
                        *left = Some(child);
                        break;
                    }
                    Some((parent, Some(left))) => {
                        let (parent, left) = (*parent, *left);
                        nodes[parent] = Node::Internal(left, child);
                        pending.pop();
                        child = parent;
                    }
                }
            }
        }
    }

    /// `(code, length)` for every symbol present in the tree.
    fn codes(&self) -> Vec<Option<(u128, u8)>> {
        let mut codes = vec![None; 256];
        let mut stack = vec![(self.root(), 0u128, 0u8)];
        while let Some((id, code, len)) = stack.pop() {
            match self.nodes[id] {
                Node::Leaf(symbol) => codes[usize::from(symbol)] = Some((code, len)),
                Node::Internal(left, right) => {
                    stack.push((right, (code << 1) | 1, len + 1));
                    stack.push((left, code << 1, len + 1));
                }
            }
        }
        codes
    }
}

/// Compresses `input`. Empty input yields empty output.
pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    if input.is_empty() {
        return Ok(Vec::new());
    }
    let mut histogram = [0usize; 256];
    for &b in input {
        histogram[usize::from(b)] += 1;
    }
    let tree = Tree::build(&histogram);
    let codes = tree.codes();

    let mut out = VecOutputBitStream::new();
    tree.write(&mut out)?;
    for &b in input {
        let Some((code, len)) = codes[usize::from(b)] else {
            return Err(WaveletError::corrupt("symbol missing from Huffman tree"));
        };
        for i in (0..len).rev() {
            out.put_bit((code >> i) & 1 == 1)?;
        }
    }
    out.next_byte()?;
    let out = out.into_bytes();
    debug!("Huffman: {} -> {} bytes", input.len(), out.len());
    Ok(out)
}

/// Expands `input` back into exactly `out_len` bytes.
pub fn uncompress(input: &[u8], out_len: usize) -> Result<Vec<u8>> {
    if out_len == 0 {
        return Ok(Vec::new());
    }
    let mut bits = VecInputBitStream::new(input);
    let truncated = |_: BitStreamError| WaveletError::corrupt("Huffman stream truncated");

    let tree = Tree::read(&mut bits).map_err(|e| match e {
        WaveletError::Io(_) => WaveletError::corrupt("Huffman tree truncated"),
        other => other,
    })?;

    let mut out = Vec::with_capacity(out_len);
    let root = tree.root();
    while out.len() < out_len {
        let mut id = root;
        loop {
            match tree.nodes[id] {
                Node::Leaf(symbol) => {
                    out.push(symbol);
                    break;
                }
                Node::Internal(left, right) => {
                    id = if bits.get_bit().map_err(truncated)? { right } else { left };
                }
            }
        }
    }
    Ok(out)
}
