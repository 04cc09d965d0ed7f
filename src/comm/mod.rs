// src/comm/mod.rs

//! Message passing between ranks.
//!
//! The codec only needs tagged point-to-point byte messages; every collective
//! here has a default built on top of [`Communicator::send`] and
//! [`Communicator::recv`]. Messages between one pair of ranks with the same tag
//! arrive in the order they were sent. Collectives must be called by every
//! rank in the same order.

use byteorder::{ByteOrder, LittleEndian};

use crate::utils::error::{Result, WaveletError};

pub mod local;
pub mod tree;

pub use local::LocalWorld;
pub use tree::{RadixIterator, Relatives, bs_relatives, bs_root, radix_relatives};

pub type Tag = u32;

/// Tags at or above this value are reserved for collectives.
pub const RESERVED_TAGS: Tag = 0xFFFF_0000;
const TAG_GATHER: Tag = RESERVED_TAGS;
const TAG_BROADCAST: Tag = RESERVED_TAGS + 1;

/// Handle for a posted non-blocking operation.
#[must_use = "a request must be waited on before its buffer is used"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Sends complete as soon as they are posted.
    Complete,
    Recv { source: usize, tag: Tag },
}

impl Request {
    /// Blocks until the operation completes. Receives yield their payload.
    pub fn wait<C: Communicator + ?Sized>(self, comm: &C) -> Result<Option<Vec<u8>>> {
        match self {
            Request::Complete => Ok(None),
            Request::Recv { source, tag } => comm.recv(source, tag).map(Some),
        }
    }
}

/// Waits on every request in order.
pub fn wait_all<C: Communicator + ?Sized>(
    comm: &C,
    requests: Vec<Request>,
) -> Result<Vec<Option<Vec<u8>>>> {
    requests.into_iter().map(|r| r.wait(comm)).collect()
}

/// Decodes a payload of native-endian `f64`s.
pub fn bytes_to_f64(bytes: &[u8]) -> Result<Vec<f64>> {
    if bytes.len() % 8 != 0 {
        return Err(WaveletError::Comm(format!(
            "payload of {} bytes is not a whole number of f64 values",
            bytes.len()
        )));
    }
    let mut values = vec![0.0f64; bytes.len() / 8];
    bytemuck::cast_slice_mut::<f64, u8>(&mut values).copy_from_slice(bytes);
    Ok(values)
}

pub fn u64s_to_bytes(values: &[u64]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len() * 8];
    LittleEndian::write_u64_into(values, &mut bytes);
    bytes
}

pub fn bytes_to_u64s(bytes: &[u8]) -> Result<Vec<u64>> {
    if bytes.len() % 8 != 0 {
        return Err(WaveletError::Comm(format!(
            "payload of {} bytes is not a whole number of u64 values",
            bytes.len()
        )));
    }
    let mut values = vec![0u64; bytes.len() / 8];
    LittleEndian::read_u64_into(bytes, &mut values);
    Ok(values)
}

/// A group of ranks that can exchange messages.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Sends `payload` to `dest`. Never blocks.
    fn send(&self, dest: usize, tag: Tag, payload: &[u8]) -> Result<()>;

    /// Blocks until a message from `source` with `tag` arrives.
    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>>;

    fn isend(&self, dest: usize, tag: Tag, payload: &[u8]) -> Result<Request> {
        self.send(dest, tag, payload)?;
        Ok(Request::Complete)
    }

    fn irecv(&self, source: usize, tag: Tag) -> Request {
        Request::Recv { source, tag }
    }

    fn send_f64(&self, dest: usize, tag: Tag, values: &[f64]) -> Result<()> {
        self.send(dest, tag, bytemuck::cast_slice(values))
    }

    fn recv_f64(&self, source: usize, tag: Tag) -> Result<Vec<f64>> {
        bytes_to_f64(&self.recv(source, tag)?)
    }

    fn send_u64s(&self, dest: usize, tag: Tag, values: &[u64]) -> Result<()> {
        self.send(dest, tag, &u64s_to_bytes(values))
    }

    fn recv_u64s(&self, source: usize, tag: Tag) -> Result<Vec<u64>> {
        bytes_to_u64s(&self.recv(source, tag)?)
    }

    /// Collects every rank's `data` at `root`, in rank order.
    fn gather_bytes(&self, data: &[u8], root: usize) -> Result<Option<Vec<Vec<u8>>>> {
        if self.rank() != root {
            self.send(root, TAG_GATHER, data)?;
            return Ok(None);
        }
        let mut all = Vec::with_capacity(self.size());
        for source in 0..self.size() {
            if source == root {
                all.push(data.to_vec());
            } else {
                all.push(self.recv(source, TAG_GATHER)?);
            }
        }
        Ok(Some(all))
    }

    /// Returns `root`'s `data` on every rank.
    fn broadcast_bytes(&self, data: &[u8], root: usize) -> Result<Vec<u8>> {
        if self.rank() == root {
            for dest in (0..self.size()).filter(|&d| d != root) {
                self.send(dest, TAG_BROADCAST, data)?;
            }
            Ok(data.to_vec())
        } else {
            self.recv(root, TAG_BROADCAST)
        }
    }

    fn all_reduce_sum_i64(&self, value: i64) -> Result<i64> {
        all_reduce_i64(self, value, i64::saturating_add)
    }

    fn all_reduce_max_i64(&self, value: i64) -> Result<i64> {
        all_reduce_i64(self, value, i64::max)
    }

    /// Sum of `value` over all ranks, delivered to `root` only.
    fn reduce_sum_usize(&self, value: usize, root: usize) -> Result<Option<usize>> {
        let parts = self.gather_bytes(&u64s_to_bytes(&[value as u64]), root)?;
        match parts {
            None => Ok(None),
            Some(parts) => {
                let mut total = 0usize;
                for part in parts {
                    total += bytes_to_u64s(&part)?.first().copied().unwrap_or(0) as usize;
                }
                Ok(Some(total))
            }
        }
    }
}

fn all_reduce_i64<C: Communicator + ?Sized>(
    comm: &C,
    value: i64,
    op: impl Fn(i64, i64) -> i64,
) -> Result<i64> {
    let reduced = match comm.gather_bytes(&value.to_le_bytes(), 0)? {
        Some(parts) => {
            let mut acc: Option<i64> = None;
            for part in parts {
                let v = LittleEndian::read_i64(part.get(..8).ok_or_else(|| {
                    WaveletError::Comm("short all-reduce contribution".to_string())
                })?);
                acc = Some(acc.map_or(v, |a| op(a, v)));
            }
            acc.unwrap_or(value)
        }
        None => 0,
    };
    let bytes = comm.broadcast_bytes(&reduced.to_le_bytes(), 0)?;
    let bytes = bytes
        .get(..8)
        .ok_or_else(|| WaveletError::Comm("short all-reduce result".to_string()))?;
    Ok(LittleEndian::read_i64(bytes))
}
