// src/comm/local.rs

//! In-process ranks backed by channels, one thread per rank.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, Sender, channel};

use log::debug;

use super::{Communicator, Tag};
use crate::utils::error::{Result, WaveletError};

#[derive(Debug)]
struct Envelope {
    source: usize,
    tag: Tag,
    payload: Vec<u8>,
}

/// One rank of a group of threads exchanging messages over channels.
///
/// A rank holds no sender to itself, so a receive fails instead of hanging
/// once every peer has gone away.
pub struct LocalWorld {
    rank: usize,
    size: usize,
    peers: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    // messages that arrived before anyone asked for them
    stash: RefCell<VecDeque<Envelope>>,
}

impl LocalWorld {
    /// Creates `size` connected ranks.
    pub fn create(size: usize) -> Vec<LocalWorld> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| channel()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalWorld {
                rank,
                size,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(dest, tx)| (dest != rank).then(|| tx.clone()))
                    .collect(),
                inbox,
                stash: RefCell::new(VecDeque::new()),
            })
            .collect()
    }

    /// Runs `f` on `size` ranks, each on its own thread, and returns the
    /// results in rank order. The first error wins.
    pub fn run<T, F>(size: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&LocalWorld) -> Result<T> + Sync,
    {
        if size == 0 {
            return Err(WaveletError::config("a world needs at least one rank"));
        }
        debug!("starting {} local ranks", size);
        let f = &f;
        std::thread::scope(|scope| {
            let handles: Vec<_> = LocalWorld::create(size)
                .into_iter()
                .map(|world| scope.spawn(move || f(&world)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(WaveletError::Comm("rank panicked".to_string())))
                })
                .collect()
        })
    }

    fn take_stashed(&self, source: usize, tag: Tag) -> Option<Vec<u8>> {
        let mut stash = self.stash.borrow_mut();
        let pos = stash.iter().position(|e| e.source == source && e.tag == tag)?;
        stash.remove(pos).map(|e| e.payload)
    }
}

impl Communicator for LocalWorld {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: usize, tag: Tag, payload: &[u8]) -> Result<()> {
        let envelope = Envelope { source: self.rank, tag, payload: payload.to_vec() };
        if dest == self.rank {
            self.stash.borrow_mut().push_back(envelope);
            return Ok(());
        }
        let peer = self
            .peers
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or_else(|| WaveletError::Comm(format!("no rank {} in a world of {}", dest, self.size)))?;
        peer.send(envelope)
            .map_err(|_| WaveletError::Comm(format!("rank {} has exited", dest)))
    }

    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        if source >= self.size {
            return Err(WaveletError::Comm(format!("no rank {} in a world of {}", source, self.size)));
        }
        if let Some(payload) = self.take_stashed(source, tag) {
            return Ok(payload);
        }
        loop {
            let envelope = self.inbox.recv().map_err(|_| {
                WaveletError::Comm(format!(
                    "rank {} waiting on rank {} (tag {:#x}) but all peers exited",
                    self.rank, source, tag
                ))
            })?;
            if envelope.source == source && envelope.tag == tag {
                return Ok(envelope.payload);
            }
            self.stash.borrow_mut().push_back(envelope);
        }
    }
}
