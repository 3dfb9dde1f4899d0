//! Point-to-point messaging between a coordinator and a fixed set of workers.
//!
//! The [`Channel`] trait is the transport seam: the task-farm protocol only
//! ever sends to a rank and blocks on receive, so any transport with
//! per-sender FIFO ordering can stand in. [`MpscChannel`] is the in-process
//! implementation used by the binary, wiring every endpoint to its peers
//! with `std::sync::mpsc`.

use std::sync::mpsc::{self, Receiver, Sender};

use super::message::{Message, Rank};

/// Blocking point-to-point transport between the endpoints of one world.
pub trait Channel {
    /// Send a message to the endpoint at `to`.
    fn send(&self, to: Rank, message: Message) -> Result<(), ChannelError>;

    /// Block until a message arrives; returns the sender's rank with it.
    fn recv(&self) -> Result<(Rank, Message), ChannelError>;
}

/// In-process transport over `std::sync::mpsc`.
///
/// Per-sender FIFO ordering is guaranteed by mpsc, which the round barrier
/// relies on: a worker's DONE is always received before the READY that
/// follows it. An endpoint holds no route to itself, so its inbox dies with
/// its peers.
pub struct MpscChannel {
    rank: Rank,
    peers: Vec<Option<Sender<(Rank, Message)>>>,
    inbox: Receiver<(Rank, Message)>,
}

impl MpscChannel {
    /// Wire a world of `world_size` endpoints, one per rank. Rank 0 is the
    /// coordinator by convention; the caller hands the rest to workers.
    pub fn world(world_size: usize) -> Vec<MpscChannel> {
        let mut senders = Vec::with_capacity(world_size);
        let mut inboxes = Vec::with_capacity(world_size);
        for _ in 0..world_size {
            let (tx, rx) = mpsc::channel();
            senders.push(tx);
            inboxes.push(rx);
        }
        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| {
                let peers = senders
                    .iter()
                    .enumerate()
                    .map(|(peer, tx)| (peer != rank).then(|| tx.clone()))
                    .collect();
                MpscChannel { rank, peers, inbox }
            })
            .collect()
    }

    /// This endpoint's rank.
    #[inline]
    pub fn rank(&self) -> Rank {
        self.rank
    }
}

impl Channel for MpscChannel {
    fn send(&self, to: Rank, message: Message) -> Result<(), ChannelError> {
        let peer = self
            .peers
            .get(to)
            .and_then(|p| p.as_ref())
            .ok_or(ChannelError::NoRoute(to))?;
        peer.send((self.rank, message))
            .map_err(|_| ChannelError::Disconnected)
    }

    fn recv(&self) -> Result<(Rank, Message), ChannelError> {
        self.inbox.recv().map_err(|_| ChannelError::Disconnected)
    }
}

/// Transport failures.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("no route to rank {0}")]
    NoRoute(Rank),
    #[error("peer endpoint disconnected")]
    Disconnected,
}
