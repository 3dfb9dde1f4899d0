//! Coordinator-side task distribution and the round barrier.

use log::{debug, warn};

use super::channel::{Channel, ChannelError};
use super::message::{Message, Rank};
use crate::design::{Candidate, EvaluationResult};

/// Coordinator side of the task farm.
///
/// Owns the per-round distribution loop: candidates go out one at a time to
/// whichever worker reports READY, results come back as DONE, and workers
/// that find the queue empty are parked with WAIT. The round is over once
/// every worker is parked: a worker can only be parked after its last DONE
/// was received, so a full waitlist implies a complete result set.
pub struct TaskFarm<C: Channel> {
    channel: C,
    world_size: usize,
    waitlist: Vec<Rank>,
}

impl<C: Channel> TaskFarm<C> {
    /// Create a farm over `world_size` endpoints (coordinator plus workers).
    ///
    /// Fails when the world holds no worker at all; nothing is sent in that
    /// case.
    pub fn new(channel: C, world_size: usize) -> Result<Self, FarmError> {
        if world_size < 2 {
            return Err(FarmError::WorldTooSmall(world_size));
        }
        Ok(Self {
            channel,
            world_size,
            waitlist: Vec::with_capacity(world_size - 1),
        })
    }

    /// Number of workers in the world.
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.world_size - 1
    }

    /// Distribute one round of candidates and block until the barrier
    /// closes. Returns every result the round produced; candidate order is
    /// immaterial.
    pub fn run_round(
        &mut self,
        candidates: Vec<Candidate>,
    ) -> Result<Vec<EvaluationResult>, FarmError> {
        debug_assert!(self.waitlist.is_empty(), "previous round was not released");

        let mut queue = candidates;
        let mut results = Vec::with_capacity(queue.len());

        while self.waitlist.len() < self.worker_count() {
            let (source, message) = self.channel.recv()?;
            match message {
                Message::Done(result) => {
                    debug!("Received DONE from worker {source}.");
                    results.push(result);
                }
                Message::Ready => {
                    debug!("Received READY from worker {source}.");
                    if let Some(candidate) = queue.pop() {
                        debug!("Send START to worker {source}.");
                        self.channel.send(source, Message::Start(candidate))?;
                    } else {
                        debug!("Send WAIT to worker {source}.");
                        self.channel.send(source, Message::Wait)?;
                        self.waitlist.push(source);
                    }
                }
                // Parked workers echo their status once per WAIT directive;
                // an echo from the previous round may surface here too.
                Message::Waiting => {
                    debug!("Received WAITING from worker {source}.");
                }
                other => {
                    warn!("Unexpected {other:?} from worker {source}.");
                }
            }
        }

        Ok(results)
    }

    /// Release every parked worker into the next round.
    pub fn release(&mut self) -> Result<(), FarmError> {
        for &worker in &self.waitlist {
            debug!("Send CONTINUE to worker {worker}.");
            self.channel.send(worker, Message::Continue)?;
        }
        self.waitlist.clear();
        Ok(())
    }

    /// Stop every worker, parked or not, and wait for each one's
    /// acknowledgment, so none is left blocked on a receive.
    pub fn shutdown(&mut self) -> Result<(), FarmError> {
        for worker in 1..self.world_size {
            debug!("Send STOP to worker {worker}.");
            self.channel.send(worker, Message::Stop)?;
        }
        self.waitlist.clear();

        let mut acknowledged = 0;
        while acknowledged < self.worker_count() {
            match self.channel.recv()? {
                (source, Message::Stopped) => {
                    debug!("Worker {source} stopped.");
                    acknowledged += 1;
                }
                // Status reports sent before the worker saw STOP may still
                // be queued ahead of its acknowledgment.
                (source, message) => {
                    debug!("Draining {message:?} from worker {source} during shutdown.");
                }
            }
        }
        Ok(())
    }
}

/// Task-farm failures.
#[derive(Debug, thiserror::Error)]
pub enum FarmError {
    #[error("need a coordinator and at least one worker, got a world of {0}")]
    WorldTooSmall(usize),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}
