//! Worker agent: pulls candidates, evaluates them, reports results.

use log::{debug, warn};

use super::channel::Channel;
use super::coordinator::FarmError;
use super::message::{COORDINATOR, Message, Rank};
use crate::design::EvaluationResult;
use crate::eval::Evaluator;

/// Worker lifecycle state, mirrored by the coordinator's waitlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Requesting work.
    Ready,
    /// Parked until the round is decided.
    Waiting,
    /// Shutting down.
    Stopped,
}

/// One worker agent.
///
/// Runs a report/receive loop against the coordinator: announce the current
/// status, block for a directive, act on it. Evaluator failures are reported
/// as a sentinel result instead of ending the loop; a diverging solver run
/// must not take the worker down with it.
pub struct Worker<C: Channel, E: Evaluator> {
    rank: Rank,
    channel: C,
    evaluator: E,
}

impl<C: Channel, E: Evaluator> Worker<C, E> {
    /// Create a worker. Identity is explicit; nothing is read from ambient
    /// state.
    pub fn new(rank: Rank, channel: C, evaluator: E) -> Self {
        Self {
            rank,
            channel,
            evaluator,
        }
    }

    /// Run until the coordinator sends STOP. The final status report is the
    /// stop acknowledgment.
    pub fn run(mut self) -> Result<(), FarmError> {
        let mut status = WorkerStatus::Ready;
        loop {
            self.report(status)?;
            let (_, directive) = self.channel.recv()?;
            match directive {
                Message::Start(candidate) => {
                    debug!(
                        "Worker {}: received START for cell ({}, {}).",
                        self.rank, candidate.row, candidate.col
                    );
                    let fitness = match self.evaluator.evaluate(&candidate.matrix) {
                        Ok(value) => Some(value),
                        Err(err) => {
                            warn!(
                                "Worker {}: evaluation of cell ({}, {}) failed: {err}",
                                self.rank, candidate.row, candidate.col
                            );
                            None
                        }
                    };
                    debug!("Worker {}: send DONE.", self.rank);
                    self.channel.send(
                        COORDINATOR,
                        Message::Done(EvaluationResult {
                            row: candidate.row,
                            col: candidate.col,
                            fitness,
                        }),
                    )?;
                    status = WorkerStatus::Ready;
                }
                Message::Wait => {
                    debug!("Worker {}: received WAIT.", self.rank);
                    status = WorkerStatus::Waiting;
                }
                Message::Continue => {
                    debug!("Worker {}: received CONTINUE.", self.rank);
                    status = WorkerStatus::Ready;
                }
                Message::Stop => {
                    debug!("Worker {}: received STOP.", self.rank);
                    status = WorkerStatus::Stopped;
                    break;
                }
                other => {
                    warn!("Worker {}: unexpected directive {other:?}.", self.rank);
                }
            }
        }
        self.report(status)
    }

    fn report(&self, status: WorkerStatus) -> Result<(), FarmError> {
        let message = match status {
            WorkerStatus::Ready => Message::Ready,
            WorkerStatus::Waiting => Message::Waiting,
            WorkerStatus::Stopped => Message::Stopped,
        };
        debug!("Worker {}: send status {status:?}.", self.rank);
        self.channel.send(COORDINATOR, message)?;
        Ok(())
    }
}
