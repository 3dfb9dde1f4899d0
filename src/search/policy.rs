//! Greedy search policy driving the task farm round by round.
//!
//! Each round proposes every legal single-cell flip of the current design,
//! farms the proposals out for evaluation, and applies the best one. Rounds
//! that fall short of the best fitness seen so far are tolerated up to a
//! margin, letting the search walk through shallow plateaus; once the margin
//! is exceeded the design snapshot taken at the first decline is restored
//! and the search stops.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use crate::checkpoint::{Checkpoint, CheckpointError};
use crate::design::{Candidate, DesignMatrix, EvaluationResult};
use crate::farm::{Channel, FarmError, TaskFarm};
use crate::schema::{SearchConfig, SearchVariant, SolverConfig};

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No candidates remained, or a round returned no results.
    Exhausted,
    /// The decline margin was exceeded; the backup design was restored.
    Backtracked,
    /// The winning cell had no toggle budget left.
    ToggleExhausted,
    /// The cancel handle was set.
    Cancelled,
}

/// Outcome of a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Terminate(StopReason),
}

/// Final report of a finished search.
#[derive(Debug, Clone)]
pub struct SearchReport {
    /// Rounds that produced results.
    pub iterations: usize,
    /// Best fitness seen.
    pub best_fitness: f64,
    /// Why the search stopped.
    pub stop_reason: StopReason,
    /// Accepted fitness history, including the starting baseline.
    pub history: Vec<f64>,
    /// Final half design.
    pub design: DesignMatrix,
}

/// Mutable state of a running search.
///
/// The half design matrix is exclusively owned here; workers only ever see
/// mirrored copies inside candidates.
pub struct SearchState {
    /// Current half design.
    pub matrix: DesignMatrix,
    /// Rounds that produced results so far.
    pub iterations: usize,
    /// Best fitness seen so far.
    pub best_fitness: f64,
    /// Consecutive declining rounds since the last improvement.
    pub decline_count: usize,
    /// Snapshot taken at the first decline since the last improvement.
    pub backup: Option<DesignMatrix>,
    /// Mirrored snapshots, one per accepted iteration.
    pub designs: Vec<DesignMatrix>,
    /// Accepted fitness values; fresh runs lead with the 0.0 baseline.
    pub fitness: Vec<f64>,
    /// Round-start timestamps, seconds since the Unix epoch.
    pub timestamps: Vec<f64>,
    /// Per-cell flip counts, bounded in the toggle variant.
    toggles: Vec<u32>,
}

impl SearchState {
    /// Fresh state around an initial half design.
    pub fn new(matrix: DesignMatrix) -> Self {
        let toggles = vec![0; matrix.rows() * matrix.cols()];
        Self {
            matrix,
            iterations: 0,
            best_fitness: 0.0,
            decline_count: 0,
            backup: None,
            designs: Vec::new(),
            fitness: vec![0.0],
            timestamps: Vec::new(),
            toggles,
        }
    }

    /// Resume from a checkpoint: the latest design becomes the working half
    /// matrix, the latest fitness the current best, and the recorded
    /// histories are carried forward.
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Result<Self, CheckpointError> {
        let (matrix, best_fitness) = checkpoint.latest().ok_or(CheckpointError::Empty)?;
        let toggles = vec![0; matrix.rows() * matrix.cols()];
        Ok(Self {
            matrix,
            iterations: 0,
            best_fitness,
            decline_count: 0,
            backup: None,
            designs: checkpoint.designs.clone(),
            fitness: checkpoint.fitness.clone(),
            timestamps: checkpoint.timestamps.clone(),
            toggles,
        })
    }

    /// How often the cell at (row, col) has been flipped.
    #[inline]
    pub fn toggle_count(&self, row: usize, col: usize) -> u32 {
        self.toggles[row * self.matrix.cols() + col]
    }

    fn bump_toggle(&mut self, row: usize, col: usize) {
        self.toggles[row * self.matrix.cols() + col] += 1;
    }
}

/// Propose every legal single-cell flip of `matrix`, in row-major order.
pub fn candidates(matrix: &DesignMatrix, variant: SearchVariant) -> Vec<Candidate> {
    let flip = |(row, col)| Candidate {
        row,
        col,
        matrix: matrix.with_toggled(row, col).mirrored(),
    };
    let mut out: Vec<Candidate> = matrix.cells_with(0).map(flip).collect();
    if variant == SearchVariant::Toggle {
        out.extend(matrix.cells_with(1).map(flip));
    }
    out
}

/// Pick the winning result: maximum fitness, ties broken by lowest
/// (row, col) in row-major order. The failure sentinel ranks below every
/// real fitness. Deterministic regardless of arrival order.
pub fn select_winner(results: &[EvaluationResult]) -> Option<&EvaluationResult> {
    results.iter().reduce(|best, other| {
        let best_fitness = best.fitness.unwrap_or(f64::NEG_INFINITY);
        let other_fitness = other.fitness.unwrap_or(f64::NEG_INFINITY);
        if other_fitness > best_fitness
            || (other_fitness == best_fitness && (other.row, other.col) < (best.row, best.col))
        {
            other
        } else {
            best
        }
    })
}

/// The greedy search engine.
pub struct GreedySearch<C: Channel> {
    farm: TaskFarm<C>,
    state: SearchState,
    config: SearchConfig,
    solver: SolverConfig,
    checkpoint_path: PathBuf,
    cancelled: Arc<AtomicBool>,
}

impl<C: Channel> GreedySearch<C> {
    /// Create a search over an already-wired farm.
    pub fn new(
        farm: TaskFarm<C>,
        state: SearchState,
        config: SearchConfig,
        solver: SolverConfig,
        checkpoint_path: PathBuf,
    ) -> Self {
        Self {
            farm,
            state,
            config,
            solver,
            checkpoint_path,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting an orderly stop from another thread or a signal
    /// hook. The search checks it between rounds.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Current search state.
    pub fn state(&self) -> &SearchState {
        &self.state
    }

    /// Run rounds until termination, then checkpoint and stop all workers.
    pub fn run(mut self) -> Result<SearchReport, SearchError> {
        let stop_reason = loop {
            match self.step()? {
                StepOutcome::Continue => {}
                StepOutcome::Terminate(reason) => break reason,
            }
        };

        // Persist before the stop broadcast; if the write fails the workers
        // must still be released.
        let checkpoint_written = self.write_checkpoint();
        self.farm.shutdown()?;
        checkpoint_written?;

        info!(
            "Optimization finished in {} iterations.",
            self.state.iterations
        );
        Ok(SearchReport {
            iterations: self.state.iterations,
            best_fitness: self.state.best_fitness,
            stop_reason,
            history: self.state.fitness.clone(),
            design: self.state.matrix.clone(),
        })
    }

    /// Run one round. On `Continue` the farm has been released for the next
    /// round; on `Terminate` the caller (normally [`run`]) owns checkpointing
    /// and worker shutdown.
    ///
    /// [`run`]: GreedySearch::run
    pub fn step(&mut self) -> Result<StepOutcome, SearchError> {
        if self.cancelled.load(Ordering::Relaxed) {
            info!("Cancellation requested, stopping search.");
            return Ok(StepOutcome::Terminate(StopReason::Cancelled));
        }

        let proposals = candidates(&self.state.matrix, self.config.variant);
        if proposals.is_empty() {
            self.apply_pending_backtrack();
            return Ok(StepOutcome::Terminate(StopReason::Exhausted));
        }

        self.state.timestamps.push(unix_now());
        let results = self.farm.run_round(proposals)?;
        if results.is_empty() {
            self.apply_pending_backtrack();
            return Ok(StepOutcome::Terminate(StopReason::Exhausted));
        }
        let Some(winner) = select_winner(&results).cloned() else {
            self.apply_pending_backtrack();
            return Ok(StepOutcome::Terminate(StopReason::Exhausted));
        };

        self.state.iterations += 1;
        let winning = winner.fitness.unwrap_or(f64::NEG_INFINITY);
        info!(
            "Iteration {:<6}, dE = {}",
            self.state.iterations,
            winning - self.state.best_fitness
        );

        // Strict comparison: an exact tie counts as an improvement.
        let declined = winning < self.state.best_fitness;
        if declined {
            if self.state.backup.is_none() {
                self.state.backup = Some(self.state.matrix.clone());
            }
            self.state.decline_count += 1;
            if self.state.decline_count > self.config.margin {
                debug!("Decline margin exceeded, backtracking.");
                self.apply_pending_backtrack();
                return Ok(StepOutcome::Terminate(StopReason::Backtracked));
            }
        }

        if self.config.variant == SearchVariant::Toggle
            && self.state.toggle_count(winner.row, winner.col) >= self.config.margin as u32 + 2
        {
            debug!(
                "Cell ({}, {}) has no toggle budget left, stopping.",
                winner.row, winner.col
            );
            self.apply_pending_backtrack();
            return Ok(StepOutcome::Terminate(StopReason::ToggleExhausted));
        }

        self.state.matrix.toggle(winner.row, winner.col);
        if self.config.variant == SearchVariant::Toggle {
            self.state.bump_toggle(winner.row, winner.col);
        }

        if !declined {
            self.state.best_fitness = winning;
            self.state.fitness.push(winning);
            self.state.designs.push(self.state.matrix.mirrored());
            self.state.decline_count = 0;
            self.state.backup = None;
        }

        self.farm.release()?;

        if self.state.iterations % self.config.checkpoint_interval == 0 {
            self.write_checkpoint()?;
        }
        Ok(StepOutcome::Continue)
    }

    fn apply_pending_backtrack(&mut self) {
        if let Some(backup) = self.state.backup.take() {
            self.state.matrix = backup;
        }
    }

    fn write_checkpoint(&self) -> Result<(), SearchError> {
        let checkpoint = Checkpoint {
            designs: self.state.designs.clone(),
            fitness: self.state.fitness.clone(),
            timestamps: self.state.timestamps.clone(),
            solver: self.solver.clone(),
        };
        checkpoint.save(&self.checkpoint_path)?;
        debug!("Checkpoint written to {}.", self.checkpoint_path.display());
        Ok(())
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Search failures.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Farm(#[from] FarmError),
    #[error("checkpoint write failed: {0}")]
    Checkpoint(#[from] CheckpointError),
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::thread::JoinHandle;

    use proptest::prelude::*;
    use tempfile::TempDir;

    use super::*;
    use crate::eval::EvalError;
    use crate::farm::{MpscChannel, Worker};

    fn upper_ones(matrix: &DesignMatrix) -> f64 {
        matrix.upper_half().count_ones() as f64
    }

    fn build_search<F>(
        state: SearchState,
        config: SearchConfig,
        worker_count: usize,
        checkpoint_path: &Path,
        evaluate: F,
    ) -> (
        GreedySearch<MpscChannel>,
        Vec<JoinHandle<Result<(), FarmError>>>,
    )
    where
        F: Fn(&DesignMatrix) -> Result<f64, EvalError> + Clone + Send + 'static,
    {
        let world_size = worker_count + 1;
        let mut world = MpscChannel::world(world_size);
        let coordinator = world.remove(0);
        let handles = world
            .into_iter()
            .map(|channel| {
                let rank = channel.rank();
                let evaluate = evaluate.clone();
                std::thread::spawn(move || Worker::new(rank, channel, evaluate).run())
            })
            .collect();
        let farm = TaskFarm::new(coordinator, world_size).unwrap();
        let search = GreedySearch::new(
            farm,
            state,
            config,
            SolverConfig::default(),
            checkpoint_path.to_path_buf(),
        );
        (search, handles)
    }

    struct TestRun {
        report: SearchReport,
        checkpoint_path: std::path::PathBuf,
        _dir: TempDir,
    }

    fn run_search<F>(
        state: SearchState,
        config: SearchConfig,
        worker_count: usize,
        evaluate: F,
    ) -> TestRun
    where
        F: Fn(&DesignMatrix) -> Result<f64, EvalError> + Clone + Send + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("run.json");
        let (search, handles) = build_search(state, config, worker_count, &checkpoint_path, evaluate);
        let report = search.run().unwrap();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        TestRun {
            report,
            checkpoint_path,
            _dir: dir,
        }
    }

    #[test]
    fn fills_a_two_cell_grid_in_two_iterations() {
        let state = SearchState::new(DesignMatrix::zeros(1, 2));
        let run = run_search(state, SearchConfig::default(), 2, |m: &DesignMatrix| {
            Ok(upper_ones(m))
        });

        assert_eq!(run.report.stop_reason, StopReason::Exhausted);
        assert_eq!(run.report.iterations, 2);
        assert_eq!(run.report.history, vec![0.0, 1.0, 2.0]);
        assert_eq!(run.report.best_fitness, 2.0);
        assert_eq!(run.report.design.count_ones(), 2);
        assert!(run.checkpoint_path.exists());
    }

    #[test]
    fn declining_run_backtracks_to_first_decline_snapshot() {
        let mut state = SearchState::new(DesignMatrix::zeros(2, 2));
        state.best_fitness = 100.0;
        state.fitness = vec![100.0];

        let run = run_search(state, SearchConfig::default(), 2, |m: &DesignMatrix| {
            Ok(50.0 - upper_ones(m))
        });

        // Declines on rounds 1-3; the third exceeds the margin of 2 and the
        // matrix snapshotted at the first decline (all zero) is restored.
        assert_eq!(run.report.stop_reason, StopReason::Backtracked);
        assert_eq!(run.report.iterations, 3);
        assert_eq!(run.report.design, DesignMatrix::zeros(2, 2));
        assert_eq!(run.report.history, vec![100.0]);
    }

    #[test]
    fn exact_fitness_tie_counts_as_improvement() {
        let mut state = SearchState::new(DesignMatrix::zeros(1, 2));
        state.best_fitness = 5.0;
        state.fitness = vec![5.0];

        let run = run_search(state, SearchConfig::default(), 1, |_: &DesignMatrix| Ok(5.0));

        // Never declines: ties keep accepting until the grid is full.
        assert_eq!(run.report.stop_reason, StopReason::Exhausted);
        assert_eq!(run.report.history, vec![5.0, 5.0, 5.0]);
        assert_eq!(run.report.design.count_ones(), 2);
    }

    #[test]
    fn evaluator_failures_decline_and_backtrack() {
        let state = SearchState::new(DesignMatrix::zeros(2, 2));
        let run = run_search(state, SearchConfig::default(), 2, |_: &DesignMatrix| {
            Err(EvalError::InvalidFitness(-1.0))
        });

        assert_eq!(run.report.stop_reason, StopReason::Backtracked);
        assert_eq!(run.report.design, DesignMatrix::zeros(2, 2));
        assert_eq!(run.report.history, vec![0.0]);
    }

    #[test]
    fn full_grid_terminates_without_a_round() {
        let mut matrix = DesignMatrix::zeros(1, 2);
        matrix.set(0, 0, 1);
        matrix.set(0, 1, 1);
        let run = run_search(
            SearchState::new(matrix.clone()),
            SearchConfig::default(),
            1,
            |m: &DesignMatrix| Ok(upper_ones(m)),
        );

        assert_eq!(run.report.stop_reason, StopReason::Exhausted);
        assert_eq!(run.report.iterations, 0);
        assert_eq!(run.report.design, matrix);
        // Termination still writes a checkpoint.
        assert!(run.checkpoint_path.exists());
    }

    #[test]
    fn toggle_variant_turns_cells_back_off_until_budget_runs_out() {
        let mut matrix = DesignMatrix::zeros(1, 2);
        matrix.set(0, 0, 1);
        matrix.set(0, 1, 1);
        let mut state = SearchState::new(matrix);
        state.best_fitness = 8.0;
        state.fitness = vec![8.0];

        let config = SearchConfig {
            variant: SearchVariant::Toggle,
            ..Default::default()
        };
        // Rewards emptying the grid, so cell (0, 0) oscillates until its
        // toggle budget (margin + 2 = 4) is spent.
        let run = run_search(state, config, 2, |m: &DesignMatrix| Ok(10.0 - upper_ones(m)));

        assert_eq!(run.report.stop_reason, StopReason::ToggleExhausted);
        assert_eq!(run.report.iterations, 6);
        assert_eq!(run.report.best_fitness, 10.0);
        assert_eq!(run.report.design, DesignMatrix::zeros(1, 2));
        assert_eq!(run.report.history, vec![8.0, 9.0, 10.0, 10.0]);
    }

    #[test]
    fn cancellation_stops_before_the_next_round() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("run.json");
        let state = SearchState::new(DesignMatrix::zeros(2, 2));
        let (search, handles) = build_search(
            state,
            SearchConfig::default(),
            2,
            &checkpoint_path,
            |m: &DesignMatrix| Ok(upper_ones(m)),
        );

        search.cancel_handle().store(true, Ordering::Relaxed);
        let report = search.run().unwrap();

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.iterations, 0);
        // Orderly shutdown: checkpoint persisted, all workers stopped.
        assert!(checkpoint_path.exists());
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
    }

    #[test]
    fn resume_reproduces_the_uninterrupted_trajectory() {
        let evaluate = |m: &DesignMatrix| Ok(upper_ones(m));

        // Uninterrupted reference run.
        let full = run_search(
            SearchState::new(DesignMatrix::zeros(2, 2)),
            SearchConfig::default(),
            2,
            evaluate,
        );
        assert_eq!(full.report.stop_reason, StopReason::Exhausted);

        // Interrupted run: checkpoint after two iterations, then cancel.
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("run.json");
        let config = SearchConfig {
            checkpoint_interval: 2,
            ..Default::default()
        };
        let (mut search, handles) = build_search(
            SearchState::new(DesignMatrix::zeros(2, 2)),
            config,
            2,
            &checkpoint_path,
            evaluate,
        );
        assert_eq!(search.step().unwrap(), StepOutcome::Continue);
        assert_eq!(search.step().unwrap(), StepOutcome::Continue);
        let midpoint = Checkpoint::load(&checkpoint_path).unwrap();
        search.cancel_handle().store(true, Ordering::Relaxed);
        search.run().unwrap();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(midpoint.designs.len(), 2);
        assert_eq!(midpoint.fitness, vec![0.0, 1.0, 2.0]);

        // Resumed run continues where the checkpoint left off.
        let resumed_state = SearchState::from_checkpoint(&midpoint).unwrap();
        assert_eq!(resumed_state.best_fitness, 2.0);
        let resumed = run_search(resumed_state, SearchConfig::default(), 2, evaluate);

        assert_eq!(resumed.report.stop_reason, StopReason::Exhausted);
        assert_eq!(resumed.report.design, full.report.design);
        assert_eq!(resumed.report.history, full.report.history);
        assert_eq!(resumed.report.best_fitness, full.report.best_fitness);
    }

    #[test]
    fn checkpoint_records_accepted_snapshots_in_order() {
        let state = SearchState::new(DesignMatrix::zeros(1, 2));
        let config = SearchConfig {
            checkpoint_interval: 1,
            ..Default::default()
        };
        let run = run_search(state, config, 2, |m: &DesignMatrix| Ok(upper_ones(m)));

        let checkpoint = Checkpoint::load(&run.checkpoint_path).unwrap();
        assert_eq!(checkpoint.designs.len(), 2);
        assert_eq!(checkpoint.fitness, vec![0.0, 1.0, 2.0]);
        // One timestamp per round that reached the farm.
        assert_eq!(checkpoint.timestamps.len(), 2);
        // Snapshots are mirrored and grow monotonically.
        assert_eq!(checkpoint.designs[0].rows(), 2);
        assert_eq!(checkpoint.designs[0].count_ones(), 2);
        assert_eq!(checkpoint.designs[1].count_ones(), 4);
    }

    #[test]
    fn monotonic_variant_only_proposes_turn_ons() {
        let mut matrix = DesignMatrix::zeros(2, 2);
        matrix.set(0, 0, 1);
        matrix.set(1, 1, 1);

        let monotonic = candidates(&matrix, SearchVariant::Monotonic);
        let cells: Vec<_> = monotonic.iter().map(|c| (c.row, c.col)).collect();
        assert_eq!(cells, vec![(0, 1), (1, 0)]);
        // Every proposal adds exactly one cell (two in the mirrored copy).
        for candidate in &monotonic {
            assert_eq!(candidate.matrix.count_ones(), 2 * (matrix.count_ones() + 1));
        }

        // The toggle variant also proposes turning set cells back off.
        let toggle = candidates(&matrix, SearchVariant::Toggle);
        assert_eq!(toggle.len(), 4);
    }

    #[test]
    fn winner_prefers_highest_fitness_then_row_major_order() {
        let results = vec![
            EvaluationResult {
                row: 1,
                col: 1,
                fitness: Some(5.0),
            },
            EvaluationResult {
                row: 2,
                col: 0,
                fitness: Some(7.0),
            },
            EvaluationResult {
                row: 0,
                col: 1,
                fitness: Some(7.0),
            },
            EvaluationResult {
                row: 0,
                col: 0,
                fitness: None,
            },
        ];
        let winner = select_winner(&results).unwrap();
        assert_eq!((winner.row, winner.col), (0, 1));
    }

    #[test]
    fn sentinel_loses_to_any_real_fitness() {
        let results = vec![
            EvaluationResult {
                row: 0,
                col: 0,
                fitness: None,
            },
            EvaluationResult {
                row: 3,
                col: 3,
                fitness: Some(0.0),
            },
        ];
        let winner = select_winner(&results).unwrap();
        assert_eq!((winner.row, winner.col), (3, 3));
    }

    proptest! {
        #[test]
        fn winner_is_invariant_under_arrival_order(
            raw in prop::collection::vec(
                (0usize..6, 0usize..6, prop::option::of(0u8..20)),
                1..24,
            )
        ) {
            let results: Vec<EvaluationResult> = raw
                .into_iter()
                .map(|(row, col, fitness)| EvaluationResult {
                    row,
                    col,
                    fitness: fitness.map(f64::from),
                })
                .collect();

            let mut reordered = results.clone();
            reordered.sort_by_key(|r| (r.row, r.col));
            reordered.reverse();

            prop_assert_eq!(
                select_winner(&results).cloned(),
                select_winner(&reordered).cloned()
            );
        }
    }
}
