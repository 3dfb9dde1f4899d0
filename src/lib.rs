//! Distributed greedy optimization of binary photonic focusing designs.
//!
//! A coordinator process drives a pool of workers through rounds of
//! candidate evaluations: every legal single-cell flip of the current binary
//! design is farmed out, scored by an external field solver, and the best
//! flip is applied. Declining rounds are tolerated up to a margin before the
//! search backtracks to its last good design and stops.
//!
//! # Architecture
//!
//! - `schema`: typed run configuration, validated at load time
//! - `design`: the binary design matrix and candidate/result records
//! - `farm`: the coordinator/worker task-farm protocol and its transport
//! - `eval`: the evaluator adapter around the external field solver
//! - `search`: the greedy policy driving the farm round by round
//! - `checkpoint`: full-overwrite persistence for resumable runs
//!
//! # Example
//!
//! ```rust,no_run
//! use bsw_focus::{
//!     design::DesignMatrix,
//!     eval::EvalError,
//!     farm::{MpscChannel, TaskFarm, Worker},
//!     schema::OptimizeConfig,
//!     search::{GreedySearch, SearchState},
//! };
//!
//! let config = OptimizeConfig::default();
//! config.validate().expect("invalid configuration");
//!
//! // One coordinator endpoint plus two workers.
//! let mut world = MpscChannel::world(3);
//! let coordinator = world.remove(0);
//! for channel in world {
//!     let rank = channel.rank();
//!     std::thread::spawn(move || {
//!         let evaluator =
//!             |m: &DesignMatrix| -> Result<f64, EvalError> { Ok(m.count_ones() as f64) };
//!         Worker::new(rank, channel, evaluator).run()
//!     });
//! }
//!
//! let farm = TaskFarm::new(coordinator, 3).expect("world too small");
//! let state = SearchState::new(config.initial_matrix());
//! let search = GreedySearch::new(
//!     farm,
//!     state,
//!     config.search.clone(),
//!     config.solver.clone(),
//!     config.output_dir.join("run.json"),
//! );
//! let report = search.run().expect("search failed");
//! println!("best fitness: {}", report.best_fitness);
//! ```

pub mod checkpoint;
pub mod design;
pub mod eval;
pub mod farm;
pub mod schema;
pub mod search;

// Re-export commonly used types
pub use checkpoint::Checkpoint;
pub use design::{Candidate, DesignMatrix, EvaluationResult};
pub use eval::{CommandSolver, Evaluator, LossEvaluator};
pub use farm::{Channel, MpscChannel, TaskFarm, Worker};
pub use schema::{OptimizeConfig, SearchVariant};
pub use search::{GreedySearch, SearchReport, SearchState, StopReason};
