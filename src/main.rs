//! bsw-focus CLI - Run a distributed design optimization from JSON configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::warn;

use bsw_focus::{
    checkpoint::{Checkpoint, CheckpointError},
    eval::{CommandSolver, LossEvaluator},
    farm::{FarmError, MpscChannel, TaskFarm, Worker},
    schema::{ConfigError, OptimizeConfig},
    search::{GreedySearch, SearchError, SearchReport, SearchState},
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [workers]", args[0]);
        eprintln!();
        eprintln!("Run a distributed greedy design optimization.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to run configuration file");
        eprintln!("  workers      Worker thread count (default: cores - 1)");
        eprintln!();
        eprintln!("An example configuration is printed with --example.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let workers: usize = match args.get(2) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("Invalid worker count: {raw}");
            std::process::exit(1);
        }),
        None => default_workers(),
    };

    match run(&config_path, workers) {
        Ok(summary) => print_summary(&summary),
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}

struct RunSummary {
    report: SearchReport,
    checkpoint_path: PathBuf,
    elapsed: Duration,
}

fn run(config_path: &Path, workers: usize) -> Result<RunSummary, RunError> {
    let config_str = fs::read_to_string(config_path)?;
    let config: OptimizeConfig = serde_json::from_str(&config_str)?;
    config.validate()?;

    // Coordinator plus workers; refuse to run without at least one worker
    // before anything is wired up.
    let world_size = workers + 1;
    if world_size < 2 {
        return Err(RunError::NotEnoughWorkers);
    }

    let (state, checkpoint_path) = match &config.resume_from {
        Some(path) => {
            let checkpoint = Checkpoint::load(path)?;
            (SearchState::from_checkpoint(&checkpoint)?, path.clone())
        }
        None => {
            fs::create_dir_all(&config.output_dir)?;
            let stamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let name = format!(
                "{stamp}_bsw_{}x{}_res{}.json",
                config.width, config.height, config.solver.resolution
            );
            (
                SearchState::new(config.initial_matrix()),
                config.output_dir.join(name),
            )
        }
    };

    println!("BSW Focus Optimization");
    println!("======================");
    println!(
        "Design grid: {}x{} (half matrix: {}x{})",
        config.width,
        config.height,
        config.half_rows(),
        config.height
    );
    println!("Variant: {:?}", config.search.variant);
    println!("Loss: {:?}", config.solver.loss);
    println!("Workers: {workers}");
    println!("Checkpoint: {}", checkpoint_path.display());
    println!();

    let mut world = MpscChannel::world(world_size);
    let coordinator = world.remove(0);
    let mut handles = Vec::with_capacity(workers);
    for channel in world {
        let rank = channel.rank();
        let solver = config.solver.clone();
        let handle = thread::Builder::new()
            .name(format!("worker-{rank}"))
            .spawn(move || {
                let loss = solver.loss;
                let evaluator = LossEvaluator::new(CommandSolver::new(solver), loss);
                Worker::new(rank, channel, evaluator).run()
            })?;
        handles.push(handle);
    }

    let farm = TaskFarm::new(coordinator, world_size)?;
    let search = GreedySearch::new(
        farm,
        state,
        config.search.clone(),
        config.solver.clone(),
        checkpoint_path.clone(),
    );

    let start = Instant::now();
    let result = search.run();

    // The run ends with the stop handshake, so joining cannot block.
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Worker exited with error: {err}"),
            Err(_) => warn!("Worker thread panicked."),
        }
    }

    Ok(RunSummary {
        report: result?,
        checkpoint_path,
        elapsed: start.elapsed(),
    })
}

fn print_summary(summary: &RunSummary) {
    let report = &summary.report;
    println!("Finished: {:?}", report.stop_reason);
    println!("  Iterations: {}", report.iterations);
    println!("  Best fitness: {:.6}", report.best_fitness);
    println!("  Accepted designs: {}", report.history.len().saturating_sub(1));
    println!("  Checkpoint: {}", summary.checkpoint_path.display());
    println!("  Time: {:.2}s", summary.elapsed.as_secs_f32());
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

fn print_example_config() {
    let config = OptimizeConfig::default();
    println!("Example configuration (config.json):");
    println!("{}", serde_json::to_string_pretty(&config).unwrap());
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("need at least one worker besides the coordinator")]
    NotEnoughWorkers,
    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Farm(#[from] FarmError),
    #[error(transparent)]
    Search(#[from] SearchError),
}
