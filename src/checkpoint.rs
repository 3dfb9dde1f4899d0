//! Checkpoint persistence for optimization runs.
//!
//! A checkpoint is rewritten in full on every save; there is no incremental
//! append. Loading a damaged or missing file is fatal for resumption: the
//! caller must abort before distributing any work.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::design::DesignMatrix;
use crate::schema::SolverConfig;

/// Persisted snapshot of a run: three parallel sequences plus the solver
/// configuration that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Mirrored design snapshots, one per accepted iteration.
    pub designs: Vec<DesignMatrix>,
    /// Fitness accepted at each iteration. Fresh runs lead with the 0.0
    /// baseline, so this runs one longer than `designs`.
    pub fitness: Vec<f64>,
    /// Round-start timestamps, seconds since the Unix epoch.
    pub timestamps: Vec<f64>,
    /// Solver configuration, for reproducible resumption.
    pub solver: SolverConfig,
}

impl Checkpoint {
    /// Write the full checkpoint, replacing whatever was there.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Load a checkpoint for resumption.
    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let file = File::open(path)?;
        let checkpoint: Checkpoint = serde_json::from_reader(BufReader::new(file))?;
        Ok(checkpoint)
    }

    /// Latest half matrix and best fitness, the resumption point.
    pub fn latest(&self) -> Option<(DesignMatrix, f64)> {
        let design = self.designs.last()?;
        let best = *self.fitness.last()?;
        Some((design.upper_half(), best))
    }
}

/// Checkpoint persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
    #[error("checkpoint holds no design snapshots")]
    Empty,
}
