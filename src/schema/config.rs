//! Configuration types for optimization runs.
//!
//! All configuration is loaded from JSON. Unknown fields are rejected at
//! parse time; value constraints are checked by [`OptimizeConfig::validate`]
//! before any worker is started.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::design::DesignMatrix;

/// Top-level configuration for an optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimizeConfig {
    /// Design extent in cells along the mirror axis. Must be even: the
    /// optimizer works on the upper half and mirrors it.
    pub width: usize,
    /// Design extent in cells perpendicular to the mirror axis.
    pub height: usize,
    /// Field solver settings, forwarded to the evaluator.
    pub solver: SolverConfig,
    /// Search policy settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Directory for checkpoint output.
    pub output_dir: PathBuf,
    /// Existing checkpoint to resume from.
    #[serde(default)]
    pub resume_from: Option<PathBuf>,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            width: 20,
            height: 20,
            solver: SolverConfig::default(),
            search: SearchConfig::default(),
            output_dir: PathBuf::from("results"),
            resume_from: None,
        }
    }
}

impl OptimizeConfig {
    /// Rows of the half matrix the search mutates.
    #[inline]
    pub fn half_rows(&self) -> usize {
        self.width / 2
    }

    /// All-zero half matrix sized for this configuration.
    pub fn initial_matrix(&self) -> DesignMatrix {
        DesignMatrix::zeros(self.half_rows(), self.height)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.width % 2 != 0 {
            return Err(ConfigError::InvalidWidth(self.width));
        }
        if self.height == 0 {
            return Err(ConfigError::InvalidHeight);
        }
        self.solver.validate()?;
        self.search.validate()?;
        Ok(())
    }
}

/// Settings consumed by the external field solver and the loss evaluator.
///
/// Field names follow the solver's own configuration surface so a checkpoint
/// records everything needed to reproduce its results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverConfig {
    /// Simulation grid resolution (points per unit length).
    pub resolution: u32,
    /// Refractive index of the low-index material.
    pub n_lo: f64,
    /// Refractive index of the high-index material.
    pub n_hi: f64,
    /// Source wavelength.
    pub wavelength: f64,
    /// Design region x extent.
    pub design_x: (f64, f64),
    /// Design region y extent.
    pub design_y: (f64, f64),
    /// Focus search y extent.
    pub focus_y: (f64, f64),
    /// Simulation cell size along x.
    pub cell_size_x: f64,
    /// Width of the focus evaluation box.
    pub box_width: f64,
    /// Height of the focus evaluation box.
    pub box_height: f64,
    /// Gap left between design pixels (may be negative for overlap).
    pub spacing: f64,
    /// Figure-of-merit selection.
    pub loss: LossFunction,
    /// External solver executable invoked per evaluation.
    pub command: PathBuf,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            resolution: 5,
            n_lo: 1.2,
            n_hi: 1.3,
            wavelength: 1.5555,
            design_x: (-10.0, 10.0),
            design_y: (0.0, 20.0),
            focus_y: (-5.0, -25.0),
            cell_size_x: 20.0,
            box_width: 1.0,
            box_height: 1.0,
            spacing: 0.0,
            loss: LossFunction::PeakField,
            command: PathBuf::from("bsw-solve"),
        }
    }
}

impl SolverConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution == 0 {
            return Err(ConfigError::InvalidResolution);
        }
        if self.n_lo <= 0.0 || self.n_hi <= 0.0 {
            return Err(ConfigError::InvalidIndices {
                n_lo: self.n_lo,
                n_hi: self.n_hi,
            });
        }
        if self.wavelength <= 0.0 {
            return Err(ConfigError::InvalidWavelength);
        }
        if self.box_width <= 0.0 || self.box_height <= 0.0 {
            return Err(ConfigError::InvalidFocusBox);
        }
        // The focus y range may run in either direction; the design region
        // must not be empty.
        if self.design_x.0 >= self.design_x.1 || self.design_y.0 >= self.design_y.1 {
            return Err(ConfigError::EmptyDesignRegion);
        }
        Ok(())
    }
}

/// Figure-of-merit computed from a field solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    /// Squared norm of the focus-box field. Simple, effective.
    PeakField,
    /// Inverse squared full-width-half-maximum of the focus profile.
    Fwhm,
    /// Requires a minimum field strength, then rewards narrowness.
    Combined,
}

/// Search variant: which flips are proposed each round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchVariant {
    /// Cells may only turn on (0 -> 1).
    #[default]
    Monotonic,
    /// Cells may also turn back off, each a bounded number of times.
    Toggle,
}

/// Search policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SearchConfig {
    /// Which flips are proposed each round.
    pub variant: SearchVariant,
    /// Consecutive declining rounds tolerated before backtracking.
    pub margin: usize,
    /// Checkpoint every this many iterations.
    pub checkpoint_interval: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            variant: SearchVariant::Monotonic,
            margin: 2,
            checkpoint_interval: 10,
        }
    }
}

impl SearchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::InvalidCheckpointInterval);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("design width must be even and non-zero, got {0}")]
    InvalidWidth(usize),
    #[error("design height must be non-zero")]
    InvalidHeight,
    #[error("solver resolution must be non-zero")]
    InvalidResolution,
    #[error("refractive indices must be positive (n_lo = {n_lo}, n_hi = {n_hi})")]
    InvalidIndices { n_lo: f64, n_hi: f64 },
    #[error("wavelength must be positive")]
    InvalidWavelength,
    #[error("focus box dimensions must be positive")]
    InvalidFocusBox,
    #[error("design region extents must be non-empty")]
    EmptyDesignRegion,
    #[error("checkpoint interval must be non-zero")]
    InvalidCheckpointInterval,
}
