//! Evaluator adapter - turns a field solution into a scalar figure of merit.
//!
//! The numerical solve itself is external (see [`CommandSolver`]); this
//! module owns the seam trait and the loss functions applied to whatever the
//! solver returns.

mod command;

pub use command::CommandSolver;

use serde::{Deserialize, Serialize};

use crate::design::DesignMatrix;
use crate::schema::LossFunction;

/// Fitness contract used by workers.
///
/// Implementations must be deterministic for identical matrix and
/// configuration, and return nonnegative finite values.
pub trait Evaluator: Send {
    fn evaluate(&self, design: &DesignMatrix) -> Result<f64, EvalError>;
}

/// Closures work as evaluators; tests lean on this.
impl<F> Evaluator for F
where
    F: Fn(&DesignMatrix) -> Result<f64, EvalError> + Send,
{
    fn evaluate(&self, design: &DesignMatrix) -> Result<f64, EvalError> {
        (self)(design)
    }
}

/// The opaque external solver seam.
pub trait FieldSolver {
    /// Run the field simulation for a mirrored design.
    fn solve(&self, design: &DesignMatrix) -> Result<FieldSolution, SolverError>;
}

/// What a solve returns: field magnitudes sampled in the focus box, and the
/// intensity profile along the focus line when the solver found one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSolution {
    /// Field magnitude samples inside the focus box.
    pub box_field: Vec<f64>,
    /// Focus-line intensity profile, if resolved.
    pub profile: Option<FocusProfile>,
}

/// Intensity samples along the focus line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusProfile {
    /// Sample positions, ascending.
    pub positions: Vec<f64>,
    /// Intensity at each position.
    pub intensity: Vec<f64>,
}

impl FocusProfile {
    /// Full width at half maximum of the baseline-corrected profile.
    ///
    /// Finds all half-maximum crossings by linear interpolation and takes
    /// the width between the middle pair, so side lobes do not widen the
    /// result. `None` when the profile is flat or never crosses half
    /// maximum on both sides.
    pub fn fwhm(&self) -> Option<f64> {
        let n = self.positions.len().min(self.intensity.len());
        if n < 2 {
            return None;
        }
        let min = self.intensity[..n].iter().cloned().fold(f64::INFINITY, f64::min);
        let max = self.intensity[..n].iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let half = (max - min) / 2.0;
        if !(half > 0.0) {
            return None;
        }

        let mut crossings = Vec::new();
        for i in 0..n {
            let d = self.intensity[i] - min - half;
            if d == 0.0 {
                // Exact touch counts once.
                if i == 0 || self.intensity[i - 1] - min - half != 0.0 {
                    crossings.push(self.positions[i]);
                }
                continue;
            }
            if i + 1 < n {
                let next = self.intensity[i + 1] - min - half;
                if d * next < 0.0 {
                    let t = d / (d - next);
                    crossings.push(self.positions[i] + t * (self.positions[i + 1] - self.positions[i]));
                }
            }
        }

        let count = crossings.len();
        if count < 2 {
            return None;
        }
        let lo = crossings[(count - 1) / 2];
        let hi = crossings[(count + 1) / 2];
        let width = (hi - lo).abs();
        (width > 0.0).then_some(width)
    }
}

/// Applies the configured loss function to solver output.
pub struct LossEvaluator<S> {
    solver: S,
    loss: LossFunction,
}

impl<S: FieldSolver> LossEvaluator<S> {
    pub fn new(solver: S, loss: LossFunction) -> Self {
        Self { solver, loss }
    }
}

impl<S: FieldSolver + Send> Evaluator for LossEvaluator<S> {
    fn evaluate(&self, design: &DesignMatrix) -> Result<f64, EvalError> {
        let solution = self.solver.solve(design)?;
        let norm_sq: f64 = solution.box_field.iter().map(|v| v * v).sum();

        let fitness = match self.loss {
            LossFunction::PeakField => norm_sq,
            LossFunction::Fwhm => solution
                .profile
                .as_ref()
                .and_then(FocusProfile::fwhm)
                .map(|w| 1.0 / (w * w))
                .unwrap_or(0.0),
            LossFunction::Combined => {
                // Require a minimum field strength, then reward narrowness.
                let norm = norm_sq.sqrt();
                match solution.profile.as_ref().and_then(FocusProfile::fwhm) {
                    Some(w) if norm > 1.0 => norm_sq + (1.0 / w).powi(2),
                    _ => norm_sq,
                }
            }
        };

        if !fitness.is_finite() || fitness < 0.0 {
            return Err(EvalError::InvalidFitness(fitness));
        }
        Ok(fitness)
    }
}

/// Evaluation failures, reported by workers as the sentinel result.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("evaluator produced invalid fitness {0}")]
    InvalidFitness(f64),
}

/// External solver failures.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("failed to launch solver: {0}")]
    Launch(#[from] std::io::Error),
    #[error("solver exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("solver wire format: {0}")]
    Wire(#[from] serde_json::Error),
}
