//! External solver process adapter.
//!
//! The field simulation lives outside this crate. [`CommandSolver`] launches
//! the configured executable once per evaluation, writes the solver
//! configuration and mirrored design as JSON to its stdin, and reads a
//! [`FieldSolution`] as JSON from its stdout.

use std::process::{Command, Stdio};

use serde::Serialize;

use super::{FieldSolution, FieldSolver, SolverError};
use crate::design::DesignMatrix;
use crate::schema::SolverConfig;

/// Everything the solver process needs for one run.
#[derive(Serialize)]
struct SolveRequest<'a> {
    solver: &'a SolverConfig,
    design: &'a DesignMatrix,
}

/// Field solver backed by an external executable.
pub struct CommandSolver {
    config: SolverConfig,
}

impl CommandSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }
}

impl FieldSolver for CommandSolver {
    fn solve(&self, design: &DesignMatrix) -> Result<FieldSolution, SolverError> {
        let mut child = Command::new(&self.config.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let request = SolveRequest {
                solver: &self.config,
                design,
            };
            serde_json::to_writer(&mut stdin, &request)?;
            // stdin drops here; the solver sees EOF and starts.
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(SolverError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}
