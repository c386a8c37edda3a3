// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Solver invocation contract (spec.md §4.6, §9).
//!
//! Isolated behind a trait so tests can stub the external MIP solver
//! instead of shelling out, the way `hdds-persistence` isolates storage
//! behind `PersistenceStore` to swap SQLite for an in-memory double.

use crate::error::{NrmError, Result};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Raw result of one solver invocation: its stdout (scanned for route
/// entries by the result parser) and whether it timed out / exited
/// non-zero.
#[derive(Debug, Clone)]
pub struct SolverRun {
    pub stdout: String,
    pub stderr: String,
    pub exit_ok: bool,
}

pub trait Solver: Send + Sync {
    fn solve(&self, model: &Path, data: &Path, out: &Path, tmlim: Duration) -> Result<SolverRun>;
}

/// Default implementation: shells out to a configured solver binary with
/// `--model <.model> --data <.data> --output <.sol> --tmlim <seconds>`
/// (spec.md §4.6).
pub struct ShellSolver {
    pub binary: String,
}

impl ShellSolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Solver for ShellSolver {
    fn solve(&self, model: &Path, data: &Path, out: &Path, tmlim: Duration) -> Result<SolverRun> {
        let output = Command::new(&self.binary)
            .arg("--model")
            .arg(model)
            .arg("--data")
            .arg(data)
            .arg("--output")
            .arg(out)
            .arg("--tmlim")
            .arg(tmlim.as_secs().to_string())
            .output()
            .map_err(|e| NrmError::AcBuild {
                model: model.display().to_string(),
                detail: e.to_string(),
            })?;

        Ok(SolverRun {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_ok: output.status.success(),
        })
    }
}

/// Timeout for `pf` and `solvec` solves (spec.md §4.6: 120s for both).
pub const SOLVE_TIMEOUT: Duration = Duration::from_secs(120);

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// A stub solver returning canned stdout, for pathfinder/unit tests.
    pub struct StubSolver {
        pub runs: Mutex<Vec<(std::path::PathBuf, std::path::PathBuf)>>,
        pub response: String,
        pub exit_ok: bool,
    }

    impl StubSolver {
        pub fn new(response: impl Into<String>) -> Self {
            Self {
                runs: Mutex::new(Vec::new()),
                response: response.into(),
                exit_ok: true,
            }
        }

        pub fn failing() -> Self {
            Self {
                runs: Mutex::new(Vec::new()),
                response: String::new(),
                exit_ok: false,
            }
        }
    }

    impl Solver for StubSolver {
        fn solve(&self, model: &Path, data: &Path, _out: &Path, _tmlim: Duration) -> Result<SolverRun> {
            self.runs
                .lock()
                .unwrap()
                .push((model.to_path_buf(), data.to_path_buf()));
            Ok(SolverRun {
                stdout: self.response.clone(),
                stderr: String::new(),
                exit_ok: self.exit_ok,
            })
        }
    }
}
