//! Error taxonomy for the path-finding core.
//!
//! One variant per kind named in the spec's error handling design: fatal
//! startup/load errors, solver-facing errors, and user-facing request
//! errors. Warnings (`Build`, `SolverNoAnswer`) are constructed the same
//! way but the caller decides whether to log-and-continue or propagate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NrmError {
    #[error("config error: {0}")]
    Config(String),

    #[error("topology error: {0}")]
    Topology(String),

    #[error("AC build failed for model {model}: {detail}")]
    AcBuild { model: String, detail: String },

    #[error("build warning: {0}")]
    Build(String),

    #[error("solver found no feasible solution")]
    SolverNoAnswer,

    #[error("malformed solver output: {0}")]
    MalformedSolverOutput(String),

    #[error("{0}")]
    Request(String),

    #[error("reservation store error: {0}")]
    Reservation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NrmError>;
