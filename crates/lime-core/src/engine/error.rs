use thiserror::Error;

use super::config::ConfigError;
use crate::core::io::snapshot::SnapshotError;
use crate::core::tessellation::TessellationError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Grid construction failed: {0}")]
    FatalGeometry(String),

    #[error("Population solve failed for species '{species}' at point {point}: {reason}")]
    PopulationSolveFailed {
        point: usize,
        species: String,
        reason: String,
    },

    #[error(
        "Populations did not converge after {passes} passes ({:.1}% of points converged)",
        .fraction * 100.0
    )]
    NonConvergence { passes: usize, fraction: f64 },

    #[error("Invalid configuration: {source}")]
    Configuration {
        #[from]
        source: ConfigError,
    },

    #[error("Molecular data for '{species}' is unusable: {message}")]
    MolecularData { species: String, message: String },

    #[error("Persistence failed: {source}")]
    Persistence {
        #[from]
        source: SnapshotError,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl From<TessellationError> for EngineError {
    fn from(err: TessellationError) -> Self {
        EngineError::FatalGeometry(err.to_string())
    }
}
