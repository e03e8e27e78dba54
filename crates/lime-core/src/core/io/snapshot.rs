use crate::core::models::grid::Grid;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Incremented whenever the serialized grid layout changes incompatibly.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Snapshot format version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Complete solver state: geometry, sampled fields, rates and populations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    /// Number of completed passes when the snapshot was taken.
    pub passes: usize,
    pub species: Vec<String>,
    pub grid: Grid,
}

impl Snapshot {
    pub fn new(grid: Grid, species: Vec<String>, passes: usize) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            passes,
            species,
            grid,
        }
    }

    pub fn write_to(&self, writer: impl Write) -> Result<(), SnapshotError> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn read_from(reader: impl Read) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_reader(reader)?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::Version {
                found: snapshot.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }
        Ok(snapshot)
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), SnapshotError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, SnapshotError> {
        Self::read_from(BufReader::new(File::open(path)?))
    }
}
