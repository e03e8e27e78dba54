use crate::core::models::grid::Grid;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PopulationExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Expected {expected} species names, found {found}")]
    SpeciesMismatch { expected: usize, found: usize },
}

/// One level population of one species at one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationRecord {
    pub point: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub sink: bool,
    pub species: String,
    pub level: usize,
    pub population: f64,
    pub converged: bool,
}

/// Writes every level population of the grid in long format, one row per
/// (point, species, level).
pub fn write_populations(
    grid: &Grid,
    species: &[String],
    writer: impl Write,
) -> Result<(), PopulationExportError> {
    let expected = grid.species_count();
    if species.len() != expected {
        return Err(PopulationExportError::SpeciesMismatch {
            expected,
            found: species.len(),
        });
    }
    let mut csv_writer = csv::Writer::from_writer(writer);
    for point in grid.points() {
        for (name, pops) in species.iter().zip(&point.populations) {
            for (level, &population) in pops.levels.iter().enumerate() {
                csv_writer.serialize(PopulationRecord {
                    point: point.id,
                    x: point.position.x,
                    y: point.position.y,
                    z: point.position.z,
                    sink: point.sink,
                    species: name.clone(),
                    level,
                    population,
                    converged: point.converged,
                })?;
            }
        }
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_populations_to_path<P: AsRef<Path>>(
    grid: &Grid,
    species: &[String],
    path: P,
) -> Result<(), PopulationExportError> {
    write_populations(grid, species, File::create(path)?)
}
