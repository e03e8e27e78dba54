//! Subcommand implementations and the input/output steps they share.

pub mod resume;
pub mod run;

use crate::cli::SpeciesArgs;
use crate::error::{CliError, Result};
use lime_rt::core::io::dust::read_dust_table_from_path;
use lime_rt::core::io::lamda::LamdaFile;
use lime_rt::core::io::populations::write_populations_to_path;
use lime_rt::core::models::dust::DustOpacity;
use lime_rt::core::models::molecule::MolecularData;
use lime_rt::engine::error::EngineError;
use lime_rt::workflows::solve::SolveOutcome;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

pub fn load_molecules(paths: &[PathBuf]) -> Result<Vec<MolecularData>> {
    paths
        .iter()
        .map(|path| {
            let molecule = LamdaFile::read_from_path(path).map_err(|e| CliError::FileParsing {
                path: path.clone(),
                source: e.into(),
            })?;
            info!(
                species = molecule.name(),
                levels = molecule.level_count(),
                lines = molecule.line_count(),
                "Loaded molecular data from {:?}",
                path
            );
            Ok(molecule)
        })
        .collect()
}

pub fn load_dust(path: Option<&Path>) -> Result<Option<DustOpacity>> {
    path.map(|path| {
        read_dust_table_from_path(path).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    })
    .transpose()
}

/// Appends `suffix` to the output prefix without touching its extension.
pub fn output_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Writes the snapshot and the population table of a finished run, converged or not.
pub fn write_outputs(outcome: &SolveOutcome, prefix: &Path) -> Result<()> {
    let grid_path = output_path(prefix, ".grid.json");
    outcome
        .snapshot()
        .write_to_path(&grid_path)
        .map_err(EngineError::from)?;

    let pops_path = output_path(prefix, ".pops.csv");
    write_populations_to_path(&outcome.grid, &outcome.species, &pops_path).map_err(|e| {
        CliError::Output {
            path: pops_path.clone(),
            source: e.into(),
        }
    })?;

    println!("Grid snapshot written to: {}", grid_path.display());
    println!("Level populations written to: {}", pops_path.display());
    Ok(())
}

/// Loads the species and optional dust table named on the command line.
pub fn load_species(args: &SpeciesArgs) -> Result<(Vec<MolecularData>, Option<DustOpacity>)> {
    Ok((load_molecules(&args.molecules)?, load_dust(args.dust.as_deref())?))
}

/// Prints the final status and turns a run that hit the iteration limit into an error.
pub fn finish(outcome: SolveOutcome) -> Result<()> {
    if outcome.is_converged() {
        println!(
            "✓ Converged after {} passes ({:.1}% of points converged).",
            outcome.status.passes(),
            outcome.fraction_converged() * 100.0
        );
    }
    outcome.ensure_converged()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn output_path_keeps_dots_in_prefix() {
        assert_eq!(
            output_path(Path::new("runs/disk.v2"), ".grid.json"),
            PathBuf::from("runs/disk.v2.grid.json")
        );
    }

    #[test]
    fn unreadable_molecule_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.dat");
        fs::write(&path, "!MOLECULE\nCO\n").unwrap();
        let err = load_molecules(&[path.clone()]).unwrap_err();
        assert!(matches!(err, CliError::FileParsing { path: p, .. } if p == path));
    }

    #[test]
    fn dust_table_is_optional() {
        assert!(load_dust(None).unwrap().is_none());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dust.tab");
        fs::write(&path, "1.0 100.0\n1000.0 1.0\n").unwrap();
        assert!(load_dust(Some(&path)).unwrap().is_some());
    }
}
