use super::blend::BlendSet;
use super::config::{ConfigError, EngineConfig};
use super::error::EngineError;
use super::progress::ProgressReporter;
use crate::core::models::dust::DustOpacity;
use crate::core::models::molecule::{CollisionPartner, MolecularData};
use std::collections::HashSet;
use tracing::{info, warn};

/// Read-only state shared by every task of one run.
///
/// The molecular data, dust table and blend set never change after construction, which is
/// what lets worker threads read them without synchronisation.
pub struct SolveContext<'a> {
    pub config: &'a EngineConfig,
    pub molecules: &'a [MolecularData],
    pub dust: Option<&'a DustOpacity>,
    pub blends: BlendSet,
    pub reporter: &'a ProgressReporter<'a>,
}

impl<'a> SolveContext<'a> {
    /// Validates the species against the configuration and detects line blends.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] when no species is given, species names
    /// repeat, or `lte_species` names a species that is not loaded; returns
    /// [`EngineError::MolecularData`] for a species without radiative lines.
    pub fn new(
        config: &'a EngineConfig,
        molecules: &'a [MolecularData],
        dust: Option<&'a DustOpacity>,
        reporter: &'a ProgressReporter<'a>,
    ) -> Result<Self, EngineError> {
        if molecules.is_empty() {
            return Err(ConfigError::InvalidValue {
                parameter: "species",
                reason: "at least one species is required".to_string(),
            }
            .into());
        }
        let mut names = HashSet::new();
        for molecule in molecules {
            if !names.insert(molecule.name()) {
                return Err(ConfigError::InvalidValue {
                    parameter: "species",
                    reason: format!("species '{}' is listed twice", molecule.name()),
                }
                .into());
            }
            if molecule.line_count() == 0 {
                return Err(EngineError::MolecularData {
                    species: molecule.name().to_string(),
                    message: "no radiative transitions".to_string(),
                });
            }
            let radiative_only = !has_usable_collisions(molecule, &config.partners);
            if radiative_only && !config.is_lte(molecule.name()) {
                warn!(
                    species = molecule.name(),
                    "No collision table matches the partners; using radiative rates only."
                );
            }
        }
        if let Some(unknown) = config
            .solver
            .lte_species
            .iter()
            .find(|s| !names.contains(s.as_str()))
        {
            return Err(ConfigError::InvalidValue {
                parameter: "lte_species",
                reason: format!("species '{}' is not loaded", unknown),
            }
            .into());
        }

        let blends = if config.transport.blend {
            BlendSet::detect(molecules, config.transport.blend_threshold)
        } else {
            BlendSet::none(molecules)
        };
        if !blends.is_empty() {
            info!(pairs = blends.pair_count(), "Line blending enabled.");
        }

        Ok(Self {
            config,
            molecules,
            dust,
            blends,
            reporter,
        })
    }

    pub fn species_count(&self) -> usize {
        self.molecules.len()
    }

    pub fn species_names(&self) -> Vec<String> {
        self.molecules.iter().map(|m| m.name().to_string()).collect()
    }
}

fn has_usable_collisions(molecule: &MolecularData, partners: &[CollisionPartner]) -> bool {
    molecule.collisions().iter().any(|table| {
        partners.contains(&table.partner)
            || match table.partner {
                CollisionPartner::ParaH2 | CollisionPartner::OrthoH2 => {
                    partners.contains(&CollisionPartner::H2)
                }
                CollisionPartner::H2 => {
                    partners.contains(&CollisionPartner::ParaH2)
                        || partners.contains(&CollisionPartner::OrthoH2)
                }
                _ => false,
            }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::molecule::tests::two_level_molecule;
    use crate::engine::config::EngineConfigBuilder;

    fn config() -> EngineConfig {
        EngineConfigBuilder::new()
            .radius(1.0)
            .interior_points(10)
            .sink_points(10)
            .build()
            .unwrap()
    }

    #[test]
    fn rejects_empty_species_list() {
        let config = config();
        let reporter = ProgressReporter::new();
        assert!(matches!(
            SolveContext::new(&config, &[], None, &reporter),
            Err(EngineError::Configuration { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_species() {
        let config = config();
        let reporter = ProgressReporter::new();
        let molecules = [two_level_molecule(1e-5, 1e-16), two_level_molecule(1e-5, 1e-16)];
        assert!(SolveContext::new(&config, &molecules, None, &reporter).is_err());
    }

    #[test]
    fn rejects_unknown_lte_species() {
        let mut config = config();
        config.solver.lte_species = vec!["missing".into()];
        let reporter = ProgressReporter::new();
        let molecules = [two_level_molecule(1e-5, 1e-16)];
        assert!(SolveContext::new(&config, &molecules, None, &reporter).is_err());
    }

    #[test]
    fn para_tables_count_as_usable_for_total_h2() {
        let molecule = two_level_molecule(1e-5, 1e-16);
        assert!(has_usable_collisions(&molecule, &[CollisionPartner::H2]));
        assert!(has_usable_collisions(&molecule, &[CollisionPartner::ParaH2]));
        assert!(!has_usable_collisions(&molecule, &[CollisionPartner::Electron]));
    }
}
