use crate::core::constants::{AMU, CLIGHT, HCKB, HPLANCK};
use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Collision partners recognised in LAMDA files, numbered as in the LAMDA convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionPartner {
    H2,
    ParaH2,
    OrthoH2,
    Electron,
    H,
    He,
    HPlus,
}

static PARTNER_NAMES: phf::Map<&'static str, CollisionPartner> = phf_map! {
    "h2" => CollisionPartner::H2,
    "p-h2" => CollisionPartner::ParaH2,
    "ph2" => CollisionPartner::ParaH2,
    "o-h2" => CollisionPartner::OrthoH2,
    "oh2" => CollisionPartner::OrthoH2,
    "e" => CollisionPartner::Electron,
    "electron" => CollisionPartner::Electron,
    "h" => CollisionPartner::H,
    "he" => CollisionPartner::He,
    "h+" => CollisionPartner::HPlus,
};

impl CollisionPartner {
    pub fn from_lamda_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::H2),
            2 => Some(Self::ParaH2),
            3 => Some(Self::OrthoH2),
            4 => Some(Self::Electron),
            5 => Some(Self::H),
            6 => Some(Self::He),
            7 => Some(Self::HPlus),
            _ => None,
        }
    }

    pub fn lamda_id(&self) -> u32 {
        match self {
            Self::H2 => 1,
            Self::ParaH2 => 2,
            Self::OrthoH2 => 3,
            Self::Electron => 4,
            Self::H => 5,
            Self::He => 6,
            Self::HPlus => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::H2 => "H2",
            Self::ParaH2 => "p-H2",
            Self::OrthoH2 => "o-H2",
            Self::Electron => "e",
            Self::H => "H",
            Self::He => "He",
            Self::HPlus => "H+",
        }
    }
}

impl fmt::Display for CollisionPartner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown collision partner '{0}'")]
pub struct UnknownPartnerError(pub String);

impl FromStr for CollisionPartner {
    type Err = UnknownPartnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PARTNER_NAMES
            .get(s.trim().to_ascii_lowercase().as_str())
            .copied()
            .ok_or_else(|| UnknownPartnerError(s.to_string()))
    }
}

/// A single energy level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    /// Energy above the ground state in cm^-1.
    pub energy: f64,
    /// Statistical weight.
    pub weight: f64,
}

/// A radiative transition with derived Einstein B coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiativeTransition {
    pub upper: usize,
    pub lower: usize,
    /// Einstein A coefficient (s^-1).
    pub einstein_a: f64,
    /// Rest frequency (Hz).
    pub frequency: f64,
    /// Stimulated emission coefficient B_ul.
    pub einstein_b_upper: f64,
    /// Absorption coefficient B_lu.
    pub einstein_b_lower: f64,
}

/// Downward collisional rate coefficients of one transition over the table temperatures.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionalTransition {
    pub upper: usize,
    pub lower: usize,
    /// Rate coefficients in m^3 s^-1, one per table temperature.
    pub rates: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollisionTable {
    pub partner: CollisionPartner,
    pub temperatures: Vec<f64>,
    pub transitions: Vec<CollisionalTransition>,
}

impl CollisionTable {
    pub fn temperature_range(&self) -> (f64, f64) {
        let lo = self.temperatures.first().copied().unwrap_or(0.0);
        let hi = self.temperatures.last().copied().unwrap_or(0.0);
        (lo, hi)
    }

    /// Downward rate coefficients of every transition at `temperature`, linearly
    /// interpolated and clamped to the tabulated range.
    pub fn downward_rates(&self, temperature: f64) -> Vec<f64> {
        let temps = &self.temperatures;
        if temps.len() == 1 {
            return self.transitions.iter().map(|t| t.rates[0]).collect();
        }
        let (lo_idx, frac) = if temperature <= temps[0] {
            (0, 0.0)
        } else if temperature >= temps[temps.len() - 1] {
            (temps.len() - 2, 1.0)
        } else {
            let hi = temps.partition_point(|&t| t <= temperature);
            let lo = hi - 1;
            (lo, (temperature - temps[lo]) / (temps[hi] - temps[lo]))
        };
        self.transitions
            .iter()
            .map(|t| t.rates[lo_idx] + frac * (t.rates[lo_idx + 1] - t.rates[lo_idx]))
            .collect()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum MoleculeError {
    #[error("Molecule '{name}' has no energy levels")]
    NoLevels { name: String },
    #[error("Transition {index} of '{name}' references level {level}, but only {levels} exist")]
    InvalidLevel {
        name: String,
        index: usize,
        level: usize,
        levels: usize,
    },
    #[error("Transition {index} of '{name}' has upper level {upper} not above lower level {lower}")]
    InvertedTransition {
        name: String,
        index: usize,
        upper: usize,
        lower: usize,
    },
    #[error("Collision table for {partner} in '{name}': {reason}")]
    InvalidCollisionTable {
        name: String,
        partner: CollisionPartner,
        reason: String,
    },
    #[error("Non-physical value in '{name}': {reason}")]
    NonPhysical { name: String, reason: String },
}

/// Immutable description of one tracked species.
///
/// Built once by a loader and afterwards shared read-only across all worker threads.
#[derive(Debug, Clone, PartialEq)]
pub struct MolecularData {
    name: String,
    molecular_weight: f64,
    levels: Vec<Level>,
    lines: Vec<RadiativeTransition>,
    collisions: Vec<CollisionTable>,
}

impl MolecularData {
    /// Validates the raw tables and derives the Einstein B coefficients.
    ///
    /// `lines` are given as `(upper, lower, einstein_a, frequency_hz)` with zero-based
    /// level indices.
    pub fn new(
        name: impl Into<String>,
        molecular_weight: f64,
        levels: Vec<Level>,
        lines: &[(usize, usize, f64, f64)],
        collisions: Vec<CollisionTable>,
    ) -> Result<Self, MoleculeError> {
        let name = name.into();
        if levels.is_empty() {
            return Err(MoleculeError::NoLevels { name });
        }
        if !(molecular_weight > 0.0) {
            return Err(MoleculeError::NonPhysical {
                name,
                reason: format!("molecular weight {} must be positive", molecular_weight),
            });
        }
        if let Some(bad) = levels.iter().position(|l| !(l.weight > 0.0)) {
            return Err(MoleculeError::NonPhysical {
                name,
                reason: format!("level {} has non-positive statistical weight", bad),
            });
        }

        let nlev = levels.len();

        let mut radiative = Vec::with_capacity(lines.len());
        for (index, &(upper, lower, einstein_a, frequency)) in lines.iter().enumerate() {
            check_level_pair(&name, nlev, index, upper, lower)?;
            if levels[upper].energy < levels[lower].energy {
                return Err(MoleculeError::InvertedTransition {
                    name,
                    index,
                    upper,
                    lower,
                });
            }
            if !(frequency > 0.0) || einstein_a < 0.0 {
                return Err(MoleculeError::NonPhysical {
                    name,
                    reason: format!(
                        "line {} has frequency {} and A {}",
                        index, frequency, einstein_a
                    ),
                });
            }
            let einstein_b_upper =
                einstein_a * (CLIGHT / frequency).powi(2) / (HPLANCK * frequency) / 2.0;
            let einstein_b_lower = levels[upper].weight / levels[lower].weight * einstein_b_upper;
            radiative.push(RadiativeTransition {
                upper,
                lower,
                einstein_a,
                frequency,
                einstein_b_upper,
                einstein_b_lower,
            });
        }

        for table in &collisions {
            if table.temperatures.is_empty() {
                return Err(MoleculeError::InvalidCollisionTable {
                    name,
                    partner: table.partner,
                    reason: "no temperatures".to_string(),
                });
            }
            if table.temperatures.windows(2).any(|w| w[1] <= w[0]) {
                return Err(MoleculeError::InvalidCollisionTable {
                    name,
                    partner: table.partner,
                    reason: "temperatures must be strictly increasing".to_string(),
                });
            }
            for (index, t) in table.transitions.iter().enumerate() {
                check_level_pair(&name, nlev, index, t.upper, t.lower)?;
                if t.rates.len() != table.temperatures.len() {
                    return Err(MoleculeError::InvalidCollisionTable {
                        name,
                        partner: table.partner,
                        reason: format!(
                            "transition {} has {} rates for {} temperatures",
                            index,
                            t.rates.len(),
                            table.temperatures.len()
                        ),
                    });
                }
            }
        }

        Ok(Self {
            name,
            molecular_weight,
            levels,
            lines: radiative,
            collisions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn molecular_weight(&self) -> f64 {
        self.molecular_weight
    }

    /// Molecular mass in kg.
    pub fn mass(&self) -> f64 {
        self.molecular_weight * AMU
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn lines(&self) -> &[RadiativeTransition] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn collisions(&self) -> &[CollisionTable] {
        &self.collisions
    }

    pub fn collision_table(&self, partner: CollisionPartner) -> Option<&CollisionTable> {
        self.collisions.iter().find(|t| t.partner == partner)
    }

    /// Boltzmann factor `g_u / g_l * exp(-(E_u - E_l) / kT)` for a level pair.
    pub fn boltzmann_ratio(&self, upper: usize, lower: usize, temperature: f64) -> f64 {
        let lu = &self.levels[upper];
        let ll = &self.levels[lower];
        lu.weight / ll.weight * (-HCKB * (lu.energy - ll.energy) / temperature).exp()
    }
}

fn check_level_pair(
    name: &str,
    nlev: usize,
    index: usize,
    upper: usize,
    lower: usize,
) -> Result<(), MoleculeError> {
    for level in [upper, lower] {
        if level >= nlev {
            return Err(MoleculeError::InvalidLevel {
                name: name.to_string(),
                index,
                level,
                levels: nlev,
            });
        }
    }
    if upper == lower {
        return Err(MoleculeError::InvertedTransition {
            name: name.to_string(),
            index,
            upper,
            lower,
        });
    }
    Ok(())
}
