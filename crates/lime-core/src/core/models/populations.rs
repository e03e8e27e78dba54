use crate::core::constants::POPULATION_FLOOR;
use serde::{Deserialize, Serialize};

/// Collisional rates of one partner at one grid point, in s^-1.
///
/// Entries are aligned with the transitions of the matching collision table and
/// already include the partner density.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    pub up: Vec<f64>,
    pub down: Vec<f64>,
}

/// Level populations of one species at one grid point, together with the local
/// coefficients derived from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Populations {
    /// Fractional level occupations; they sum to one and never drop below the floor.
    pub levels: Vec<f64>,
    /// Number density of the species (m^-3).
    pub molecular_density: f64,
    /// Total doppler b parameter (m/s), thermal and turbulent.
    pub doppler_b: f64,
    /// `1 / doppler_b`.
    pub inverse_b: f64,
    /// Dust continuum opacity at each line frequency (m^-1).
    pub dust_opacity: Vec<f64>,
    /// Dust Planck emission at each line frequency (W m^-2 Hz^-1 sr^-1).
    pub dust_emission: Vec<f64>,
    /// Collisional rates, one entry per collision table of the species.
    pub partners: Vec<Rates>,
    /// Most recent mean intensity estimate per line; overwritten every pass.
    pub jbar: Vec<f64>,
    pub converged: bool,
}

impl Populations {
    pub fn with_levels(levels: Vec<f64>, line_count: usize) -> Self {
        Self {
            levels,
            dust_opacity: vec![0.0; line_count],
            dust_emission: vec![0.0; line_count],
            jbar: vec![0.0; line_count],
            ..Default::default()
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Largest fractional change against `previous`, over levels above `min_population`.
    pub fn max_relative_change(&self, previous: &[f64], min_population: f64) -> f64 {
        max_relative_change(&self.levels, previous, min_population)
    }
}

pub fn max_relative_change(current: &[f64], previous: &[f64], min_population: f64) -> f64 {
    current
        .iter()
        .zip(previous)
        .filter(|(new, _)| **new > min_population)
        .map(|(new, old)| (new - old).abs() / new)
        .fold(0.0, f64::max)
}

/// Clamps every entry to the floor and rescales so the entries sum to one.
pub fn normalize_populations(levels: &mut [f64]) {
    for value in levels.iter_mut() {
        if !value.is_finite() || *value < POPULATION_FLOOR {
            *value = POPULATION_FLOOR;
        }
    }
    let sum: f64 = levels.iter().sum();
    if sum > 0.0 {
        for value in levels.iter_mut() {
            *value = (*value / sum).max(POPULATION_FLOOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_and_rescales() {
        let mut levels = vec![2.0, -1e-12, 2.0, f64::NAN];
        normalize_populations(&mut levels);
        let sum: f64 = levels.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(levels.iter().all(|&v| v >= POPULATION_FLOOR));
        assert!((levels[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn relative_change_ignores_trace_levels() {
        let current = [0.5, 0.5 - 1e-9, 1e-9];
        let previous = [0.25, 0.75 - 1e-9, 2e-9];
        let change = max_relative_change(&current, &previous, 1e-6);
        assert!((change - 0.5).abs() < 1e-6);
    }

    #[test]
    fn relative_change_is_zero_for_identical_levels() {
        let p = Populations::with_levels(vec![0.3, 0.7], 1);
        assert_eq!(p.max_relative_change(&[0.3, 0.7], 1e-6), 0.0);
        assert_eq!(p.jbar.len(), 1);
    }
}
