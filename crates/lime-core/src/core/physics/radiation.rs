use crate::core::constants::{CLIGHT, HCKB, HPIP, HPLANCK, KBOLTZ, MIN_DTAU, ORTHO_TO_PARA_MAX};
use crate::core::models::molecule::{MolecularData, RadiativeTransition};
use crate::core::models::populations::normalize_populations;

/// Planck specific intensity B_nu(T) in W m^-2 Hz^-1 sr^-1.
///
/// Returns zero for non-positive temperatures and where the exponent would overflow.
pub fn planck(frequency: f64, temperature: f64) -> f64 {
    if temperature <= 0.0 {
        return 0.0;
    }
    let x = HPLANCK * frequency / (KBOLTZ * temperature);
    if x > 700.0 {
        return 0.0;
    }
    2.0 * HPLANCK * frequency.powi(3) / (CLIGHT * CLIGHT) / x.exp_m1()
}

/// Unnormalised Gaussian line profile at velocity offset `dv` (m/s).
#[inline]
pub fn gaussline(dv: f64, inverse_b: f64) -> f64 {
    let x = dv * inverse_b;
    (-x * x).exp()
}

/// Attenuation and source weighting of one optical-depth increment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpticalStep {
    /// `exp(-dtau)`.
    pub attenuation: f64,
    /// `(1 - exp(-dtau)) / dtau`, the fraction of the local emission that survives
    /// self-absorption within the step.
    pub remnant: f64,
}

/// Evaluates an optical-depth increment, switching to a Taylor expansion for
/// `|dtau| < taylor_cutoff` where the closed form loses precision.
///
/// Increments below [`MIN_DTAU`] are clamped to it so strongly inverted lines stay finite.
pub fn optical_step(dtau: f64, taylor_cutoff: f64) -> OpticalStep {
    let dtau = dtau.max(MIN_DTAU);
    if dtau.abs() < taylor_cutoff {
        let remnant = 1.0 - dtau / 2.0 + dtau * dtau / 6.0 - dtau * dtau * dtau / 24.0;
        OpticalStep {
            attenuation: (-dtau).exp(),
            remnant,
        }
    } else {
        OpticalStep {
            attenuation: (-dtau).exp(),
            remnant: -(-dtau).exp_m1() / dtau,
        }
    }
}

/// Line emissivity and absorption coefficient of one transition.
///
/// `vfac` is the (dimensionless) profile value, `inverse_b` the inverse doppler b of the
/// emitting gas and `molecular_density` its number density. Returns `(j, alpha)` with
/// `j` in W m^-3 Hz^-1 sr^-1 and `alpha` in m^-1.
#[inline]
pub fn line_coefficients(
    line: &RadiativeTransition,
    levels: &[f64],
    molecular_density: f64,
    inverse_b: f64,
    vfac: f64,
) -> (f64, f64) {
    let factor = vfac * HPIP * inverse_b * molecular_density;
    let upper = levels[line.upper];
    let lower = levels[line.lower];
    let j = factor * line.einstein_a * upper;
    let alpha = factor * (lower * line.einstein_b_lower - upper * line.einstein_b_upper);
    (j, alpha)
}

/// Boltzmann level distribution of `molecule` at `temperature`, normalised.
///
/// At zero temperature everything sits in the ground state.
pub fn lte_populations(molecule: &MolecularData, temperature: f64) -> Vec<f64> {
    let levels = molecule.levels();
    let mut pops: Vec<f64> = if temperature > 0.0 {
        let e0 = levels[0].energy;
        levels
            .iter()
            .map(|l| l.weight * (-HCKB * (l.energy - e0) / temperature).exp())
            .collect()
    } else {
        let mut ground = vec![0.0; levels.len()];
        ground[0] = 1.0;
        ground
    };
    normalize_populations(&mut pops);
    pops
}

/// Thermal ortho-to-para H2 ratio, capped at its high-temperature limit.
pub fn ortho_para_ratio(temperature: f64) -> f64 {
    if temperature <= 0.0 {
        return 0.0;
    }
    (9.0 * (-170.6 / temperature).exp()).min(ORTHO_TO_PARA_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::molecule::tests::two_level_molecule;

    #[test]
    fn planck_is_zero_at_zero_temperature_and_matches_rayleigh_jeans() {
        assert_eq!(planck(1e11, 0.0), 0.0);
        let nu = 1e9;
        let t = 1000.0;
        let rj = 2.0 * nu * nu * KBOLTZ * t / (CLIGHT * CLIGHT);
        assert!((planck(nu, t) - rj).abs() / rj < 1e-3);
    }

    #[test]
    fn taylor_and_closed_form_agree_near_cutoff() {
        let below = optical_step(0.0099, 1e-2);
        let above = optical_step(0.0099, 1e-3);
        assert!((below.remnant - above.remnant).abs() < 1e-9);
        assert_eq!(optical_step(0.0, 1e-2).remnant, 1.0);
    }

    #[test]
    fn negative_optical_depth_is_clamped() {
        let step = optical_step(-1e4, 1e-2);
        assert!(step.attenuation.is_finite());
        assert_eq!(step.attenuation, (30.0f64).exp());
    }

    #[test]
    fn lte_populations_follow_boltzmann_ratio() {
        let mol = two_level_molecule(1e-5, 1e-16);
        let pops = lte_populations(&mol, 20.0);
        let expected = mol.boltzmann_ratio(1, 0, 20.0);
        assert!((pops[1] / pops[0] - expected).abs() / expected < 1e-12);
        assert!((pops.iter().sum::<f64>() - 1.0).abs() < 1e-12);

        let cold = lte_populations(&mol, 0.0);
        assert!((cold[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn line_coefficients_vanish_for_thermalised_ground_state_without_upper_population() {
        let mol = two_level_molecule(1e-5, 1e-16);
        let line = &mol.lines()[0];
        let (j, alpha) = line_coefficients(line, &[1.0, 0.0], 1e3, 1e-3, 1.0);
        assert_eq!(j, 0.0);
        assert!(alpha > 0.0);
    }

    #[test]
    fn ortho_para_ratio_saturates() {
        assert_eq!(ortho_para_ratio(1e4), ORTHO_TO_PARA_MAX);
        assert!(ortho_para_ratio(20.0) < 0.01);
    }
}
