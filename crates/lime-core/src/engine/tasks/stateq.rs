use crate::core::constants::MIN_DTAU;
use crate::core::models::grid::GridPoint;
use crate::core::models::molecule::MolecularData;
use crate::core::models::populations::{Populations, max_relative_change, normalize_populations};
use crate::core::physics::radiation::{
    gaussline, line_coefficients, lte_populations, optical_step, planck,
};
use crate::engine::context::SolveContext;
use crate::engine::tasks::photon::RayBuffer;
use nalgebra::{DMatrix, DVector};

/// Solved populations below this are treated as a failed solve rather than round-off.
const NEGATIVE_TOLERANCE: f64 = -1e-10;

/// Builds the rate matrix `M` with `M[(i, j)]` the transition rate from level `j` to
/// level `i` and diagonal entries making every column sum to zero.
pub fn build_rate_matrix(
    molecule: &MolecularData,
    pops: &Populations,
    jbar: &[f64],
) -> DMatrix<f64> {
    let n = molecule.level_count();
    let mut matrix = DMatrix::<f64>::zeros(n, n);

    for (line, &j) in molecule.lines().iter().zip(jbar) {
        let (u, l) = (line.upper, line.lower);
        matrix[(l, u)] += line.einstein_a + line.einstein_b_upper * j;
        matrix[(u, l)] += line.einstein_b_lower * j;
    }
    for (table, rates) in molecule.collisions().iter().zip(&pops.partners) {
        let pairs = rates.up.iter().zip(&rates.down);
        for (transition, (&up, &down)) in table.transitions.iter().zip(pairs) {
            matrix[(transition.lower, transition.upper)] += down;
            matrix[(transition.upper, transition.lower)] += up;
        }
    }
    for j in 0..n {
        let outflow: f64 = (0..n).filter(|&i| i != j).map(|i| matrix[(i, j)]).sum();
        matrix[(j, j)] = -outflow;
    }
    matrix
}

/// Steady-state level populations for the given mean intensities.
///
/// The last rate equation is replaced by the normalisation constraint and the system is
/// solved by LU decomposition. Fails for singular systems and for solutions with
/// significantly negative or non-finite entries.
pub fn solve_statistical_equilibrium(
    molecule: &MolecularData,
    pops: &Populations,
    jbar: &[f64],
) -> Result<Vec<f64>, String> {
    let n = molecule.level_count();
    if n == 1 {
        return Ok(vec![1.0]);
    }
    let mut matrix = build_rate_matrix(molecule, pops, jbar);
    matrix.row_mut(n - 1).fill(1.0);
    let mut rhs = DVector::<f64>::zeros(n);
    rhs[n - 1] = 1.0;

    let solution = matrix
        .lu()
        .solve(&rhs)
        .ok_or_else(|| "rate matrix is singular".to_string())?;
    if let Some((level, value)) = solution
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < NEGATIVE_TOLERANCE)
    {
        return Err(format!("level {} solved to non-physical population {:e}", level, value));
    }
    let mut levels: Vec<f64> = solution.iter().copied().collect();
    normalize_populations(&mut levels);
    Ok(levels)
}

/// Whether collisions dominate every line strongly enough to assume LTE.
pub fn is_thermalised(molecule: &MolecularData, pops: &Populations, ratio: f64) -> bool {
    if pops.partners.is_empty() {
        return false;
    }
    molecule.lines().iter().all(|line| {
        let collisional: f64 = molecule
            .collisions()
            .iter()
            .zip(&pops.partners)
            .flat_map(|(table, rates)| {
                table
                    .transitions
                    .iter()
                    .zip(&rates.down)
                    .filter(|(t, _)| t.upper == line.upper && t.lower == line.lower)
                    .map(|(_, &down)| down)
            })
            .sum();
        collisional > ratio * line.einstein_a
    })
}

/// Mean intensity of every line of `species` at `point`, combining what the rays carried
/// in with the emission of the point's own half segments computed from `levels`.
///
/// Lines of the same species blended into a line use `levels` too; other species use
/// their populations from the previous pass.
pub fn compute_jbar(
    context: &SolveContext,
    point: &GridPoint,
    species: usize,
    levels: &[f64],
    buffer: &RayBuffer,
) -> Vec<f64> {
    let molecule = &context.molecules[species];
    let pops = &point.populations[species];
    let cutoff = context.config.transport.taylor_cutoff;
    let background = context.config.transport.background_temperature;

    molecule
        .lines()
        .iter()
        .enumerate()
        .map(|(line_index, line)| {
            let mut weighted = 0.0;
            let mut norm = 0.0;
            for (ray, origin) in buffer.origins().iter().enumerate() {
                let vfac = gaussline(origin.deltav, pops.inverse_b);
                if vfac <= 0.0 {
                    continue;
                }
                let (mut jnu, mut alpha) =
                    line_coefficients(line, levels, pops.molecular_density, pops.inverse_b, vfac);
                jnu += pops.dust_emission[line_index] * pops.dust_opacity[line_index];
                alpha += pops.dust_opacity[line_index];

                for blend in context.blends.partners(species, line_index) {
                    let partner = &point.populations[blend.species];
                    let partner_levels = if blend.species == species {
                        levels
                    } else {
                        &partner.levels
                    };
                    let partner_vfac =
                        gaussline(origin.deltav - blend.velocity_offset, partner.inverse_b);
                    let (j, a) = line_coefficients(
                        &context.molecules[blend.species].lines()[blend.line],
                        partner_levels,
                        partner.molecular_density,
                        partner.inverse_b,
                        partner_vfac,
                    );
                    jnu += j;
                    alpha += a;
                }

                let ds = origin.first_half;
                let step = optical_step((alpha * ds).max(MIN_DTAU), cutoff);
                let incoming = buffer.intensity(ray, species, line_index);
                weighted += vfac * (step.attenuation * incoming + step.remnant * jnu * ds);
                norm += vfac;
            }
            if norm > 0.0 {
                weighted / norm
            } else {
                planck(line.frequency, background)
            }
        })
        .collect()
}

/// Result of the local statistical-equilibrium iteration for one species at one point.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSolution {
    pub levels: Vec<f64>,
    pub jbar: Vec<f64>,
    /// Reason the rate-matrix solve failed; levels and jbar are then the previous ones.
    pub failure: Option<String>,
}

/// Iterates jbar and the rate-matrix solve at one point until the populations settle.
pub fn solve_local(
    context: &SolveContext,
    point: &GridPoint,
    species: usize,
    buffer: &RayBuffer,
) -> LocalSolution {
    let molecule = &context.molecules[species];
    let pops = &point.populations[species];
    let solver = &context.config.solver;

    let thermalised = solver
        .lte_collision_ratio
        .is_some_and(|ratio| is_thermalised(molecule, pops, ratio));
    if context.config.is_lte(molecule.name()) || thermalised {
        let levels = lte_populations(molecule, point.kinetic_temperature());
        let jbar = compute_jbar(context, point, species, &levels, buffer);
        return LocalSolution {
            levels,
            jbar,
            failure: None,
        };
    }

    let mut levels = pops.levels.clone();
    let mut jbar = pops.jbar.clone();
    for _ in 0..solver.local_iterations {
        jbar = compute_jbar(context, point, species, &levels, buffer);
        match solve_statistical_equilibrium(molecule, pops, &jbar) {
            Ok(next) => {
                let change = max_relative_change(&next, &levels, solver.min_population);
                levels = next;
                if change < solver.local_tolerance {
                    break;
                }
            }
            Err(reason) => {
                return LocalSolution {
                    levels: pops.levels.clone(),
                    jbar: pops.jbar.clone(),
                    failure: Some(reason),
                };
            }
        }
    }
    LocalSolution {
        levels,
        jbar,
        failure: None,
    }
}
