use crate::core::constants::{GAS_MASS_PER_H2, KBOLTZ};
use crate::core::models::grid::{Grid, GridPoint};
use crate::core::models::molecule::{CollisionPartner, CollisionTable, MolecularData};
use crate::core::models::populations::{Populations, Rates};
use crate::core::physics::radiation::{lte_populations, ortho_para_ratio, planck};
use crate::engine::config::{ConfigError, InitialPopulations, TemperaturePolicy};
use crate::engine::context::SolveContext;
use crate::engine::error::EngineError;
use crate::engine::progress::Progress;
use crate::engine::tasks::stateq;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{info, instrument, warn};

/// Derives the per-species local quantities of every grid point and sets the initial
/// populations.
///
/// # Errors
///
/// Returns [`EngineError::Configuration`] when an interior temperature lies outside a
/// collision table and the temperature policy is [`TemperaturePolicy::Reject`].
#[instrument(skip_all, name = "species_setup_task")]
pub fn run(grid: &mut Grid, context: &SolveContext) -> Result<(), EngineError> {
    context.reporter.report(Progress::PhaseStart {
        name: "Preparing Species",
    });
    check_temperature_ranges(grid, context)?;

    #[cfg(not(feature = "parallel"))]
    let iterator = grid.points_mut().iter_mut();

    #[cfg(feature = "parallel")]
    let iterator = grid.points_mut().par_iter_mut();

    iterator.for_each(|point| prepare_point(point, context));

    info!(
        species = context.species_count(),
        initial = ?context.config.solver.initial_populations,
        "Species prepared."
    );
    context.reporter.report(Progress::PhaseFinish);
    Ok(())
}

fn check_temperature_ranges(grid: &Grid, context: &SolveContext) -> Result<(), EngineError> {
    for molecule in context.molecules {
        for table in molecule.collisions() {
            let (lo, hi) = table.temperature_range();
            let outside: Vec<f64> = grid
                .points()
                .iter()
                .filter(|p| !p.sink)
                .map(|p| p.kinetic_temperature())
                .filter(|&t| t < lo || t > hi)
                .collect();
            let Some(worst) = outside.iter().copied().max_by(|a, b| {
                let da = (a - a.clamp(lo, hi)).abs();
                let db = (b - b.clamp(lo, hi)).abs();
                da.total_cmp(&db)
            }) else {
                continue;
            };
            match context.config.solver.temperature_policy {
                TemperaturePolicy::Clamp => warn!(
                    species = molecule.name(),
                    partner = %table.partner,
                    points = outside.len(),
                    worst,
                    lo,
                    hi,
                    "Grid temperatures outside the collision table; rates are clamped."
                ),
                TemperaturePolicy::Reject => {
                    return Err(ConfigError::InvalidValue {
                        parameter: "temperature",
                        reason: format!(
                            "{} points outside the {} table of '{}' ({} - {} K), e.g. {} K",
                            outside.len(),
                            table.partner,
                            molecule.name(),
                            lo,
                            hi,
                            worst
                        ),
                    }
                    .into());
                }
            }
        }
    }
    Ok(())
}

/// Density of the collision partner a table refers to, derived from the configured
/// partner densities.
///
/// Ortho and para H2 tables are fed from a total H2 density split by the thermal
/// ortho-to-para ratio; a total H2 table is fed from the sum of ortho and para densities.
pub fn partner_density(
    table_partner: CollisionPartner,
    partners: &[CollisionPartner],
    densities: &[f64],
    temperature: f64,
) -> f64 {
    let lookup = |p: CollisionPartner| partners.iter().position(|&q| q == p).map(|i| densities[i]);
    if let Some(n) = lookup(table_partner) {
        return n;
    }
    match table_partner {
        CollisionPartner::ParaH2 | CollisionPartner::OrthoH2 => {
            let Some(total) = lookup(CollisionPartner::H2) else {
                return 0.0;
            };
            let opr = ortho_para_ratio(temperature);
            if table_partner == CollisionPartner::OrthoH2 {
                total * opr / (1.0 + opr)
            } else {
                total / (1.0 + opr)
            }
        }
        CollisionPartner::H2 => {
            lookup(CollisionPartner::ParaH2).unwrap_or(0.0)
                + lookup(CollisionPartner::OrthoH2).unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

/// Collisional rates of one table at `temperature`, scaled by the partner density.
pub fn collision_rates(
    molecule: &MolecularData,
    table: &CollisionTable,
    temperature: f64,
    density: f64,
) -> Rates {
    let down: Vec<f64> = table
        .downward_rates(temperature)
        .into_iter()
        .map(|k| k * density)
        .collect();
    let up = table
        .transitions
        .iter()
        .zip(&down)
        .map(|(t, &d)| d * molecule.boltzmann_ratio(t.upper, t.lower, temperature))
        .collect();
    Rates { up, down }
}

/// Local quantities of one species at one point, with populations left empty.
pub fn local_populations(
    point: &GridPoint,
    molecule: &MolecularData,
    species: usize,
    context: &SolveContext,
) -> Populations {
    let temperature = point.kinetic_temperature();
    let mut pops = Populations::with_levels(Vec::new(), molecule.line_count());
    let abundance = point.abundances.get(species).copied().unwrap_or(0.0);
    pops.molecular_density = abundance * point.reference_density();
    pops.doppler_b = (point.turbulent_doppler.powi(2)
        + 2.0 * KBOLTZ * temperature.max(0.0) / molecule.mass())
    .sqrt();
    pops.inverse_b = if pops.doppler_b > 0.0 { 1.0 / pops.doppler_b } else { 0.0 };

    if !point.sink {
        pops.partners = molecule
            .collisions()
            .iter()
            .map(|table| {
                let density = partner_density(
                    table.partner,
                    &context.config.partners,
                    &point.densities,
                    temperature,
                );
                collision_rates(molecule, table, temperature, density)
            })
            .collect();
    }

    if let Some(dust) = context.dust {
        let dust_temperature = point.dust_temperature();
        let gas_to_dust = if point.gas_to_dust > 0.0 { point.gas_to_dust } else { 100.0 };
        for (i, line) in molecule.lines().iter().enumerate() {
            let mass_density = GAS_MASS_PER_H2 / gas_to_dust * point.reference_density();
            pops.dust_opacity[i] = dust.kappa(line.frequency) * mass_density;
            pops.dust_emission[i] = planck(line.frequency, dust_temperature);
        }
    }
    pops
}

fn prepare_point(point: &mut GridPoint, context: &SolveContext) {
    let background = context.config.transport.background_temperature;
    let mut all = Vec::with_capacity(context.species_count());
    for (species, molecule) in context.molecules.iter().enumerate() {
        let mut pops = local_populations(point, molecule, species, context);
        pops.levels = lte_populations(molecule, point.kinetic_temperature());

        let use_background = !point.sink
            && !context.config.is_lte(molecule.name())
            && context.config.solver.initial_populations == InitialPopulations::Background;
        if use_background {
            let jbar: Vec<f64> = molecule
                .lines()
                .iter()
                .map(|l| planck(l.frequency, background))
                .collect();
            match stateq::solve_statistical_equilibrium(molecule, &pops, &jbar) {
                Ok(levels) => pops.levels = levels,
                Err(reason) => warn!(
                    point = point.id,
                    species = molecule.name(),
                    %reason,
                    "Background equilibrium failed; starting from LTE."
                ),
            }
        }
        all.push(pops);
    }
    point.populations = all;
    point.converged = false;
}
