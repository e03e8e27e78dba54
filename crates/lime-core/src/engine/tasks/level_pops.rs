use crate::core::models::grid::Grid;
use crate::core::models::populations::max_relative_change;
use crate::engine::config::TransportConfig;
use crate::engine::context::SolveContext;
use crate::engine::error::EngineError;
use crate::engine::progress::{PassReport, Progress};
use crate::engine::tasks::{photon, stateq};
use crate::engine::utils::rng::point_rng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{info, instrument, warn};

/// New state of one interior point, computed from the previous pass only.
#[derive(Debug)]
struct PointUpdate {
    index: usize,
    /// `(levels, jbar)` per species.
    species: Vec<(Vec<f64>, Vec<f64>)>,
    changes: Vec<f64>,
    failures: Vec<EngineError>,
}

impl PointUpdate {
    fn is_converged(&self, tolerance: f64) -> bool {
        self.failures.is_empty() && self.changes.iter().all(|&c| c < tolerance)
    }
}

fn update_point(grid: &Grid, index: usize, pass: usize, context: &SolveContext) -> PointUpdate {
    let point = &grid.points()[index];
    let mut rng = point_rng(context.config.seed, index, pass);
    let buffer = photon::trace_rays(grid, index, point.rays, context, &mut rng);

    let mut update = PointUpdate {
        index,
        species: Vec::with_capacity(context.species_count()),
        changes: Vec::with_capacity(context.species_count()),
        failures: Vec::new(),
    };
    for (species, molecule) in context.molecules.iter().enumerate() {
        let solution = stateq::solve_local(context, point, species, &buffer);
        let previous = &point.populations[species].levels;
        update.changes.push(max_relative_change(
            &solution.levels,
            previous,
            context.config.solver.min_population,
        ));
        if let Some(reason) = solution.failure {
            update.failures.push(EngineError::PopulationSolveFailed {
                point: index,
                species: molecule.name().to_string(),
                reason,
            });
        }
        update.species.push((solution.levels, solution.jbar));
    }
    context.reporter.report(Progress::TaskIncrement);
    update
}

/// Runs one synchronous pass over every interior point.
///
/// All transport reads the populations of the previous pass; the new populations are
/// committed in point order only after every point has been processed, so the result does
/// not depend on scheduling. A failed local solve keeps the point's previous populations
/// and leaves it unconverged.
#[instrument(skip_all, name = "level_populations_task", fields(pass = pass))]
pub fn run(grid: &mut Grid, context: &SolveContext, pass: usize) -> PassReport {
    let interior = grid.interior_indices();
    context.reporter.report(Progress::TaskStart {
        total: interior.len() as u64,
    });

    let updates: Vec<PointUpdate> = {
        let snapshot: &Grid = grid;

        #[cfg(not(feature = "parallel"))]
        let iterator = interior.iter();

        #[cfg(feature = "parallel")]
        let iterator = interior.par_iter();

        iterator
            .map(|&index| update_point(snapshot, index, pass, context))
            .collect()
    };
    context.reporter.report(Progress::TaskFinish);

    let tolerance = context.config.convergence.tolerance;
    let mut max_change = vec![0.0f64; context.species_count()];
    let mut converged = 0;
    let mut failed_solves = 0;
    let mut total_rays = 0;

    for update in updates {
        let is_converged = update.is_converged(tolerance);
        let point = &mut grid.points_mut()[update.index];
        total_rays += point.rays;
        for failure in &update.failures {
            warn!(%failure, "Keeping previous populations.");
        }
        failed_solves += update.failures.len();

        let species_updates = update.species.into_iter().zip(&update.changes);
        for (species, ((levels, jbar), change)) in species_updates.enumerate() {
            let pops = &mut point.populations[species];
            pops.levels = levels;
            pops.jbar = jbar;
            pops.converged = *change < tolerance;
            max_change[species] = max_change[species].max(*change);
        }
        point.converged = is_converged;
        if is_converged {
            converged += 1;
        }
    }

    let fraction_converged = if interior.is_empty() {
        1.0
    } else {
        converged as f64 / interior.len() as f64
    };
    info!(
        pass,
        fraction_converged,
        ?max_change,
        failed_solves,
        total_rays,
        "Pass complete."
    );
    PassReport {
        pass,
        fraction_converged,
        max_change,
        failed_solves,
        total_rays,
    }
}

/// Multiplies the ray count of every selected interior point by the growth factor,
/// capped at `max_rays`. Returns the number of points whose count changed.
pub fn escalate_rays(
    grid: &mut Grid,
    transport: &TransportConfig,
    select: impl Fn(bool) -> bool,
) -> usize {
    let mut escalated = 0;
    for point in grid.points_mut().iter_mut().filter(|p| !p.sink) {
        if !select(point.converged) {
            continue;
        }
        let rays = point
            .rays
            .saturating_mul(transport.ray_growth)
            .min(transport.max_rays);
        if rays != point.rays {
            point.rays = rays;
            escalated += 1;
        }
    }
    escalated
}
