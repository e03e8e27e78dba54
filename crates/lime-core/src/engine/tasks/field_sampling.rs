use crate::core::models::grid::{Grid, GridPoint};
use crate::core::physics::fields::PhysicalModel;
use crate::core::utils::spline::{VELOCITY_KNOTS, VelocitySpline};
use crate::engine::config::ConfigError;
use crate::engine::context::SolveContext;
use crate::engine::error::EngineError;
use crate::engine::progress::Progress;
use nalgebra::{Point3, Vector3};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{info, instrument};

/// Evaluates the model at every grid point and along every neighbour segment.
///
/// # Errors
///
/// Returns [`EngineError::Configuration`] when the model reports the wrong number of
/// densities or abundances, or non-physical values at an interior point.
#[instrument(skip_all, name = "field_sampling_task")]
pub fn run(
    grid: &mut Grid,
    model: &dyn PhysicalModel,
    context: &SolveContext,
) -> Result<(), EngineError> {
    context.reporter.report(Progress::PhaseStart {
        name: "Sampling Fields",
    });
    let partners = context.config.partners.len();
    let species = context.species_count();
    let positions: Vec<Point3<f64>> = grid.points().iter().map(|p| p.position).collect();

    #[cfg(not(feature = "parallel"))]
    let iterator = grid.points_mut().iter_mut();

    #[cfg(feature = "parallel")]
    let iterator = grid.points_mut().par_iter_mut();

    iterator.try_for_each(|point| sample_point(point, &positions, model, partners, species))?;

    info!(points = grid.len(), "Physical fields sampled.");
    context.reporter.report(Progress::PhaseFinish);
    Ok(())
}

fn model_error(point: &GridPoint, reason: String) -> EngineError {
    ConfigError::InvalidValue {
        parameter: "model",
        reason: format!("at point {} {:?}: {}", point.id, point.position.coords.as_slice(), reason),
    }
    .into()
}

fn sample_point(
    point: &mut GridPoint,
    positions: &[Point3<f64>],
    model: &dyn PhysicalModel,
    partners: usize,
    species: usize,
) -> Result<(), EngineError> {
    let position = point.position;
    let densities = model.density(&position);
    let abundances = model.abundance(&position);
    if densities.len() != partners {
        return Err(model_error(
            point,
            format!("{} densities for {} collision partners", densities.len(), partners),
        ));
    }
    if abundances.len() != species {
        return Err(model_error(
            point,
            format!("{} abundances for {} species", abundances.len(), species),
        ));
    }
    let temperature = model.temperature(&position);

    if !point.sink {
        if densities.iter().chain(&abundances).any(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(model_error(point, "negative or non-finite density or abundance".into()));
        }
        if !(temperature[0].is_finite() && temperature[0] > 0.0) {
            return Err(model_error(
                point,
                format!("kinetic temperature {} is not positive", temperature[0]),
            ));
        }
    }

    point.densities = densities;
    point.abundances = abundances;
    point.temperature = temperature;
    point.turbulent_doppler = model.doppler(&position);
    point.velocity = model.velocity(&position);
    point.magnetic_field = model.magnetic_field(&position);
    point.gas_to_dust = model.gas_to_dust(&position);

    for neighbor in &mut point.neighbors {
        let target = positions[neighbor.index];
        let knots: [Vector3<f64>; VELOCITY_KNOTS] = std::array::from_fn(|k| {
            let s = k as f64 / (VELOCITY_KNOTS - 1) as f64;
            model.velocity(&(position + (target - position) * s))
        });
        neighbor.velocity = VelocitySpline::from_knots(knots);
    }
    Ok(())
}
