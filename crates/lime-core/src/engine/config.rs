use crate::core::constants::{
    DEFAULT_BACKGROUND_TEMPERATURE, DEFAULT_GOAL_FRACTION, DEFAULT_INITIAL_RAYS,
    DEFAULT_LOCAL_ITERATIONS, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_RAYS, DEFAULT_RAYS_PER_SEGMENT,
    DEFAULT_SMOOTHING_ITERATIONS, DEFAULT_TOLERANCE, BLEND_MASK, MIN_POPULATION,
};
use crate::core::models::molecule::CollisionPartner;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

fn invalid(parameter: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        parameter,
        reason: reason.into(),
    }
}

/// How candidate interior positions are drawn before density rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingScheme {
    /// Uniform in Cartesian coordinates inside the sphere.
    Uniform,
    /// Uniform in log radius between the minimum scale and the domain radius.
    #[default]
    LogRadius,
}

/// What to do when a grid temperature falls outside a collision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemperaturePolicy {
    /// Clamp rates to the nearest tabulated temperature and log a warning.
    #[default]
    Clamp,
    /// Refuse to start the run.
    Reject,
}

/// Populations each species starts from before the first pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitialPopulations {
    #[default]
    Lte,
    /// Statistical equilibrium in the bare background radiation field.
    Background,
}

/// Which points have their ray budget raised after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RayEscalation {
    #[default]
    UnconvergedOnly,
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredefinedPoint {
    pub position: Point3<f64>,
    pub sink: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    /// Radius of the spherical model domain (m).
    pub radius: f64,
    /// Smallest spatial scale resolved by log-radius sampling (m).
    pub min_scale: f64,
    pub interior_points: usize,
    pub sink_points: usize,
    pub sampling: SamplingScheme,
    pub smoothing_iterations: usize,
    /// Size of the direction set used to estimate neighbour solid angles.
    pub weight_samples: usize,
    /// Replaces sampling entirely when set.
    pub predefined: Option<Vec<PredefinedPoint>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub initial_rays: usize,
    pub max_rays: usize,
    pub ray_growth: usize,
    /// Profile samples taken along each half segment.
    pub samples_per_segment: usize,
    pub max_ray_steps: usize,
    pub taylor_cutoff: f64,
    /// Temperature of the background radiation field (K); zero disables it.
    pub background_temperature: f64,
    pub blend: bool,
    /// Velocity separation (m/s) under which lines are blended.
    pub blend_threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    pub local_iterations: usize,
    pub local_tolerance: f64,
    pub min_population: f64,
    pub lte_only: bool,
    /// Species (by name) solved in LTE even when `lte_only` is off.
    pub lte_species: Vec<String>,
    /// Treat a point as thermalised when collisional de-excitation exceeds this multiple
    /// of A for every line.
    pub lte_collision_ratio: Option<f64>,
    pub initial_populations: InitialPopulations,
    pub temperature_policy: TemperaturePolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub goal_fraction: f64,
    /// Consecutive passes above the goal fraction needed to stop.
    pub required_streak: usize,
    pub escalation: RayEscalation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub grid: GridConfig,
    pub transport: TransportConfig,
    pub solver: SolverConfig,
    pub convergence: ConvergenceConfig,
    /// Collision partners in the order the model reports densities.
    pub partners: Vec<CollisionPartner>,
    pub seed: u64,
    /// Worker threads; `None` uses the rayon default.
    pub threads: Option<usize>,
}

impl EngineConfig {
    pub fn is_lte(&self, species: &str) -> bool {
        self.solver.lte_only || self.solver.lte_species.iter().any(|s| s == species)
    }
}

#[derive(Default)]
pub struct EngineConfigBuilder {
    radius: Option<f64>,
    min_scale: Option<f64>,
    interior_points: Option<usize>,
    sink_points: Option<usize>,
    sampling: Option<SamplingScheme>,
    smoothing_iterations: Option<usize>,
    weight_samples: Option<usize>,
    predefined: Option<Vec<PredefinedPoint>>,

    initial_rays: Option<usize>,
    max_rays: Option<usize>,
    ray_growth: Option<usize>,
    samples_per_segment: Option<usize>,
    max_ray_steps: Option<usize>,
    taylor_cutoff: Option<f64>,
    background_temperature: Option<f64>,
    blend: Option<bool>,
    blend_threshold: Option<f64>,

    local_iterations: Option<usize>,
    local_tolerance: Option<f64>,
    min_population: Option<f64>,
    lte_only: Option<bool>,
    lte_species: Vec<String>,
    lte_collision_ratio: Option<f64>,
    initial_populations: Option<InitialPopulations>,
    temperature_policy: Option<TemperaturePolicy>,

    max_iterations: Option<usize>,
    tolerance: Option<f64>,
    goal_fraction: Option<f64>,
    required_streak: Option<usize>,
    escalation: Option<RayEscalation>,

    partners: Option<Vec<CollisionPartner>>,
    seed: Option<u64>,
    threads: Option<usize>,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }
    pub fn min_scale(mut self, scale: f64) -> Self {
        self.min_scale = Some(scale);
        self
    }
    pub fn interior_points(mut self, count: usize) -> Self {
        self.interior_points = Some(count);
        self
    }
    pub fn sink_points(mut self, count: usize) -> Self {
        self.sink_points = Some(count);
        self
    }
    pub fn sampling(mut self, scheme: SamplingScheme) -> Self {
        self.sampling = Some(scheme);
        self
    }
    pub fn smoothing_iterations(mut self, iterations: usize) -> Self {
        self.smoothing_iterations = Some(iterations);
        self
    }
    pub fn weight_samples(mut self, samples: usize) -> Self {
        self.weight_samples = Some(samples);
        self
    }
    pub fn predefined_points(mut self, points: Vec<PredefinedPoint>) -> Self {
        self.predefined = Some(points);
        self
    }

    pub fn initial_rays(mut self, rays: usize) -> Self {
        self.initial_rays = Some(rays);
        self
    }
    pub fn max_rays(mut self, rays: usize) -> Self {
        self.max_rays = Some(rays);
        self
    }
    pub fn ray_growth(mut self, factor: usize) -> Self {
        self.ray_growth = Some(factor);
        self
    }
    pub fn samples_per_segment(mut self, samples: usize) -> Self {
        self.samples_per_segment = Some(samples);
        self
    }
    pub fn max_ray_steps(mut self, steps: usize) -> Self {
        self.max_ray_steps = Some(steps);
        self
    }
    pub fn taylor_cutoff(mut self, cutoff: f64) -> Self {
        self.taylor_cutoff = Some(cutoff);
        self
    }
    pub fn background_temperature(mut self, temperature: f64) -> Self {
        self.background_temperature = Some(temperature);
        self
    }
    pub fn blend(mut self, enabled: bool) -> Self {
        self.blend = Some(enabled);
        self
    }
    pub fn blend_threshold(mut self, threshold: f64) -> Self {
        self.blend_threshold = Some(threshold);
        self
    }

    pub fn local_iterations(mut self, iterations: usize) -> Self {
        self.local_iterations = Some(iterations);
        self
    }
    pub fn local_tolerance(mut self, tolerance: f64) -> Self {
        self.local_tolerance = Some(tolerance);
        self
    }
    pub fn min_population(mut self, population: f64) -> Self {
        self.min_population = Some(population);
        self
    }
    pub fn lte_only(mut self, enabled: bool) -> Self {
        self.lte_only = Some(enabled);
        self
    }
    pub fn lte_species(mut self, species: Vec<String>) -> Self {
        self.lte_species = species;
        self
    }
    pub fn lte_collision_ratio(mut self, ratio: f64) -> Self {
        self.lte_collision_ratio = Some(ratio);
        self
    }
    pub fn initial_populations(mut self, initial: InitialPopulations) -> Self {
        self.initial_populations = Some(initial);
        self
    }
    pub fn temperature_policy(mut self, policy: TemperaturePolicy) -> Self {
        self.temperature_policy = Some(policy);
        self
    }

    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }
    pub fn goal_fraction(mut self, fraction: f64) -> Self {
        self.goal_fraction = Some(fraction);
        self
    }
    pub fn required_streak(mut self, passes: usize) -> Self {
        self.required_streak = Some(passes);
        self
    }
    pub fn escalation(mut self, policy: RayEscalation) -> Self {
        self.escalation = Some(policy);
        self
    }

    pub fn partners(mut self, partners: Vec<CollisionPartner>) -> Self {
        self.partners = Some(partners);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let radius = self.radius.ok_or(ConfigError::MissingParameter("radius"))?;
        if !(radius.is_finite() && radius > 0.0) {
            return Err(invalid("radius", format!("{} is not a positive length", radius)));
        }
        let min_scale = self.min_scale.unwrap_or(radius * 1e-3);
        if !(min_scale > 0.0 && min_scale < radius) {
            return Err(invalid("min_scale", format!("{} must lie in (0, radius)", min_scale)));
        }

        let (interior_points, sink_points) = match &self.predefined {
            Some(points) => {
                let sinks = points.iter().filter(|p| p.sink).count();
                (points.len() - sinks, sinks)
            }
            None => (
                self.interior_points
                    .ok_or(ConfigError::MissingParameter("interior_points"))?,
                self.sink_points
                    .ok_or(ConfigError::MissingParameter("sink_points"))?,
            ),
        };
        if interior_points == 0 {
            return Err(invalid("interior_points", "at least one interior point is required"));
        }
        if interior_points + sink_points < 4 {
            return Err(invalid(
                "interior_points",
                format!("{} points cannot span a volume", interior_points + sink_points),
            ));
        }
        let weight_samples = self.weight_samples.unwrap_or(512);
        if weight_samples == 0 {
            return Err(invalid("weight_samples", "must be positive"));
        }

        let initial_rays = self.initial_rays.unwrap_or(DEFAULT_INITIAL_RAYS);
        let max_rays = self.max_rays.unwrap_or(DEFAULT_MAX_RAYS.max(initial_rays));
        if initial_rays == 0 {
            return Err(invalid("initial_rays", "must be positive"));
        }
        if max_rays < initial_rays {
            return Err(invalid(
                "max_rays",
                format!("{} is below initial_rays ({})", max_rays, initial_rays),
            ));
        }
        let ray_growth = self.ray_growth.unwrap_or(2);
        if ray_growth == 0 {
            return Err(invalid("ray_growth", "must be at least 1"));
        }
        let samples_per_segment = self.samples_per_segment.unwrap_or(DEFAULT_RAYS_PER_SEGMENT);
        if samples_per_segment == 0 {
            return Err(invalid("samples_per_segment", "must be positive"));
        }
        let max_ray_steps = self.max_ray_steps.unwrap_or(100_000);
        if max_ray_steps == 0 {
            return Err(invalid("max_ray_steps", "must be positive"));
        }
        let taylor_cutoff = self.taylor_cutoff.unwrap_or(1e-2);
        if !(taylor_cutoff >= 0.0 && taylor_cutoff < 1.0) {
            return Err(invalid("taylor_cutoff", "must lie in [0, 1)"));
        }
        let background_temperature = self
            .background_temperature
            .unwrap_or(DEFAULT_BACKGROUND_TEMPERATURE);
        if !(background_temperature >= 0.0 && background_temperature.is_finite()) {
            return Err(invalid("background_temperature", "must be a non-negative temperature"));
        }
        let blend_threshold = self.blend_threshold.unwrap_or(BLEND_MASK);
        if !(blend_threshold > 0.0) {
            return Err(invalid("blend_threshold", "must be positive"));
        }

        let local_iterations = self.local_iterations.unwrap_or(DEFAULT_LOCAL_ITERATIONS);
        if local_iterations == 0 {
            return Err(invalid("local_iterations", "must be positive"));
        }
        let local_tolerance = self.local_tolerance.unwrap_or(DEFAULT_TOLERANCE);
        let tolerance = self.tolerance.unwrap_or(DEFAULT_TOLERANCE);
        for (name, value) in [("local_tolerance", local_tolerance), ("tolerance", tolerance)] {
            if !(value > 0.0) {
                return Err(invalid(name, format!("{} must be positive", value)));
            }
        }
        let min_population = self.min_population.unwrap_or(MIN_POPULATION);
        if !(min_population > 0.0 && min_population < 1.0) {
            return Err(invalid("min_population", "must lie in (0, 1)"));
        }
        if let Some(ratio) = self.lte_collision_ratio {
            if !(ratio > 0.0) {
                return Err(invalid("lte_collision_ratio", "must be positive"));
            }
        }

        let max_iterations = self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(invalid("max_iterations", "must be positive"));
        }
        let goal_fraction = self.goal_fraction.unwrap_or(DEFAULT_GOAL_FRACTION);
        if !(goal_fraction >= 0.0 && goal_fraction < 1.0) {
            return Err(invalid("goal_fraction", "must lie in [0, 1)"));
        }
        let required_streak = self.required_streak.unwrap_or(2);
        if required_streak == 0 {
            return Err(invalid("required_streak", "must be positive"));
        }

        let partners = self.partners.unwrap_or_else(|| vec![CollisionPartner::H2]);
        if partners.is_empty() {
            return Err(invalid("partners", "at least one collision partner is required"));
        }
        let unique: HashSet<_> = partners.iter().collect();
        if unique.len() != partners.len() {
            return Err(invalid("partners", "collision partners must be unique"));
        }
        if self.threads == Some(0) {
            return Err(invalid("threads", "must be positive"));
        }

        Ok(EngineConfig {
            grid: GridConfig {
                radius,
                min_scale,
                interior_points,
                sink_points,
                sampling: self.sampling.unwrap_or_default(),
                smoothing_iterations: self
                    .smoothing_iterations
                    .unwrap_or(DEFAULT_SMOOTHING_ITERATIONS),
                weight_samples,
                predefined: self.predefined,
            },
            transport: TransportConfig {
                initial_rays,
                max_rays,
                ray_growth,
                samples_per_segment,
                max_ray_steps,
                taylor_cutoff,
                background_temperature,
                blend: self.blend.unwrap_or(true),
                blend_threshold,
            },
            solver: SolverConfig {
                local_iterations,
                local_tolerance,
                min_population,
                lte_only: self.lte_only.unwrap_or(false),
                lte_species: self.lte_species,
                lte_collision_ratio: self.lte_collision_ratio,
                initial_populations: self.initial_populations.unwrap_or_default(),
                temperature_policy: self.temperature_policy.unwrap_or_default(),
            },
            convergence: ConvergenceConfig {
                max_iterations,
                tolerance,
                goal_fraction,
                required_streak,
                escalation: self.escalation.unwrap_or_default(),
            },
            partners,
            seed: self.seed.unwrap_or(1),
            threads: self.threads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
            .radius(1e14)
            .interior_points(100)
            .sink_points(50)
    }

    #[test]
    fn build_applies_defaults() {
        let config = minimal().build().unwrap();
        assert_eq!(config.transport.initial_rays, DEFAULT_INITIAL_RAYS);
        assert_eq!(config.transport.max_rays, DEFAULT_MAX_RAYS);
        assert_eq!(config.convergence.required_streak, 2);
        assert_eq!(config.convergence.escalation, RayEscalation::UnconvergedOnly);
        assert_eq!(config.partners, vec![CollisionPartner::H2]);
        assert_eq!(config.grid.min_scale, 1e11);
        assert!(config.transport.blend);
    }

    #[test]
    fn build_requires_radius_and_point_counts() {
        assert_eq!(
            EngineConfigBuilder::new().build(),
            Err(ConfigError::MissingParameter("radius"))
        );
        assert_eq!(
            EngineConfigBuilder::new().radius(1.0).sink_points(4).build(),
            Err(ConfigError::MissingParameter("interior_points"))
        );
    }

    #[test]
    fn build_rejects_inverted_ray_bounds() {
        let err = minimal().initial_rays(50).max_rays(10).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { parameter: "max_rays", .. }));
    }

    #[test]
    fn build_rejects_duplicate_partners() {
        let err = minimal()
            .partners(vec![CollisionPartner::ParaH2, CollisionPartner::ParaH2])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { parameter: "partners", .. }));
    }

    #[test]
    fn predefined_points_replace_point_counts() {
        let points = (0..5)
            .map(|i| PredefinedPoint {
                position: Point3::new(i as f64 * 0.1, 0.0, 0.0),
                sink: i == 4,
            })
            .collect();
        let config = EngineConfigBuilder::new()
            .radius(1.0)
            .predefined_points(points)
            .build()
            .unwrap();
        assert_eq!(config.grid.interior_points, 4);
        assert_eq!(config.grid.sink_points, 1);
    }

    #[test]
    fn lte_flag_can_target_single_species() {
        let config = minimal().lte_species(vec!["CO".into()]).build().unwrap();
        assert!(config.is_lte("CO"));
        assert!(!config.is_lte("HCO+"));
    }
}
