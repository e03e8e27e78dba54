use crate::cli::SolveOverrides;
use crate::error::{CliError, Result};
use lime_rt::core::models::molecule::CollisionPartner;
use lime_rt::core::physics::parametric::ParametricModel;
use lime_rt::engine::config as core_config;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialGridConfig {
    radius: Option<f64>,
    min_scale: Option<f64>,
    interior_points: Option<usize>,
    sink_points: Option<usize>,
    sampling: Option<core_config::SamplingScheme>,
    smoothing_iterations: Option<usize>,
    weight_samples: Option<usize>,
    predefined_points: Option<Vec<core_config::PredefinedPoint>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialTransportConfig {
    initial_rays: Option<usize>,
    max_rays: Option<usize>,
    ray_growth: Option<usize>,
    samples_per_segment: Option<usize>,
    max_ray_steps: Option<usize>,
    taylor_cutoff: Option<f64>,
    background_temperature: Option<f64>,
    blend: Option<bool>,
    blend_threshold: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialSolverConfig {
    local_iterations: Option<usize>,
    local_tolerance: Option<f64>,
    min_population: Option<f64>,
    lte_only: Option<bool>,
    lte_species: Option<Vec<String>>,
    lte_collision_ratio: Option<f64>,
    initial_populations: Option<core_config::InitialPopulations>,
    temperature_policy: Option<core_config::TemperaturePolicy>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialConvergenceConfig {
    max_iterations: Option<usize>,
    tolerance: Option<f64>,
    goal_fraction: Option<f64>,
    required_streak: Option<usize>,
    escalation: Option<core_config::RayEscalation>,
}

/// Contents of a run configuration file; every field may be absent.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PartialLimeConfig {
    seed: Option<u64>,
    /// Collision partner names in the order the model lists their densities.
    partners: Option<Vec<String>>,
    grid: Option<PartialGridConfig>,
    transport: Option<PartialTransportConfig>,
    solver: Option<PartialSolverConfig>,
    convergence: Option<PartialConvergenceConfig>,
    model: Option<ParametricModel>,
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        CliError::Config(format!(
            "Invalid {} value for {}: {}",
            std::any::type_name::<T>(),
            key,
            value
        ))
    })
}

impl PartialLimeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| match e {
            CliError::Config(message) => CliError::FileParsing {
                path: path.to_path_buf(),
                source: anyhow::anyhow!(message),
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CliError::Config(e.to_string()))
    }

    /// Removes the physical model section, which only fresh runs need.
    pub fn take_model(&mut self) -> Option<ParametricModel> {
        self.model.take()
    }

    pub fn merge_with_cli(
        mut self,
        overrides: &SolveOverrides,
        threads: Option<usize>,
    ) -> Result<core_config::EngineConfig> {
        self.apply_set_values(&overrides.set_values)?;

        let grid = self.grid.take().unwrap_or_default();
        let transport = self.transport.take().unwrap_or_default();
        let solver = self.solver.take().unwrap_or_default();
        let convergence = self.convergence.take().unwrap_or_default();

        let mut builder = core_config::EngineConfigBuilder::new();

        // Grid
        if let Some(v) = grid.radius {
            builder = builder.radius(v);
        }
        if let Some(v) = grid.min_scale {
            builder = builder.min_scale(v);
        }
        if let Some(v) = grid.interior_points {
            builder = builder.interior_points(v);
        }
        if let Some(v) = grid.sink_points {
            builder = builder.sink_points(v);
        }
        if let Some(v) = grid.sampling {
            builder = builder.sampling(v);
        }
        if let Some(v) = grid.smoothing_iterations {
            builder = builder.smoothing_iterations(v);
        }
        if let Some(v) = grid.weight_samples {
            builder = builder.weight_samples(v);
        }
        if let Some(v) = grid.predefined_points {
            builder = builder.predefined_points(v);
        }

        // Transport
        if let Some(v) = transport.initial_rays {
            builder = builder.initial_rays(v);
        }
        if let Some(v) = transport.max_rays {
            builder = builder.max_rays(v);
        }
        if let Some(v) = transport.ray_growth {
            builder = builder.ray_growth(v);
        }
        if let Some(v) = transport.samples_per_segment {
            builder = builder.samples_per_segment(v);
        }
        if let Some(v) = transport.max_ray_steps {
            builder = builder.max_ray_steps(v);
        }
        if let Some(v) = transport.taylor_cutoff {
            builder = builder.taylor_cutoff(v);
        }
        if let Some(v) = transport.background_temperature {
            builder = builder.background_temperature(v);
        }
        let blend = !overrides.no_blend && transport.blend.unwrap_or(true);
        builder = builder.blend(blend);
        if let Some(v) = transport.blend_threshold {
            builder = builder.blend_threshold(v);
        }

        // Solver
        if let Some(v) = solver.local_iterations {
            builder = builder.local_iterations(v);
        }
        if let Some(v) = solver.local_tolerance {
            builder = builder.local_tolerance(v);
        }
        if let Some(v) = solver.min_population {
            builder = builder.min_population(v);
        }
        builder = builder.lte_only(overrides.lte_only || solver.lte_only.unwrap_or(false));
        if let Some(v) = solver.lte_species {
            builder = builder.lte_species(v);
        }
        if let Some(v) = solver.lte_collision_ratio {
            builder = builder.lte_collision_ratio(v);
        }
        if let Some(v) = solver.initial_populations {
            builder = builder.initial_populations(v);
        }
        if let Some(v) = solver.temperature_policy {
            builder = builder.temperature_policy(v);
        }

        // Convergence
        if let Some(v) = overrides.max_iterations.or(convergence.max_iterations) {
            builder = builder.max_iterations(v);
        }
        if let Some(v) = convergence.tolerance {
            builder = builder.tolerance(v);
        }
        if let Some(v) = convergence.goal_fraction {
            builder = builder.goal_fraction(v);
        }
        if let Some(v) = convergence.required_streak {
            builder = builder.required_streak(v);
        }
        if let Some(v) = convergence.escalation {
            builder = builder.escalation(v);
        }

        if let Some(names) = self.partners {
            let partners = names
                .iter()
                .map(|n| CollisionPartner::from_str(n).map_err(|e| CliError::Config(e.to_string())))
                .collect::<Result<Vec<_>>>()?;
            builder = builder.partners(partners);
        }
        if let Some(seed) = overrides.seed.or(self.seed) {
            builder = builder.seed(seed);
        }
        if let Some(threads) = threads {
            builder = builder.threads(threads);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };
            let key = key.trim();
            let grid = || PartialGridConfig::default();
            let transport = || PartialTransportConfig::default();
            let solver = || PartialSolverConfig::default();
            let convergence = || PartialConvergenceConfig::default();

            match key {
                "seed" => self.seed = Some(parse_value(key, value)?),
                "grid.radius" => {
                    self.grid.get_or_insert_with(grid).radius = Some(parse_value(key, value)?)
                }
                "grid.interior-points" => {
                    self.grid.get_or_insert_with(grid).interior_points =
                        Some(parse_value(key, value)?)
                }
                "grid.sink-points" => {
                    self.grid.get_or_insert_with(grid).sink_points = Some(parse_value(key, value)?)
                }
                "grid.smoothing-iterations" => {
                    self.grid.get_or_insert_with(grid).smoothing_iterations =
                        Some(parse_value(key, value)?)
                }
                "transport.initial-rays" => {
                    self.transport.get_or_insert_with(transport).initial_rays =
                        Some(parse_value(key, value)?)
                }
                "transport.max-rays" => {
                    self.transport.get_or_insert_with(transport).max_rays =
                        Some(parse_value(key, value)?)
                }
                "transport.background-temperature" => {
                    self.transport.get_or_insert_with(transport).background_temperature =
                        Some(parse_value(key, value)?)
                }
                "solver.local-iterations" => {
                    self.solver.get_or_insert_with(solver).local_iterations =
                        Some(parse_value(key, value)?)
                }
                "solver.min-population" => {
                    self.solver.get_or_insert_with(solver).min_population =
                        Some(parse_value(key, value)?)
                }
                "convergence.max-iterations" => {
                    self.convergence.get_or_insert_with(convergence).max_iterations =
                        Some(parse_value(key, value)?)
                }
                "convergence.tolerance" => {
                    self.convergence.get_or_insert_with(convergence).tolerance =
                        Some(parse_value(key, value)?)
                }
                "convergence.goal-fraction" => {
                    self.convergence.get_or_insert_with(convergence).goal_fraction =
                        Some(parse_value(key, value)?)
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lime_rt::core::physics::parametric::RadialProfile;

    const CONFIG: &str = r#"
        seed = 4
        partners = ["p-h2", "o-h2"]

        [grid]
        radius = 1.5e14
        interior-points = 200
        sink-points = 60
        sampling = "uniform"

        [transport]
        max-rays = 500
        background-temperature = 2.725

        [solver]
        initial-populations = "background"
        lte-species = ["co"]

        [convergence]
        goal-fraction = 0.9
        escalation = "always"

        [model]
        doppler = 150.0
        densities = [
            { type = "power-law", value = 1e12, reference-radius = 1.5e13, index = -1.5 },
            { type = "constant", value = 3e12 },
        ]
        temperature = { type = "constant", value = 25.0 }
        abundances = [{ type = "constant", value = 1e-4 }]
    "#;

    #[test]
    fn file_values_reach_the_engine_config() {
        let mut partial = PartialLimeConfig::from_toml(CONFIG).unwrap();
        let model = partial.take_model().unwrap();
        assert_eq!(model.densities.len(), 2);
        assert_eq!(model.temperature, RadialProfile::Constant { value: 25.0 });

        let config = partial.merge_with_cli(&SolveOverrides::default(), None).unwrap();
        assert_eq!(config.seed, 4);
        assert_eq!(config.partners, vec![CollisionPartner::ParaH2, CollisionPartner::OrthoH2]);
        assert_eq!(config.grid.interior_points, 200);
        assert_eq!(config.grid.sampling, core_config::SamplingScheme::Uniform);
        assert_eq!(config.transport.max_rays, 500);
        assert!(config.transport.blend);
        assert_eq!(
            config.solver.initial_populations,
            core_config::InitialPopulations::Background
        );
        assert!(config.is_lte("co"));
        assert_eq!(config.convergence.goal_fraction, 0.9);
        assert_eq!(config.convergence.escalation, core_config::RayEscalation::Always);
        assert_eq!(config.threads, None);
    }

    #[test]
    fn command_line_overrides_win() {
        let partial = PartialLimeConfig::from_toml(CONFIG).unwrap();
        let overrides = SolveOverrides {
            seed: Some(99),
            max_iterations: Some(7),
            lte_only: true,
            no_blend: true,
            set_values: vec!["transport.max-rays=800".into(), "grid.sink-points=30".into()],
        };
        let config = partial.merge_with_cli(&overrides, Some(3)).unwrap();
        assert_eq!(config.seed, 99);
        assert_eq!(config.convergence.max_iterations, 7);
        assert!(config.solver.lte_only);
        assert!(!config.transport.blend);
        assert_eq!(config.transport.max_rays, 800);
        assert_eq!(config.grid.sink_points, 30);
        assert_eq!(config.threads, Some(3));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(PartialLimeConfig::from_toml("[grid]\nradius = 1.0\nsize = 3").is_err());
        let partial = PartialLimeConfig::from_toml(CONFIG).unwrap();
        let overrides = SolveOverrides {
            set_values: vec!["grid.colour=blue".into()],
            ..Default::default()
        };
        assert!(matches!(
            partial.merge_with_cli(&overrides, None),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn bad_values_and_partners_are_config_errors() {
        let partial = PartialLimeConfig::from_toml(CONFIG).unwrap();
        let overrides = SolveOverrides {
            set_values: vec!["convergence.tolerance=small".into()],
            ..Default::default()
        };
        assert!(partial.merge_with_cli(&overrides, None).is_err());

        let partial = PartialLimeConfig::from_toml(
            "partners = [\"xenon\"]\n[grid]\nradius = 1.0\ninterior-points = 5\nsink-points = 5",
        )
        .unwrap();
        let err = partial.merge_with_cli(&SolveOverrides::default(), None).unwrap_err();
        assert!(err.to_string().contains("xenon"));
    }

    #[test]
    fn missing_radius_is_reported() {
        let partial =
            PartialLimeConfig::from_toml("[grid]\ninterior-points = 5\nsink-points = 5").unwrap();
        let err = partial.merge_with_cli(&SolveOverrides::default(), None).unwrap_err();
        assert!(err.to_string().contains("radius"));
    }
}
