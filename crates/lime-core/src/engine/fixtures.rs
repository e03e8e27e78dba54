//! Small reusable setups for the engine tests.

use crate::core::models::grid::Grid;
use crate::core::models::molecule::MolecularData;
use crate::core::models::molecule::tests::two_level_molecule;
use crate::core::physics::parametric::ParametricModel;
use crate::engine::config::{EngineConfig, EngineConfigBuilder, InitialPopulations, PredefinedPoint};
use crate::engine::context::SolveContext;
use crate::engine::progress::ProgressReporter;
use crate::engine::tasks::{field_sampling, grid_build, species_setup};
use nalgebra::{Point3, Vector3};

pub(crate) const RADIUS: f64 = 1.5e13;

/// One interior point at the origin surrounded by the twelve icosahedron vertices as sinks.
pub(crate) fn icosahedron_points(radius: f64) -> Vec<PredefinedPoint> {
    let phi = (1.0 + 5.0f64.sqrt()) / 2.0;
    let mut vertices = Vec::with_capacity(12);
    for a in [-1.0, 1.0] {
        for b in [-phi, phi] {
            vertices.push(Vector3::new(0.0, a, b));
            vertices.push(Vector3::new(a, b, 0.0));
            vertices.push(Vector3::new(b, 0.0, a));
        }
    }
    let mut points = vec![PredefinedPoint {
        position: Point3::origin(),
        sink: false,
    }];
    points.extend(vertices.into_iter().map(|v| PredefinedPoint {
        position: Point3::from(v.normalize() * radius),
        sink: true,
    }));
    points
}

pub(crate) struct Fixture {
    pub config: EngineConfig,
    pub molecules: Vec<MolecularData>,
    pub model: ParametricModel,
    pub reporter: ProgressReporter<'static>,
}

impl Fixture {
    /// Uniform 30 K gas at 1e10 m^-3 carrying the two-level toy species.
    pub fn two_level(
        einstein_a: f64,
        collision_rate: f64,
        abundance: f64,
        background: f64,
    ) -> Self {
        let config = Self::builder(background).build().unwrap();
        Self::with_config(config, einstein_a, collision_rate, abundance)
    }

    pub fn builder(background: f64) -> EngineConfigBuilder {
        EngineConfigBuilder::new()
            .radius(RADIUS)
            .predefined_points(icosahedron_points(RADIUS))
            .background_temperature(background)
            .initial_populations(InitialPopulations::Lte)
            .seed(1)
    }

    pub fn with_config(
        config: EngineConfig,
        einstein_a: f64,
        collision_rate: f64,
        abundance: f64,
    ) -> Self {
        Self {
            config,
            molecules: vec![two_level_molecule(einstein_a, collision_rate)],
            model: ParametricModel::uniform(1e10, 30.0, &[abundance], 200.0),
            reporter: ProgressReporter::new(),
        }
    }

    pub fn context(&self) -> SolveContext<'_> {
        SolveContext::new(&self.config, &self.molecules, None, &self.reporter).unwrap()
    }

    /// Builds and prepares a grid from an arbitrary configuration.
    pub fn prepared_grid(&self, config: &EngineConfig, context: &SolveContext) -> Grid {
        let mut grid = grid_build::run(config, &self.model, &self.reporter).unwrap();
        field_sampling::run(&mut grid, &self.model, context).unwrap();
        species_setup::run(&mut grid, context).unwrap();
        grid
    }

    /// The icosahedron grid of the fixture configuration.
    pub fn star_grid(&self, context: &SolveContext) -> Grid {
        self.prepared_grid(&self.config, context)
    }

    /// A sampled grid with the given point counts.
    pub fn sampled_grid(&self, context: &SolveContext, interior: usize, sinks: usize) -> Grid {
        let mut config = self.config.clone();
        config.grid.predefined = None;
        config.grid.interior_points = interior;
        config.grid.sink_points = sinks;
        config.grid.smoothing_iterations = 2;
        self.prepared_grid(&config, context)
    }
}
