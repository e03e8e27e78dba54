use crate::core::models::grid::{Grid, GridPoint, Neighbor};
use crate::core::physics::fields::PhysicalModel;
use crate::core::tessellation::{solid_angle_weights, tessellate};
use crate::core::utils::geometry::{fibonacci_directions, random_unit_vector, segment_max_radius};
use crate::core::utils::spline::VelocitySpline;
use crate::engine::config::{EngineConfig, GridConfig, SamplingScheme};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::utils::rng::{Stream, stream_rng};
use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::Point3;
use rand::Rng;
use rand::rngs::StdRng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

/// Candidates evaluated up front to estimate the peak density.
const DENSITY_PROBES: usize = 1000;
/// Exponent flattening the density contrast in the acceptance probability.
const ACCEPTANCE_EXPONENT: f64 = 0.2;
/// Relative slack allowed for points sitting on the domain surface.
const SURFACE_TOLERANCE: f64 = 1e-9;
const SMOOTHING_STEP: f64 = 0.1;

/// Builds the connected grid: point placement, smoothing and Delaunay connectivity.
///
/// # Errors
///
/// Returns [`EngineError::FatalGeometry`] for duplicate points, points outside the domain,
/// degenerate point sets and interior points left without neighbours.
#[instrument(skip_all, name = "grid_build_task")]
pub fn run(
    config: &EngineConfig,
    model: &dyn PhysicalModel,
    reporter: &ProgressReporter,
) -> Result<Grid, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Building Grid",
    });
    let grid_config = &config.grid;

    let mut points = match &grid_config.predefined {
        Some(predefined) => {
            info!(count = predefined.len(), "Using predefined grid points.");
            predefined.iter().map(|p| (p.position, p.sink)).collect()
        }
        None => {
            let mut rng = stream_rng(config.seed, Stream::GridSampling);
            let mut points = sample_interior(grid_config, model, &mut rng);
            points.extend(sample_sinks(grid_config, &mut rng));
            points
        }
    };

    check_points(&points, grid_config.radius)?;

    if grid_config.predefined.is_none() && grid_config.smoothing_iterations > 0 {
        smooth_points(&mut points, grid_config.radius, grid_config.smoothing_iterations);
        check_points(&points, grid_config.radius)?;
    }

    let grid = connect(&points, config)?;
    info!(
        points = grid.len(),
        sinks = grid.sink_count(),
        edges = grid.points().iter().map(|p| p.neighbors.len()).sum::<usize>() / 2,
        "Grid built."
    );
    reporter.report(Progress::PhaseFinish);
    Ok(grid)
}

fn sample_position(config: &GridConfig, rng: &mut StdRng) -> Point3<f64> {
    match config.sampling {
        SamplingScheme::Uniform => loop {
            let candidate = Point3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            if candidate.coords.norm_squared() < 1.0 {
                return candidate * config.radius;
            }
        },
        SamplingScheme::LogRadius => {
            let (lo, hi) = (config.min_scale.ln(), config.radius.ln());
            let r = (lo + (hi - lo) * rng.r#gen::<f64>()).exp().min(config.radius);
            Point3::from(random_unit_vector(rng) * r)
        }
    }
}

/// Density-weighted rejection sampling of the interior points.
fn sample_interior(
    config: &GridConfig,
    model: &dyn PhysicalModel,
    rng: &mut StdRng,
) -> Vec<(Point3<f64>, bool)> {
    let total_density = |p: &Point3<f64>| -> f64 {
        let n: f64 = model.density(p).iter().sum();
        if n.is_finite() { n.max(0.0) } else { 0.0 }
    };

    let mut max_density = (0..DENSITY_PROBES)
        .map(|_| total_density(&sample_position(config, rng)))
        .fold(0.0, f64::max);
    if max_density <= 0.0 {
        warn!("Model density is zero at every probe; sampling without density weighting.");
    }

    let mut points = Vec::with_capacity(config.interior_points + config.sink_points);
    let mut candidates = 0usize;
    while points.len() < config.interior_points {
        let candidate = sample_position(config, rng);
        candidates += 1;
        let density = total_density(&candidate);
        if density > max_density {
            max_density = density;
        }
        let acceptance = if max_density > 0.0 {
            (density / max_density).powf(ACCEPTANCE_EXPONENT)
        } else {
            1.0
        };
        if rng.r#gen::<f64>() < acceptance {
            points.push((candidate, false));
        }
    }
    debug!(
        accepted = points.len(),
        candidates,
        max_density,
        "Interior points sampled."
    );
    points
}

fn sample_sinks(config: &GridConfig, rng: &mut StdRng) -> Vec<(Point3<f64>, bool)> {
    (0..config.sink_points)
        .map(|_| (Point3::from(random_unit_vector(rng) * config.radius), true))
        .collect()
}

fn check_points(points: &[(Point3<f64>, bool)], radius: f64) -> Result<(), EngineError> {
    if points.len() < 4 {
        return Err(EngineError::FatalGeometry(format!(
            "{} points cannot span a volume",
            points.len()
        )));
    }
    let limit = radius * (1.0 + SURFACE_TOLERANCE);
    if let Some((i, (p, _))) = points
        .iter()
        .enumerate()
        .find(|(_, (p, _))| !(p.coords.norm() <= limit))
    {
        return Err(EngineError::FatalGeometry(format!(
            "point {} at distance {:.6e} lies outside the domain radius {:.6e}",
            i,
            p.coords.norm(),
            radius
        )));
    }

    let mut order: Vec<usize> = (0..points.len()).collect();
    // Adding zero folds -0.0 into 0.0 so equal coordinates sort together.
    let key = |i: usize| {
        let p = &points[i].0;
        [p.x + 0.0, p.y + 0.0, p.z + 0.0]
    };
    order.sort_unstable_by(|&a, &b| {
        let (p, q) = (key(a), key(b));
        p[0].total_cmp(&q[0])
            .then(p[1].total_cmp(&q[1]))
            .then(p[2].total_cmp(&q[2]))
    });
    if let Some(pair) = order.windows(2).find(|w| points[w[0]].0 == points[w[1]].0) {
        return Err(EngineError::FatalGeometry(format!(
            "points {} and {} coincide",
            pair[0].min(pair[1]),
            pair[0].max(pair[1])
        )));
    }
    Ok(())
}

/// Pushes every point away from its nearest neighbour to even out the spacing.
///
/// Interior points stay inside the domain; sinks slide along the surface. Each sweep reads
/// the positions of the previous sweep only.
fn smooth_points(points: &mut [(Point3<f64>, bool)], radius: f64, iterations: usize) {
    for _ in 0..iterations {
        let coords: Vec<[f64; 3]> = points.iter().map(|(p, _)| [p.x, p.y, p.z]).collect();
        let tree: ImmutableKdTree<f64, 3> = ImmutableKdTree::new_from_slice(&coords);

        #[cfg(not(feature = "parallel"))]
        let iterator = points.iter();

        #[cfg(feature = "parallel")]
        let iterator = points.par_iter();

        let moved: Vec<Point3<f64>> = iterator
            .enumerate()
            .map(|(i, &(p, sink))| {
                let Some(nearest) = tree
                    .nearest_n::<SquaredEuclidean>(&coords[i], 2)
                    .into_iter()
                    .find(|n| n.item as usize != i)
                else {
                    return p;
                };
                let [x, y, z] = coords[nearest.item as usize];
                let q = Point3::new(x, y, z);
                let candidate = p + (p - q) * SMOOTHING_STEP;
                if sink {
                    let r = candidate.coords.norm();
                    if r > 0.0 { Point3::from(candidate.coords * (radius / r)) } else { p }
                } else if candidate.coords.norm() < radius {
                    candidate
                } else {
                    p
                }
            })
            .collect();
        for ((p, _), new) in points.iter_mut().zip(moved) {
            *p = new;
        }
    }
}

/// Turns a point set into a grid with Delaunay neighbour lists and solid-angle weights.
fn connect(points: &[(Point3<f64>, bool)], config: &EngineConfig) -> Result<Grid, EngineError> {
    let positions: Vec<Point3<f64>> = points.iter().map(|(p, _)| *p).collect();
    let tessellation = tessellate(&positions)?;
    let radius = config.grid.radius;
    let limit = radius * (1.0 + SURFACE_TOLERANCE);
    let samples = fibonacci_directions(config.grid.weight_samples);

    #[cfg(not(feature = "parallel"))]
    let iterator = points.iter();

    #[cfg(feature = "parallel")]
    let iterator = points.par_iter();

    let mut grid_points: Vec<GridPoint> = iterator
        .enumerate()
        .map(|(i, &(position, sink))| {
            let mut point = GridPoint::new(i, position, sink);
            point.neighbors = tessellation.neighbors[i]
                .iter()
                .filter(|&&j| segment_max_radius(&position, &positions[j]) <= limit)
                .filter_map(|&j| {
                    let offset = positions[j] - position;
                    let distance = offset.norm();
                    (distance > 0.0).then(|| Neighbor {
                        index: j,
                        direction: offset / distance,
                        distance,
                        weight: 0.0,
                        velocity: VelocitySpline::default(),
                    })
                })
                .collect();
            let weights = solid_angle_weights(&point.neighbor_directions(), &samples);
            for (neighbor, weight) in point.neighbors.iter_mut().zip(weights) {
                neighbor.weight = weight;
            }
            point.rays = if sink { 0 } else { config.transport.initial_rays };
            point
        })
        .collect();

    if let Some(isolated) = grid_points.iter().find(|p| !p.sink && p.neighbors.is_empty()) {
        return Err(EngineError::FatalGeometry(format!(
            "interior point {} has no neighbours",
            isolated.id
        )));
    }
    grid_points.sort_by_key(|p| p.id);
    Ok(Grid::new(radius, grid_points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::physics::parametric::ParametricModel;
    use crate::engine::config::{EngineConfigBuilder, PredefinedPoint};
    use std::collections::VecDeque;

    fn model() -> ParametricModel {
        ParametricModel::uniform(1e10, 20.0, &[1e-9], 100.0)
    }

    fn predefined(points: &[[f64; 3]], sinks: usize) -> Vec<PredefinedPoint> {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| PredefinedPoint {
                position: Point3::new(p[0], p[1], p[2]),
                sink: i >= points.len() - sinks,
            })
            .collect()
    }

    fn is_connected(grid: &Grid) -> bool {
        let mut seen = vec![false; grid.len()];
        let mut queue = VecDeque::from([0]);
        seen[0] = true;
        while let Some(i) = queue.pop_front() {
            for n in &grid.points()[i].neighbors {
                if !seen[n.index] {
                    seen[n.index] = true;
                    queue.push_back(n.index);
                }
            }
        }
        seen.into_iter().all(|s| s)
    }

    #[test]
    fn five_points_in_general_position_form_connected_graph_inside_radius() {
        let radius = 1.0;
        let points = predefined(
            &[
                [0.5, 0.1, 0.0],
                [-0.3, 0.4, 0.2],
                [0.0, -0.5, 0.3],
                [0.1, 0.05, -0.6],
                [-0.2, -0.1, -0.1],
            ],
            0,
        );
        let config = EngineConfigBuilder::new()
            .radius(radius)
            .predefined_points(points)
            .build()
            .unwrap();
        let grid = run(&config, &model(), &ProgressReporter::new()).unwrap();

        assert_eq!(grid.len(), 5);
        assert!(is_connected(&grid));
        assert!(grid.is_connectivity_consistent());
        for p in grid.points() {
            for n in &p.neighbors {
                let q = &grid.points()[n.index];
                assert!(segment_max_radius(&p.position, &q.position) <= radius);
            }
            let total: f64 = p.neighbors.iter().map(|n| n.weight).sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn sampled_grid_is_connected_and_sinks_lie_on_surface() {
        let config = EngineConfigBuilder::new()
            .radius(1e14)
            .interior_points(60)
            .sink_points(30)
            .smoothing_iterations(3)
            .seed(5)
            .build()
            .unwrap();
        let grid = run(&config, &model(), &ProgressReporter::new()).unwrap();
        assert_eq!(grid.len(), 90);
        assert_eq!(grid.sink_count(), 30);
        assert!(is_connected(&grid));
        for p in grid.points().iter().filter(|p| p.sink) {
            assert!((p.position.coords.norm() / 1e14 - 1.0).abs() < 1e-9);
            assert_eq!(p.rays, 0);
        }
        assert!(grid.points().iter().filter(|p| !p.sink).all(|p| p.rays == 9));
    }

    #[test]
    fn sampling_is_reproducible_for_a_seed() {
        let config = EngineConfigBuilder::new()
            .radius(1e14)
            .interior_points(30)
            .sink_points(20)
            .seed(9)
            .build()
            .unwrap();
        let a = run(&config, &model(), &ProgressReporter::new()).unwrap();
        let b = run(&config, &model(), &ProgressReporter::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_points_are_fatal() {
        let points = predefined(
            &[
                [0.1, 0.0, 0.0],
                [0.0, 0.2, 0.0],
                [0.0, 0.0, 0.3],
                [0.1, 0.0, 0.0],
                [-0.2, -0.2, -0.2],
            ],
            0,
        );
        let config = EngineConfigBuilder::new()
            .radius(1.0)
            .predefined_points(points)
            .build()
            .unwrap();
        let err = run(&config, &model(), &ProgressReporter::new()).unwrap_err();
        assert!(matches!(err, EngineError::FatalGeometry(msg) if msg.contains("coincide")));
    }

    fn plane_heavy_points() -> Vec<[f64; 3]> {
        let mut points: Vec<[f64; 3]> = (0..40)
            .map(|k| {
                let r = 0.1 + 0.02 * k as f64;
                let angle = 2.399_963 * k as f64;
                [0.0, r * angle.cos(), r * angle.sin()]
            })
            .collect();
        points.extend((0..10).map(|k| {
            let t = k as f64;
            let side = if k % 2 == 0 { 1.0 } else { -1.0 };
            [side * (0.15 + 0.05 * t), 0.3 * (1.3 * t).sin(), 0.3 * (0.7 * t).cos()]
        }));
        points
    }

    #[test]
    fn many_points_sharing_a_plane_are_accepted_and_smoothed() {
        let coords = plane_heavy_points();
        let mut points: Vec<(Point3<f64>, bool)> = coords
            .iter()
            .map(|p| (Point3::new(p[0], p[1], p[2]), false))
            .collect();
        assert!(check_points(&points, 1.0).is_ok());

        smooth_points(&mut points, 1.0, 3);
        assert!(points.iter().all(|(p, _)| p.coords.norm() < 1.0));

        let config = EngineConfigBuilder::new()
            .radius(1.0)
            .predefined_points(predefined(&coords, 0))
            .build()
            .unwrap();
        match run(&config, &model(), &ProgressReporter::new()) {
            Ok(grid) => {
                assert_eq!(grid.len(), 50);
                assert!(grid.is_connectivity_consistent());
            }
            Err(err) => assert!(matches!(err, EngineError::FatalGeometry(_))),
        }
    }

    #[test]
    fn duplicates_inside_a_shared_plane_are_reported() {
        let mut points: Vec<(Point3<f64>, bool)> = plane_heavy_points()
            .iter()
            .map(|p| (Point3::new(p[0], p[1], p[2]), false))
            .collect();
        let copy = points[7];
        points.push(copy);
        let mut negated = points[12];
        negated.0.x = -0.0;
        points.push(negated);

        let err = check_points(&points, 1.0).unwrap_err();
        assert!(matches!(err, EngineError::FatalGeometry(msg) if msg.contains("coincide")));

        points.truncate(50);
        points.push(negated);
        let err = check_points(&points, 1.0).unwrap_err();
        assert!(
            matches!(err, EngineError::FatalGeometry(msg) if msg == "points 12 and 50 coincide")
        );
    }

    #[test]
    fn point_outside_domain_is_fatal() {
        let points = predefined(
            &[
                [0.1, 0.0, 0.0],
                [0.0, 0.2, 0.0],
                [0.0, 0.0, 0.3],
                [2.0, 0.0, 0.0],
            ],
            0,
        );
        let config = EngineConfigBuilder::new()
            .radius(1.0)
            .predefined_points(points)
            .build()
            .unwrap();
        assert!(matches!(
            run(&config, &model(), &ProgressReporter::new()),
            Err(EngineError::FatalGeometry(_))
        ));
    }

    #[test]
    fn coplanar_points_are_fatal() {
        let points = predefined(
            &[
                [0.1, 0.0, 0.0],
                [0.0, 0.2, 0.0],
                [-0.3, 0.1, 0.0],
                [0.2, -0.4, 0.0],
                [0.0, 0.0, 0.0],
            ],
            0,
        );
        let config = EngineConfigBuilder::new()
            .radius(1.0)
            .predefined_points(points)
            .build()
            .unwrap();
        assert!(matches!(
            run(&config, &model(), &ProgressReporter::new()),
            Err(EngineError::FatalGeometry(_))
        ));
    }
}
