use crate::core::constants::{MIN_DTAU, PROFILE_HALF_WIDTH};
use crate::core::models::grid::{Grid, GridPoint, Neighbor};
use crate::core::physics::radiation::{gaussline, line_coefficients, optical_step, planck};
use crate::core::utils::geometry::{closest_direction, random_unit_vector};
use crate::engine::context::SolveContext;
use nalgebra::Vector3;
use rand::Rng;

/// Attempts at drawing a direction inside a neighbour's solid-angle stratum before falling
/// back to the neighbour direction itself.
const MAX_STRATUM_TRIES: usize = 256;

/// Geometry of one ray at its origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayOrigin {
    pub direction: Vector3<f64>,
    /// Velocity offset sampled for the ray, relative to the origin's line-of-sight velocity.
    pub deltav: f64,
    /// Projected length of the origin's half of the first segment.
    pub first_half: f64,
}

/// Per-point scratch holding what every ray saw beyond the origin's own half segment.
///
/// Allocated fresh for each point a worker processes and never shared.
#[derive(Debug, Clone)]
pub struct RayBuffer {
    line_offsets: Vec<usize>,
    total_lines: usize,
    origins: Vec<RayOrigin>,
    intensity: Vec<f64>,
    tau: Vec<f64>,
}

impl RayBuffer {
    pub fn new(context: &SolveContext, rays: usize) -> Self {
        let mut line_offsets = Vec::with_capacity(context.species_count());
        let mut total_lines = 0;
        for molecule in context.molecules {
            line_offsets.push(total_lines);
            total_lines += molecule.line_count();
        }
        Self {
            line_offsets,
            total_lines,
            origins: Vec::with_capacity(rays),
            intensity: vec![0.0; rays * total_lines],
            tau: vec![0.0; rays * total_lines],
        }
    }

    pub fn ray_count(&self) -> usize {
        self.origins.len()
    }

    pub fn origins(&self) -> &[RayOrigin] {
        &self.origins
    }

    #[inline]
    fn slot(&self, ray: usize, species: usize, line: usize) -> usize {
        ray * self.total_lines + self.line_offsets[species] + line
    }

    /// Intensity arriving at the far end of the origin's half segment.
    #[inline]
    pub fn intensity(&self, ray: usize, species: usize, line: usize) -> f64 {
        self.intensity[self.slot(ray, species, line)]
    }

    /// Optical depth accumulated beyond the origin's half segment.
    #[inline]
    pub fn tau(&self, ray: usize, species: usize, line: usize) -> f64 {
        self.tau[self.slot(ray, species, line)]
    }

    fn push_ray(&mut self, origin: RayOrigin) -> usize {
        let ray = self.origins.len();
        self.origins.push(origin);
        let needed = (ray + 1) * self.total_lines;
        if self.intensity.len() < needed {
            self.intensity.resize(needed, 0.0);
            self.tau.resize(needed, 0.0);
        }
        let range = ray * self.total_lines..needed;
        self.intensity[range.clone()].fill(0.0);
        self.tau[range].fill(0.0);
        ray
    }
}

/// Largest doppler b over all species at a point.
fn max_doppler(point: &GridPoint) -> f64 {
    point
        .populations
        .iter()
        .map(|p| p.doppler_b)
        .fold(0.0, f64::max)
}

/// Draws `rays` directions stratified over the neighbour solid-angle weights.
///
/// Strata are selected systematically from the cumulative weights; inside the chosen
/// stratum the direction is uniform.
pub fn stratified_directions<R: Rng + ?Sized>(
    neighbors: &[Neighbor],
    rays: usize,
    rng: &mut R,
) -> Vec<Vector3<f64>> {
    if neighbors.is_empty() || rays == 0 {
        return Vec::new();
    }
    let directions: Vec<Vector3<f64>> = neighbors.iter().map(|n| n.direction).collect();
    let mut cumulative = Vec::with_capacity(neighbors.len());
    let mut acc = 0.0;
    for n in neighbors {
        acc += n.weight;
        cumulative.push(acc);
    }
    let total = if acc > 0.0 { acc } else { 1.0 };
    let offset: f64 = rng.r#gen();

    (0..rays)
        .map(|r| {
            let target = (r as f64 + offset) / rays as f64 * total;
            let stratum = if acc > 0.0 {
                cumulative
                    .partition_point(|&c| c <= target)
                    .min(neighbors.len() - 1)
            } else {
                rng.gen_range(0..neighbors.len())
            };
            for _ in 0..MAX_STRATUM_TRIES {
                let candidate = random_unit_vector(rng);
                if closest_direction(&directions, &candidate).map(|(i, _)| i) == Some(stratum) {
                    return candidate;
                }
            }
            directions[stratum]
        })
        .collect()
}

/// Next point along `direction`: the neighbour with the largest positive cosine.
#[inline]
fn forward_neighbor<'g>(point: &'g GridPoint, direction: &Vector3<f64>) -> Option<&'g Neighbor> {
    let (best, cos) = point
        .neighbors
        .iter()
        .enumerate()
        .map(|(i, n)| (i, n.direction.dot(direction)))
        .fold(None, |best: Option<(usize, f64)>, (i, c)| match best {
            Some((_, bc)) if bc >= c => best,
            _ => Some((i, c)),
        })?;
    (cos > 0.0).then(|| &point.neighbors[best])
}

/// Adds the emission and absorption of one half segment, owned by `owner`, to every line.
#[allow(clippy::too_many_arguments)]
fn accumulate_half(
    context: &SolveContext,
    owner: &GridPoint,
    neighbor: &Neighbor,
    direction: &Vector3<f64>,
    deltav: f64,
    start: f64,
    length: f64,
    buffer: &mut RayBuffer,
    ray: usize,
) {
    let samples = context.config.transport.samples_per_segment;
    let cutoff = context.config.transport.taylor_cutoff;
    let projected: Vec<f64> = (0..samples)
        .map(|k| {
            let s = start + 0.5 * (k as f64 + 0.5) / samples as f64;
            neighbor.velocity.project(s, direction)
        })
        .collect();
    let mean_profile = |offset: f64, inverse_b: f64| -> f64 {
        projected
            .iter()
            .map(|v| gaussline(deltav - offset - v, inverse_b))
            .sum::<f64>()
            / samples as f64
    };

    for (species, molecule) in context.molecules.iter().enumerate() {
        let pops = &owner.populations[species];
        for (line_index, line) in molecule.lines().iter().enumerate() {
            let vfac = mean_profile(0.0, pops.inverse_b);
            let (mut jnu, mut alpha) =
                line_coefficients(line, &pops.levels, pops.molecular_density, pops.inverse_b, vfac);
            jnu += pops.dust_emission[line_index] * pops.dust_opacity[line_index];
            alpha += pops.dust_opacity[line_index];

            for blend in context.blends.partners(species, line_index) {
                let partner_pops = &owner.populations[blend.species];
                let partner_line = &context.molecules[blend.species].lines()[blend.line];
                let partner_vfac = mean_profile(blend.velocity_offset, partner_pops.inverse_b);
                let (j, a) = line_coefficients(
                    partner_line,
                    &partner_pops.levels,
                    partner_pops.molecular_density,
                    partner_pops.inverse_b,
                    partner_vfac,
                );
                jnu += j;
                alpha += a;
            }

            let slot = buffer.slot(ray, species, line_index);
            let dtau = (alpha * length).max(MIN_DTAU);
            let step = optical_step(dtau, cutoff);
            let tau = buffer.tau[slot];
            buffer.intensity[slot] += (-tau).exp() * jnu * length * step.remnant;
            buffer.tau[slot] = tau + dtau;
        }
    }
}

/// Follows one ray from `origin` through the grid, recording what arrives at the far end
/// of the origin's half of the first segment.
///
/// The walk ends at a sink, when no neighbour lies ahead, or after `max_ray_steps`
/// segments; the attenuated background is then added.
pub fn trace_ray(
    grid: &Grid,
    origin: usize,
    direction: Vector3<f64>,
    deltav: f64,
    context: &SolveContext,
    buffer: &mut RayBuffer,
) -> usize {
    let points = grid.points();
    let start = &points[origin];
    // Absolute velocity offset in the lab frame along the ray.
    let absolute = deltav + start.velocity.dot(&direction);
    let ray = buffer.push_ray(RayOrigin {
        direction,
        deltav,
        first_half: 0.0,
    });

    let mut here = origin;
    for _ in 0..context.config.transport.max_ray_steps {
        let current = &points[here];
        let Some(neighbor) = forward_neighbor(current, &direction) else {
            break;
        };
        let next = &points[neighbor.index];
        let ds = (next.position - current.position).dot(&direction);
        let half = 0.5 * ds;

        if here == origin {
            buffer.origins[ray].first_half = half;
        } else {
            accumulate_half(
                context, current, neighbor, &direction, absolute, 0.0, half, buffer, ray,
            );
        }
        if next.sink {
            break;
        }
        accumulate_half(context, next, neighbor, &direction, absolute, 0.5, half, buffer, ray);
        here = neighbor.index;
    }

    let background = context.config.transport.background_temperature;
    for (species, molecule) in context.molecules.iter().enumerate() {
        for (line_index, line) in molecule.lines().iter().enumerate() {
            let slot = buffer.slot(ray, species, line_index);
            let attenuation = (-buffer.tau[slot]).exp();
            buffer.intensity[slot] += attenuation * planck(line.frequency, background);
        }
    }
    ray
}

/// Casts `rays` rays from `origin`, filling a fresh buffer.
pub fn trace_rays<R: Rng + ?Sized>(
    grid: &Grid,
    origin: usize,
    rays: usize,
    context: &SolveContext,
    rng: &mut R,
) -> RayBuffer {
    let mut buffer = RayBuffer::new(context, rays);
    let point = &grid.points()[origin];
    let half_width = PROFILE_HALF_WIDTH * max_doppler(point);
    for direction in stratified_directions(&point.neighbors, rays, rng) {
        let deltav = (2.0 * rng.r#gen::<f64>() - 1.0) * half_width;
        trace_ray(grid, origin, direction, deltav, context, &mut buffer);
    }
    buffer
}
