use super::populations::Populations;
use crate::core::utils::spline::VelocitySpline;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// One entry of a grid point's connectivity list.
///
/// Neighbours are stored by arena index, so the graph carries no ownership cycles and
/// serializes as plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Arena index of the neighbouring grid point.
    pub index: usize,
    /// Unit vector pointing from this point towards the neighbour.
    pub direction: Vector3<f64>,
    /// Length of the connecting segment (m).
    pub distance: f64,
    /// Fraction of the full sphere of directions for which this neighbour is the one
    /// most closely aligned. The weights of one point sum to one.
    pub weight: f64,
    /// Bulk velocity along the segment, sampled by the field sampler.
    pub velocity: VelocitySpline,
}

/// A single discretized sample of the model volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    /// Arena index; equal to the position of the point in [`Grid::points`].
    pub id: usize,
    pub position: Point3<f64>,
    /// Boundary points keep fixed populations and terminate ray walks.
    pub sink: bool,
    pub velocity: Vector3<f64>,
    pub magnetic_field: Vector3<f64>,
    /// Number density of each configured collision partner (m^-3).
    pub densities: Vec<f64>,
    /// Kinetic and dust temperature (K).
    pub temperature: [f64; 2],
    /// Abundance of each species relative to the first density.
    pub abundances: Vec<f64>,
    /// Turbulent doppler b parameter (m/s).
    pub turbulent_doppler: f64,
    pub gas_to_dust: f64,
    /// Delaunay neighbours ordered by arena index.
    pub neighbors: Vec<Neighbor>,
    /// Number of rays cast from this point during the next pass.
    pub rays: usize,
    /// Whether the populations of every species met the tolerance in the last pass.
    pub converged: bool,
    /// One record per tracked species.
    pub populations: Vec<Populations>,
}

impl GridPoint {
    /// Creates a point with geometry only; fields and populations are filled in later.
    pub fn new(id: usize, position: Point3<f64>, sink: bool) -> Self {
        Self {
            id,
            position,
            sink,
            velocity: Vector3::zeros(),
            magnetic_field: Vector3::zeros(),
            densities: Vec::new(),
            temperature: [0.0; 2],
            abundances: Vec::new(),
            turbulent_doppler: 0.0,
            gas_to_dust: 100.0,
            neighbors: Vec::new(),
            rays: 0,
            converged: false,
            populations: Vec::new(),
        }
    }

    pub fn kinetic_temperature(&self) -> f64 {
        self.temperature[0]
    }

    /// Dust temperature, falling back to the kinetic temperature when unset.
    pub fn dust_temperature(&self) -> f64 {
        if self.temperature[1] > 0.0 {
            self.temperature[1]
        } else {
            self.temperature[0]
        }
    }

    /// Density of the first collision partner, the reference for abundances.
    pub fn reference_density(&self) -> f64 {
        self.densities.first().copied().unwrap_or(0.0)
    }

    pub fn total_density(&self) -> f64 {
        self.densities.iter().sum()
    }

    pub fn neighbor_directions(&self) -> Vec<Vector3<f64>> {
        self.neighbors.iter().map(|n| n.direction).collect()
    }
}

/// Arena of grid points addressed by index.
///
/// The grid owns every point; connectivity is expressed through indices stored in
/// each point's [`Neighbor`] list. Geometry is fixed after construction, physical
/// fields are set once by the field sampler and only the populations change while
/// the solver iterates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    /// Radius of the spherical model domain (m).
    radius: f64,
    points: Vec<GridPoint>,
}

impl Grid {
    /// Wraps an already connected point set.
    ///
    /// # Arguments
    ///
    /// * `radius` - Radius of the spherical domain.
    /// * `points` - Points whose `id` equals their position in the vector.
    pub fn new(radius: f64, points: Vec<GridPoint>) -> Self {
        Self { radius, points }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [GridPoint] {
        &mut self.points
    }

    pub fn point(&self, index: usize) -> Option<&GridPoint> {
        self.points.get(index)
    }

    pub fn point_mut(&mut self, index: usize) -> Option<&mut GridPoint> {
        self.points.get_mut(index)
    }

    /// Indices of all points that take part in the iteration.
    pub fn interior_indices(&self) -> Vec<usize> {
        self.points
            .iter()
            .filter(|p| !p.sink)
            .map(|p| p.id)
            .collect()
    }

    pub fn sink_count(&self) -> usize {
        self.points.iter().filter(|p| p.sink).count()
    }

    pub fn species_count(&self) -> usize {
        self.points
            .first()
            .map(|p| p.populations.len())
            .unwrap_or(0)
    }

    /// Number of interior points flagged converged in the last pass.
    pub fn converged_count(&self) -> usize {
        self.points
            .iter()
            .filter(|p| !p.sink && p.converged)
            .count()
    }

    /// Checks that neighbour lists are symmetric and reference valid indices.
    pub fn is_connectivity_consistent(&self) -> bool {
        self.points.iter().enumerate().all(|(i, p)| {
            p.id == i
                && p.neighbors.iter().all(|n| {
                    n.index != i
                        && self
                            .points
                            .get(n.index)
                            .is_some_and(|q| q.neighbors.iter().any(|m| m.index == i))
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor(index: usize) -> Neighbor {
        Neighbor {
            index,
            direction: Vector3::x(),
            distance: 1.0,
            weight: 1.0,
            velocity: VelocitySpline::default(),
        }
    }

    #[test]
    fn interior_indices_skip_sinks() {
        let points = vec![
            GridPoint::new(0, Point3::origin(), false),
            GridPoint::new(1, Point3::new(1.0, 0.0, 0.0), true),
            GridPoint::new(2, Point3::new(0.5, 0.0, 0.0), false),
        ];
        let grid = Grid::new(1.0, points);
        assert_eq!(grid.interior_indices(), vec![0, 2]);
        assert_eq!(grid.sink_count(), 1);
    }

    #[test]
    fn connectivity_check_detects_asymmetric_lists() {
        let mut a = GridPoint::new(0, Point3::origin(), false);
        let mut b = GridPoint::new(1, Point3::new(1.0, 0.0, 0.0), true);
        a.neighbors.push(neighbor(1));
        let grid = Grid::new(1.0, vec![a.clone(), b.clone()]);
        assert!(!grid.is_connectivity_consistent());

        b.neighbors.push(neighbor(0));
        let grid = Grid::new(1.0, vec![a, b]);
        assert!(grid.is_connectivity_consistent());
    }

    #[test]
    fn dust_temperature_falls_back_to_kinetic() {
        let mut p = GridPoint::new(0, Point3::origin(), false);
        p.temperature = [40.0, 0.0];
        assert_eq!(p.dust_temperature(), 40.0);
        p.temperature = [40.0, 25.0];
        assert_eq!(p.dust_temperature(), 25.0);
    }
}
