use crate::core::utils::geometry::orient3d;
use nalgebra::{Point3, Vector3};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TessellationError {
    #[error("At least 4 points are required for a 3D tessellation, got {0}")]
    TooFewPoints(usize),
    #[error("Point set is degenerate: {0}")]
    Degenerate(String),
    #[error("Point {index} could not be inserted: {reason}")]
    Insertion { index: usize, reason: String },
}

/// Delaunay tetrahedralization of a point set.
#[derive(Debug, Clone, PartialEq)]
pub struct Tessellation {
    /// Positively oriented tetrahedra built from input indices only.
    pub tetrahedra: Vec<[usize; 4]>,
    /// Sorted, de-duplicated Delaunay neighbours of each input point.
    pub neighbors: Vec<Vec<usize>>,
}

#[derive(Debug, Clone)]
struct Tet {
    vertices: [usize; 4],
    /// `adjacent[i]` shares the face opposite `vertices[i]`.
    adjacent: [Option<usize>; 4],
    center: Point3<f64>,
    radius2: f64,
    alive: bool,
}

impl Tet {
    fn new(vertices: [usize; 4], coords: &[Point3<f64>]) -> Self {
        let (center, radius2) = circumsphere(
            &coords[vertices[0]],
            &coords[vertices[1]],
            &coords[vertices[2]],
            &coords[vertices[3]],
        );
        Self {
            vertices,
            adjacent: [None; 4],
            center,
            radius2,
            alive: true,
        }
    }

    #[inline]
    fn contains_in_circumsphere(&self, p: &Point3<f64>) -> bool {
        (p - self.center).norm_squared() < self.radius2
    }

    /// Orientation of the tetrahedron obtained by replacing vertex `i` with `p`.
    #[inline]
    fn orientation_with(&self, i: usize, p: &Point3<f64>, coords: &[Point3<f64>]) -> f64 {
        let mut v = [
            coords[self.vertices[0]],
            coords[self.vertices[1]],
            coords[self.vertices[2]],
            coords[self.vertices[3]],
        ];
        v[i] = *p;
        orient3d(&v[0], &v[1], &v[2], &v[3])
    }
}

fn circumsphere(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
) -> (Point3<f64>, f64) {
    let u = b - a;
    let v = c - a;
    let w = d - a;
    let denom = 2.0 * u.dot(&v.cross(&w));
    if denom == 0.0 {
        return (*a, f64::INFINITY);
    }
    let offset: Vector3<f64> =
        (v.cross(&w) * u.norm_squared()
            + w.cross(&u) * v.norm_squared()
            + u.cross(&v) * w.norm_squared())
            / denom;
    (a + offset, offset.norm_squared())
}

/// Incremental Bowyer-Watson triangulation inside an enclosing super-tetrahedron.
struct Triangulation {
    coords: Vec<Point3<f64>>,
    tets: Vec<Tet>,
    real_count: usize,
    last: usize,
}

impl Triangulation {
    fn new(points: &[Point3<f64>]) -> Self {
        let n = points.len();
        let (min, max) = points.iter().fold(
            (points[0].coords, points[0].coords),
            |(lo, hi), p| (lo.inf(&p.coords), hi.sup(&p.coords)),
        );
        let center = Point3::from((min + max) / 2.0);
        let extent = ((max - min).norm() / 2.0).max(f64::MIN_POSITIVE);
        // Insphere radius of this tetrahedron is k / sqrt(3).
        let k = 100.0 * 3f64.sqrt() * extent;

        let mut coords = points.to_vec();
        coords.push(center + Vector3::new(k, k, k));
        coords.push(center + Vector3::new(k, -k, -k));
        coords.push(center + Vector3::new(-k, k, -k));
        coords.push(center + Vector3::new(-k, -k, k));

        let mut vertices = [n, n + 1, n + 2, n + 3];
        if orient3d(&coords[n], &coords[n + 1], &coords[n + 2], &coords[n + 3]) < 0.0 {
            vertices.swap(2, 3);
        }
        let root = Tet::new(vertices, &coords);
        Self {
            coords,
            tets: vec![root],
            real_count: n,
            last: 0,
        }
    }

    /// Visibility walk towards the tetrahedron containing `p`, with a linear scan for
    /// any tetrahedron whose circumsphere holds `p` as the fallback.
    fn locate(&self, p: &Point3<f64>) -> Option<usize> {
        let mut current = self.last;
        if !self.tets[current].alive {
            current = self.tets.iter().rposition(|t| t.alive)?;
        }
        let max_steps = self.tets.len() + 16;
        'walk: for _ in 0..max_steps {
            let tet = &self.tets[current];
            for i in 0..4 {
                if tet.orientation_with(i, p, &self.coords) < 0.0 {
                    match tet.adjacent[i] {
                        Some(next) => {
                            current = next;
                            continue 'walk;
                        }
                        None => break 'walk,
                    }
                }
            }
            return Some(current);
        }
        self.tets
            .iter()
            .position(|t| t.alive && t.contains_in_circumsphere(p))
    }

    fn insert(&mut self, index: usize) -> Result<(), TessellationError> {
        let p = self.coords[index];
        let seed = self.locate(&p).ok_or_else(|| TessellationError::Insertion {
            index,
            reason: "no enclosing tetrahedron".to_string(),
        })?;

        let mut cavity = vec![seed];
        let mut in_cavity = HashSet::from([seed]);
        let mut head = 0;
        while head < cavity.len() {
            let t = cavity[head];
            head += 1;
            for next in self.tets[t].adjacent.into_iter().flatten() {
                if !in_cavity.contains(&next) && self.tets[next].contains_in_circumsphere(&p) {
                    in_cavity.insert(next);
                    cavity.push(next);
                }
            }
        }

        // The cavity must be star-shaped around p; grow it over any face p cannot see.
        let boundary = loop {
            let mut boundary = Vec::new();
            let mut grow = None;
            'scan: for &t in &cavity {
                for i in 0..4 {
                    let outer = self.tets[t].adjacent[i];
                    if outer.is_some_and(|o| in_cavity.contains(&o)) {
                        continue;
                    }
                    if self.tets[t].orientation_with(i, &p, &self.coords) <= 0.0 {
                        match outer {
                            Some(o) => {
                                grow = Some(o);
                                break 'scan;
                            }
                            None => {
                                return Err(TessellationError::Insertion {
                                    index,
                                    reason: "point lies on the enclosing hull".to_string(),
                                });
                            }
                        }
                    }
                    boundary.push((t, i, outer));
                }
            }
            match grow {
                Some(o) => {
                    in_cavity.insert(o);
                    cavity.push(o);
                }
                None => break boundary,
            }
        };

        for &t in &cavity {
            self.tets[t].alive = false;
        }

        let mut open_faces: HashMap<(usize, usize), (usize, usize)> = HashMap::new();
        for (t, i, outer) in boundary {
            let mut vertices = self.tets[t].vertices;
            vertices[i] = index;
            let id = self.tets.len();
            let mut tet = Tet::new(vertices, &self.coords);
            tet.adjacent[i] = outer;
            self.tets.push(tet);

            if let Some(o) = outer {
                if let Some(slot) = self.tets[o].adjacent.iter_mut().find(|a| **a == Some(t)) {
                    *slot = Some(id);
                }
            }

            for j in (0..4).filter(|&j| j != i) {
                let mut edge = [0usize; 2];
                let mut k = 0;
                for (m, &v) in vertices.iter().enumerate() {
                    if m != i && m != j {
                        edge[k] = v;
                        k += 1;
                    }
                }
                let key = (edge[0].min(edge[1]), edge[0].max(edge[1]));
                match open_faces.remove(&key) {
                    Some((other, face)) => {
                        self.tets[id].adjacent[j] = Some(other);
                        self.tets[other].adjacent[face] = Some(id);
                    }
                    None => {
                        open_faces.insert(key, (id, j));
                    }
                }
            }
            self.last = id;
        }
        Ok(())
    }

    fn finish(self) -> Tessellation {
        let n = self.real_count;
        let mut neighbors = vec![Vec::new(); n];
        let mut tetrahedra = Vec::new();
        for tet in self.tets.iter().filter(|t| t.alive) {
            if tet.vertices.iter().any(|&v| v >= n) {
                continue;
            }
            tetrahedra.push(tet.vertices);
            for a in 0..4 {
                for b in 0..4 {
                    if a != b {
                        neighbors[tet.vertices[a]].push(tet.vertices[b]);
                    }
                }
            }
        }
        for list in &mut neighbors {
            list.sort_unstable();
            list.dedup();
        }
        Tessellation { tetrahedra, neighbors }
    }
}

/// Rejects inputs whose points all lie in one plane.
fn check_spans_volume(points: &[Point3<f64>]) -> Result<(), TessellationError> {
    let a = points[0];
    let far = |from: &dyn Fn(&Point3<f64>) -> f64| {
        points
            .iter()
            .map(|p| (*p, from(p)))
            .fold((a, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best })
    };
    let (b, ab) = far(&|p: &Point3<f64>| (p - a).norm());
    if ab == 0.0 {
        return Err(TessellationError::Degenerate("all points coincide".to_string()));
    }
    let axis = (b - a) / ab;
    let (c, dist) = far(&|p: &Point3<f64>| {
        let v = p - a;
        (v - axis * v.dot(&axis)).norm()
    });
    if dist <= 1e-12 * ab {
        return Err(TessellationError::Degenerate("points are collinear".to_string()));
    }
    let normal = (b - a).cross(&(c - a)).normalize();
    let height = points
        .iter()
        .map(|p| (p - a).dot(&normal).abs())
        .fold(0.0, f64::max);
    if height <= 1e-12 * ab {
        return Err(TessellationError::Degenerate("points are coplanar".to_string()));
    }
    Ok(())
}

/// Delaunay tetrahedralization of `points` by incremental insertion.
///
/// Points must be pairwise distinct. Tetrahedra touching the enclosing construction
/// are discarded, so neighbour lists contain only Delaunay edges between input points.
pub fn tessellate(points: &[Point3<f64>]) -> Result<Tessellation, TessellationError> {
    if points.len() < 4 {
        return Err(TessellationError::TooFewPoints(points.len()));
    }
    check_spans_volume(points)?;

    let mut triangulation = Triangulation::new(points);
    for index in 0..points.len() {
        triangulation.insert(index)?;
    }
    Ok(triangulation.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_ball(count: usize, seed: u64) -> Vec<Point3<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut points = Vec::with_capacity(count);
        while points.len() < count {
            let p = Point3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            if p.coords.norm() < 1.0 {
                points.push(p);
            }
        }
        points
    }

    #[test]
    fn tetrahedron_with_centre_connects_everything() {
        let points = vec![
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
            Point3::new(0.05, 0.02, -0.03),
        ];
        let tess = tessellate(&points).unwrap();
        assert_eq!(tess.tetrahedra.len(), 4);
        assert_eq!(tess.neighbors[4], vec![0, 1, 2, 3]);
        assert_eq!(tess.neighbors[0], vec![1, 2, 3, 4]);
    }

    #[test]
    fn random_points_satisfy_empty_circumsphere_property() {
        let points = random_ball(120, 11);
        let tess = tessellate(&points).unwrap();
        assert!(!tess.tetrahedra.is_empty());
        for tet in &tess.tetrahedra {
            let [a, b, c, d] = tet.map(|i| points[i]);
            assert!(orient3d(&a, &b, &c, &d) > 0.0);
            let (center, r2) = circumsphere(&a, &b, &c, &d);
            for (i, p) in points.iter().enumerate() {
                if tet.contains(&i) {
                    continue;
                }
                assert!((p - center).norm_squared() >= r2 * (1.0 - 1e-9));
            }
        }
    }

    #[test]
    fn neighbour_lists_are_symmetric_and_sorted() {
        let points = random_ball(60, 3);
        let tess = tessellate(&points).unwrap();
        for (i, list) in tess.neighbors.iter().enumerate() {
            assert!(list.windows(2).all(|w| w[0] < w[1]));
            assert!(!list.contains(&i));
            for &j in list {
                assert!(tess.neighbors[j].contains(&i));
            }
        }
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        assert_eq!(
            tessellate(&[Point3::origin(); 3]),
            Err(TessellationError::TooFewPoints(3))
        );
        let flat: Vec<_> = (0..6)
            .map(|i| Point3::new(i as f64, (i * i) as f64, 0.0))
            .collect();
        assert!(matches!(tessellate(&flat), Err(TessellationError::Degenerate(_))));
    }
}
