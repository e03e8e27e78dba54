use nalgebra::{Point3, Vector3};
use rand::Rng;
use std::f64::consts::PI;

/// Quasi-uniform directions on the unit sphere from the Fibonacci lattice.
pub fn fibonacci_directions(count: usize) -> Vec<Vector3<f64>> {
    let golden_angle = PI * (3.0 - 5.0f64.sqrt());
    (0..count)
        .map(|i| {
            let z = 1.0 - (2.0 * i as f64 + 1.0) / count as f64;
            let r = (1.0 - z * z).max(0.0).sqrt();
            let phi = golden_angle * i as f64;
            Vector3::new(r * phi.cos(), r * phi.sin(), z)
        })
        .collect()
}

/// Uniformly distributed unit vector.
pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vector3<f64> {
    let z: f64 = 2.0 * rng.r#gen::<f64>() - 1.0;
    let phi = 2.0 * PI * rng.r#gen::<f64>();
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vector3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Index of the direction with the largest cosine against `target`.
pub fn closest_direction(
    directions: &[Vector3<f64>],
    target: &Vector3<f64>,
) -> Option<(usize, f64)> {
    directions
        .iter()
        .enumerate()
        .map(|(i, d)| (i, d.dot(target)))
        .fold(None, |best, (i, cos)| match best {
            Some((_, best_cos)) if best_cos >= cos => best,
            _ => Some((i, cos)),
        })
}

/// Distance from the origin of the point on segment `a`-`b` farthest from the origin.
///
/// For a sphere centred on the origin this is the largest radius the segment reaches.
pub fn segment_max_radius(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    a.coords.norm().max(b.coords.norm())
}

/// Signed volume (times six) of the tetrahedron `a, b, c, d`.
#[inline]
pub fn orient3d(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).cross(&(c - a)).dot(&(d - a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn fibonacci_directions_are_unit_and_balanced() {
        let dirs = fibonacci_directions(500);
        assert!(dirs.iter().all(|d| (d.norm() - 1.0).abs() < 1e-12));
        let mean: Vector3<f64> = dirs.iter().sum::<Vector3<f64>>() / dirs.len() as f64;
        assert!(mean.norm() < 1e-2);
    }

    #[test]
    fn random_unit_vectors_are_normalised() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!((random_unit_vector(&mut rng).norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn closest_direction_picks_largest_cosine() {
        let dirs = [Vector3::x(), Vector3::y(), -Vector3::x()];
        let target = Vector3::new(-0.9, 0.1, 0.0).normalize();
        let (idx, cos) = closest_direction(&dirs, &target).unwrap();
        assert_eq!(idx, 2);
        assert!(cos > 0.9);
        assert!(closest_direction(&[], &Vector3::x()).is_none());
    }

    #[test]
    fn orientation_sign_follows_handedness() {
        let o = Point3::origin();
        let x = Point3::new(1.0, 0.0, 0.0);
        let y = Point3::new(0.0, 1.0, 0.0);
        let z = Point3::new(0.0, 0.0, 1.0);
        assert!(orient3d(&o, &x, &y, &z) > 0.0);
        assert!(orient3d(&o, &y, &x, &z) < 0.0);
    }
}
