use crate::core::utils::geometry::closest_direction;
use nalgebra::Vector3;

/// Fraction of `samples` (unit vectors covering the sphere) for which each of
/// `directions` is the most closely aligned.
///
/// The result has one entry per direction and sums to one whenever `directions` is
/// non-empty.
pub fn solid_angle_weights(directions: &[Vector3<f64>], samples: &[Vector3<f64>]) -> Vec<f64> {
    let mut counts = vec![0usize; directions.len()];
    for sample in samples {
        if let Some((best, _)) = closest_direction(directions, sample) {
            counts[best] += 1;
        }
    }
    let total = samples.len().max(1) as f64;
    counts.into_iter().map(|c| c as f64 / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utils::geometry::fibonacci_directions;

    #[test]
    fn opposite_directions_split_the_sphere_evenly() {
        let samples = fibonacci_directions(1000);
        let weights = solid_angle_weights(&[Vector3::z(), -Vector3::z()], &samples);
        assert!((weights[0] - 0.5).abs() < 1e-2);
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn octahedral_directions_receive_equal_shares() {
        let dirs = [
            Vector3::x(),
            -Vector3::x(),
            Vector3::y(),
            -Vector3::y(),
            Vector3::z(),
            -Vector3::z(),
        ];
        let weights = solid_angle_weights(&dirs, &fibonacci_directions(6000));
        assert!(weights.iter().all(|w| (w - 1.0 / 6.0).abs() < 0.01));
    }

    #[test]
    fn no_directions_yield_no_weights() {
        assert!(solid_angle_weights(&[], &fibonacci_directions(10)).is_empty());
    }
}
