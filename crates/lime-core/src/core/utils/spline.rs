use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Number of equally spaced knots sampled along each neighbour segment.
pub const VELOCITY_KNOTS: usize = 5;

const KNOT_SPACING: f64 = 1.0 / (VELOCITY_KNOTS - 1) as f64;

/// Natural cubic spline of the bulk velocity along a segment, parameterised by the
/// fractional distance `s` in `[0, 1]` from the segment start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocitySpline {
    knots: [Vector3<f64>; VELOCITY_KNOTS],
    curvature: [Vector3<f64>; VELOCITY_KNOTS],
}

impl Default for VelocitySpline {
    fn default() -> Self {
        Self::constant(Vector3::zeros())
    }
}

impl VelocitySpline {
    pub fn constant(velocity: Vector3<f64>) -> Self {
        Self {
            knots: [velocity; VELOCITY_KNOTS],
            curvature: [Vector3::zeros(); VELOCITY_KNOTS],
        }
    }

    /// Builds the spline from velocities sampled at `s = 0, 1/4, 1/2, 3/4, 1`.
    pub fn from_knots(knots: [Vector3<f64>; VELOCITY_KNOTS]) -> Self {
        // Second derivatives M_1..M_3 with M_0 = M_4 = 0 from
        // M_{i-1} + 4 M_i + M_{i+1} = 6 / h^2 (y_{i+1} - 2 y_i + y_{i-1}).
        let h2 = KNOT_SPACING * KNOT_SPACING;
        let n = VELOCITY_KNOTS - 2;
        let mut diag = vec![4.0; n];
        let mut rhs: Vec<Vector3<f64>> = (1..=n)
            .map(|i| (knots[i + 1] - knots[i] * 2.0 + knots[i - 1]) * (6.0 / h2))
            .collect();
        for i in 1..n {
            let m = 1.0 / diag[i - 1];
            diag[i] -= m;
            let prev = rhs[i - 1];
            rhs[i] -= prev * m;
        }
        let mut interior = vec![Vector3::zeros(); n];
        interior[n - 1] = rhs[n - 1] / diag[n - 1];
        for i in (0..n - 1).rev() {
            interior[i] = (rhs[i] - interior[i + 1]) / diag[i];
        }

        let mut curvature = [Vector3::zeros(); VELOCITY_KNOTS];
        curvature[1..=n].copy_from_slice(&interior);
        Self { knots, curvature }
    }

    pub fn knots(&self) -> &[Vector3<f64>; VELOCITY_KNOTS] {
        &self.knots
    }

    pub fn evaluate(&self, s: f64) -> Vector3<f64> {
        let s = s.clamp(0.0, 1.0);
        let h = KNOT_SPACING;
        let i = ((s / h) as usize).min(VELOCITY_KNOTS - 2);
        let x0 = i as f64 * h;
        let a = x0 + h - s;
        let b = s - x0;
        let (m0, m1) = (self.curvature[i], self.curvature[i + 1]);
        let (y0, y1) = (self.knots[i], self.knots[i + 1]);
        m0 * (a * a * a / (6.0 * h))
            + m1 * (b * b * b / (6.0 * h))
            + (y0 / h - m0 * (h / 6.0)) * a
            + (y1 / h - m1 * (h / 6.0)) * b
    }

    /// Line-of-sight velocity at `s` along the unit `direction`.
    #[inline]
    pub fn project(&self, s: f64, direction: &Vector3<f64>) -> f64 {
        self.evaluate(s).dot(direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spline_passes_through_knots() {
        let knots = [
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 3.0, 0.0),
            Vector3::new(4.0, -2.0, 1.0),
            Vector3::new(2.0, 0.0, 1.0),
            Vector3::new(-1.0, 1.0, 0.0),
        ];
        let spline = VelocitySpline::from_knots(knots);
        for (i, knot) in knots.iter().enumerate() {
            let s = i as f64 * KNOT_SPACING;
            assert!((spline.evaluate(s) - knot).norm() < 1e-12);
        }
    }

    #[test]
    fn spline_reproduces_linear_fields_exactly() {
        let knots: [Vector3<f64>; VELOCITY_KNOTS] =
            std::array::from_fn(|i| Vector3::new(10.0 * i as f64 * KNOT_SPACING, -5.0, 0.0));
        let spline = VelocitySpline::from_knots(knots);
        for s in [0.1, 0.33, 0.5, 0.9] {
            let v = spline.evaluate(s);
            assert!((v.x - 10.0 * s).abs() < 1e-12);
            assert!((v.y + 5.0).abs() < 1e-12);
        }
    }

    #[test]
    fn projection_uses_direction() {
        let spline = VelocitySpline::constant(Vector3::new(3.0, 4.0, 0.0));
        assert!((spline.project(0.7, &Vector3::x()) - 3.0).abs() < 1e-12);
        assert!((spline.project(0.2, &Vector3::y()) - 4.0).abs() < 1e-12);
    }
}
