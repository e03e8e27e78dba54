use nalgebra::{Point3, Vector3};

/// Continuous physical fields of a model, evaluated at arbitrary positions (m).
///
/// Implementations must be deterministic for a given position and safe to call
/// concurrently; the field sampler evaluates them from worker threads.
pub trait PhysicalModel: Send + Sync {
    /// Number density (m^-3) of every configured collision partner, in configuration order.
    fn density(&self, position: &Point3<f64>) -> Vec<f64>;

    /// Kinetic and dust temperature (K). A non-positive dust temperature means the dust
    /// is at the kinetic temperature.
    fn temperature(&self, position: &Point3<f64>) -> [f64; 2];

    /// Abundance of every species relative to the first density.
    fn abundance(&self, position: &Point3<f64>) -> Vec<f64>;

    /// Turbulent doppler b parameter (m/s).
    fn doppler(&self, position: &Point3<f64>) -> f64;

    /// Bulk gas velocity (m/s).
    fn velocity(&self, position: &Point3<f64>) -> Vector3<f64>;

    /// Magnetic field (T).
    fn magnetic_field(&self, _position: &Point3<f64>) -> Vector3<f64> {
        Vector3::zeros()
    }

    /// Gas-to-dust mass ratio.
    fn gas_to_dust(&self, _position: &Point3<f64>) -> f64 {
        100.0
    }
}
