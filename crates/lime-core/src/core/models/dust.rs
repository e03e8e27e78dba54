use crate::core::constants::CLIGHT;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DustTableError {
    #[error("Dust opacity table needs at least two entries, found {0}")]
    TooShort(usize),
    #[error("Dust opacity table entry {0} is not positive")]
    NonPositive(usize),
}

/// Dust mass opacity as a function of wavelength, interpolated log-log.
#[derive(Debug, Clone, PartialEq)]
pub struct DustOpacity {
    /// ln of wavelength in metres, ascending.
    log_wavelength: Vec<f64>,
    /// ln of opacity in m^2 kg^-1.
    log_kappa: Vec<f64>,
}

impl DustOpacity {
    /// Builds the table from `(wavelength_micron, kappa_cm2_per_g)` pairs.
    pub fn from_table(entries: &[(f64, f64)]) -> Result<Self, DustTableError> {
        if entries.len() < 2 {
            return Err(DustTableError::TooShort(entries.len()));
        }
        if let Some(i) = entries.iter().position(|&(l, k)| !(l > 0.0 && k > 0.0)) {
            return Err(DustTableError::NonPositive(i));
        }
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self {
            log_wavelength: sorted.iter().map(|(l, _)| (l * 1e-6).ln()).collect(),
            // cm^2 g^-1 -> m^2 kg^-1
            log_kappa: sorted.iter().map(|(_, k)| (k * 0.1).ln()).collect(),
        })
    }

    /// Opacity (m^2 kg^-1) at `frequency` in Hz, extrapolated linearly in log-log
    /// beyond the tabulated range.
    pub fn kappa(&self, frequency: f64) -> f64 {
        let x = (CLIGHT / frequency).ln();
        let xs = &self.log_wavelength;
        let n = xs.len();
        let hi = xs.partition_point(|&v| v < x).clamp(1, n - 1);
        let lo = hi - 1;
        let t = (x - xs[lo]) / (xs[hi] - xs[lo]);
        (self.log_kappa[lo] + t * (self.log_kappa[hi] - self.log_kappa[lo])).exp()
    }
}
