//! Physical and numerical constants (SI units throughout).

// NIST values as of 23 Sept 2015.
pub const AMU: f64 = 1.66053904e-27;
pub const CLIGHT: f64 = 2.99792458e8;
pub const HPLANCK: f64 = 6.626070040e-34;
pub const KBOLTZ: f64 = 1.38064852e-23;

// IAU 2009.
pub const GRAV: f64 = 6.67428e-11;
pub const AU: f64 = 1.495978707e11;

/// `HPLANCK * CLIGHT / (4 pi sqrt(pi))`.
pub const HPIP: f64 = 8.918502221e-27;
/// Converts level energies in cm^-1 to Kelvin.
pub const HCKB: f64 = 100.0 * HPLANCK * CLIGHT / KBOLTZ;

pub const SOLAR_MASS: f64 = 1.98892e30;

/// Mean molecular mass per H2 molecule used for the gas mass behind dust opacities.
pub const GAS_MASS_PER_H2: f64 = 2.4 * AMU;

pub const DEFAULT_INITIAL_RAYS: usize = 9;
pub const DEFAULT_MAX_RAYS: usize = 10_000;
pub const DEFAULT_RAYS_PER_SEGMENT: usize = 3;
pub const DEFAULT_TOLERANCE: f64 = 1e-6;
pub const DEFAULT_LOCAL_ITERATIONS: usize = 50;
pub const DEFAULT_MAX_ITERATIONS: usize = 50;
pub const DEFAULT_GOAL_FRACTION: f64 = 0.5;
pub const DEFAULT_SMOOTHING_ITERATIONS: usize = 20;
pub const DEFAULT_BACKGROUND_TEMPERATURE: f64 = 2.725;

/// Level populations below this are ignored when measuring convergence.
pub const MIN_POPULATION: f64 = 1e-6;
/// Populations are never allowed to drop below this value.
pub const POPULATION_FLOOR: f64 = 1e-30;
/// Velocity separation (m/s) under which two lines are treated as blended.
pub const BLEND_MASK: f64 = 1e4;
/// Ceiling of the thermal ortho-to-para H2 ratio.
pub const ORTHO_TO_PARA_MAX: f64 = 3.0;
/// Half-width of the frequency window sampled by each ray, in units of the doppler b.
pub const PROFILE_HALF_WIDTH: f64 = 2.15;
/// Lower bound on a single optical depth increment (maser saturation guard).
pub const MIN_DTAU: f64 = -30.0;
