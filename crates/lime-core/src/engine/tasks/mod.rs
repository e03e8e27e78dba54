//! Computational tasks of a run.
//!
//! Each task is one step of the pipeline: building and connecting the grid, sampling the
//! physical model onto it, preparing the per-species local quantities, and the pieces of
//! one convergence pass (photon transport, the local rate-matrix solve and the
//! synchronous population update).

pub mod field_sampling;
pub mod grid_build;
pub mod level_pops;
pub mod photon;
pub mod species_setup;
pub mod stateq;
