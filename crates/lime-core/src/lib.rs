//! # LIME-RT Core Library
//!
//! Non-LTE molecular line radiative transfer on unstructured three-dimensional grids.
//! The level populations of every tracked species are solved self-consistently with a
//! Monte Carlo estimate of the local radiation field.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Grid`, `Populations`,
//!   `MolecularData`), pure radiation physics, the Delaunay tessellation and file I/O.
//!
//! - **[`engine`]: The Logic Core.** Configuration, the convergence state machine and
//!   the computational tasks: grid construction, field sampling, photon transport,
//!   rate-matrix solves and the synchronous per-pass population update.
//!
//! - **[`workflows`]: The Public API.** Ties `engine` and `core` together into complete
//!   runs, either from a physical model or from a previously saved grid.

pub mod core;
pub mod engine;
pub mod workflows;
