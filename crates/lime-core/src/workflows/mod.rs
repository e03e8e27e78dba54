//! # Workflows Module
//!
//! High-level entry points that run the complete solve.
//!
//! ## Overview
//!
//! Workflows tie the engine tasks together: they set up the per-run thread pool, build
//! or restore the grid, drive the convergence state machine and hand back the final grid
//! with its convergence status. Callers never need to sequence engine tasks themselves.
//!
//! ## Architecture
//!
//! - **Solve Workflow** ([`solve`]) - Fresh runs from a physical model, and resumed runs
//!   from a saved snapshot.

pub mod solve;
