//! # Engine Module
//!
//! The computational framework that turns a physical model and a set of species into
//! converged level populations.
//!
//! ## Overview
//!
//! A run builds a grid, samples the model onto it and then alternates Monte Carlo
//! estimates of the local radiation field with statistical-equilibrium solves until
//! enough of the grid has stopped changing. The engine owns the configuration of that
//! process, the state machine deciding when it ends, and the tasks doing the work.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Grid, transport, solver and convergence parameters
//! - **State Tracking** ([`state`]) - The convergence state machine and ray escalation policy
//! - **Progress Monitoring** ([`progress`]) - Phase events and per-pass reports
//! - **Error Handling** ([`error`]) - The error taxonomy shared by every task
//!
//! ## Key Capabilities
//!
//! - **Synchronous passes** where every point reads only the previous pass's populations
//! - **Parallel point updates** on a per-run thread pool with deterministic per-point RNG
//! - **Line blending** across species through a precomputed blend set
//! - **Ray escalation** for points that have not yet settled

pub(crate) mod blend;
pub mod config;
pub(crate) mod context;
pub mod error;
pub mod progress;
pub mod state;
pub(crate) mod tasks;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod fixtures;
