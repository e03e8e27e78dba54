//! Utility functions for the engine module.
//!
//! Deterministic random-number stream derivation shared by grid construction and the
//! per-point photon transport.

pub mod rng;
