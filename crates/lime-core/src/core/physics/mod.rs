//! # Physics Module
//!
//! - [`fields`] - The physical-field callback contract implemented by user models
//! - [`parametric`] - A configurable radial model usable without writing code
//! - [`radiation`] - Planck function, line profiles, source-function steps and LTE

pub mod fields;
pub mod parametric;
pub mod radiation;
