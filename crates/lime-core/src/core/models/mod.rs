//! # Core Models Module
//!
//! Data structures describing the discretized model and the species tracked on it.
//!
//! ## Key Components
//!
//! - [`grid`] - Arena of grid points with index-based neighbour lists
//! - [`populations`] - Level populations and the local coefficients derived from them
//! - [`molecule`] - Immutable molecular data: levels, lines and collision tables
//! - [`dust`] - Dust continuum opacity tables
//!
//! `MolecularData` and `DustOpacity` are immutable after construction and are shared
//! read-only between worker threads. `Grid` is mutated only between passes.

pub mod dust;
pub mod grid;
pub mod molecule;
pub mod populations;
