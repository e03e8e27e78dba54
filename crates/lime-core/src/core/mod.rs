//! # Core Module
//!
//! Fundamental building blocks of the radiative transfer engine.
//!
//! ## Architecture
//!
//! - **Data Models** ([`models`]) - Grid arena, level populations, molecular and dust data
//! - **Physics** ([`physics`]) - Physical-field callbacks and radiation helpers
//! - **Tessellation** ([`tessellation`]) - Incremental 3D Delaunay triangulation
//! - **File I/O** ([`io`]) - LAMDA molecular data, dust tables, grid snapshots, population tables
//! - **Utilities** ([`utils`]) - Sphere sampling and spline helpers
//!
//! Everything in this module is free of run state: functions take the data they need
//! explicitly and can be called concurrently on distinct inputs.

pub mod constants;
pub mod io;
pub mod models;
pub mod physics;
pub mod tessellation;
pub mod utils;
