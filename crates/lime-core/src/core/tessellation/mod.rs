//! # Tessellation Module
//!
//! Geometry of the point cloud: the Delaunay connectivity between grid points and the
//! solid-angle weights that turn neighbour directions into a sampling distribution.

pub mod delaunay;
pub mod weights;

pub use delaunay::{Tessellation, TessellationError, tessellate};
pub use weights::solid_angle_weights;
