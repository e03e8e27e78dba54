//! Provides input/output for molecular data, dust tables and solver state.
//!
//! Readers parse the LAMDA molecular format and two-column dust opacity tables; writers
//! persist the full grid as a JSON snapshot that can be resumed, and export the level
//! populations as CSV for downstream imaging tools.

pub mod dust;
pub mod lamda;
pub mod populations;
pub mod snapshot;
