//! Young-Laplace drop-shape model.
//!
//! - `young_laplace`: the ODE right-hand sides
//! - `profile`: the integrated, interpolated theoretical profile

pub mod profile;
pub mod young_laplace;

pub use profile::*;
pub use young_laplace::*;
