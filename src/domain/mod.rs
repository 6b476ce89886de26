//! Domain types used throughout the fit.
//!
//! This module defines:
//!
//! - the input contour (`Contour`) and physical constants (`PhysicalConstants`)
//! - the fitted parameter vector (`FitParameters`) and per-point residuals
//! - session state and stop flags (`FitState`, `StopReason`)
//! - derived material properties (`DerivedProperties`)

pub mod types;

pub use types::*;
