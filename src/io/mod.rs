//! Input/output helpers.
//!
//! - contour CSV ingest + orientation (`contour`)
//! - residual and fitted-contour exports (`export`)

pub mod contour;
pub mod export;

pub use contour::*;
pub use export::*;
