//! Input data sources besides contour files.

pub mod sample;

pub use sample::*;
