//! Numerical building blocks: ODE integration, splines, least squares.

pub mod circle;
pub mod ode;
pub mod ols;
pub mod spline;

pub use circle::*;
pub use ode::*;
pub use ols::*;
pub use spline::*;
