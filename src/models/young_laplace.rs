//! Young-Laplace drop-shape equations.
//!
//! Lengths are scaled by the apex radius `b`, and the profile is parameterised
//! by arc length `s` measured from the apex, with `y` pointing against gravity:
//!
//! ```text
//! dx/ds = cos φ
//! dy/ds = sin φ
//! dφ/ds = 2 − B y − sin φ / x
//! ```
//!
//! `B = Δρ g b² / γ` is the Bond number. Differentiating the system with
//! respect to `B` gives the sensitivities used by the fit Jacobian:
//!
//! ```text
//! dX/ds = −sin φ · Φ
//! dY/ds =  cos φ · Φ
//! dΦ/ds = −y − B Y − cos φ · Φ / x + sin φ · X / x²
//! ```
//!
//! where `X = ∂x/∂B`, `Y = ∂y/∂B`, `Φ = ∂φ/∂B`. A second system accumulates the
//! enclosed volume and surface area of revolution:
//!
//! ```text
//! dV/ds = π x² sin φ
//! dA/ds = 2π x
//! ```
//!
//! Both start at `x = 1e-6` to step off the `sin φ / x` singularity at the apex.

use std::f64::consts::PI;

/// Starting radius that keeps `sin φ / x` finite at `s = 0`.
pub const APEX_RADIUS_OFFSET: f64 = 1e-6;

/// Initial state for [`shape_rhs`].
pub const SHAPE_INITIAL: [f64; 6] = [APEX_RADIUS_OFFSET, 0.0, 0.0, 0.0, 0.0, 0.0];

/// Initial state for [`volume_area_rhs`].
pub const VOLUME_AREA_INITIAL: [f64; 5] = [APEX_RADIUS_OFFSET, 0.0, 0.0, 0.0, 0.0];

/// `dφ/ds` at a profile point.
pub fn curvature(bond: f64, x: f64, y: f64, phi: f64) -> f64 {
    2.0 - bond * y - phi.sin() / x
}

/// Right-hand side of the profile + Bond-sensitivity system.
///
/// State: `[x, y, φ, ∂x/∂B, ∂y/∂B, ∂φ/∂B]`.
pub fn shape_rhs(bond: f64, state: &[f64; 6]) -> [f64; 6] {
    let [x, y, phi, dx_db, dy_db, dphi_db] = *state;
    let (sin, cos) = phi.sin_cos();
    [
        cos,
        sin,
        curvature(bond, x, y, phi),
        -sin * dphi_db,
        cos * dphi_db,
        -y - bond * dy_db - cos * dphi_db / x + sin * dx_db / (x * x),
    ]
}

/// Right-hand side of the profile + volume + area system.
///
/// State: `[x, y, φ, V, A]`, volume and area dimensionless (`b³`, `b²`).
pub fn volume_area_rhs(bond: f64, state: &[f64; 5]) -> [f64; 5] {
    let [x, y, phi, _, _] = *state;
    let (sin, cos) = phi.sin_cos();
    [
        cos,
        sin,
        curvature(bond, x, y, phi),
        PI * x * x * sin,
        2.0 * PI * x,
    ]
}

/// States the integrator may continue from: still off the symmetry axis.
pub fn off_axis<const N: usize>(state: &[f64; N]) -> bool {
    state[0] > 0.0
}
