//! Theoretical drop profile for one Bond number.
//!
//! The profile is integrated once on an even arc-length grid and interpolated
//! with a clamped cubic spline whose end slopes are the ODE right-hand side at
//! the two end samples. Queries past the integration limit re-integrate to
//! `1.2×` the requested arc length before answering, so callers never need to
//! manage the limit themselves.
//!
//! If the profile returns to the symmetry axis (possible for small or negative
//! Bond numbers) integration stops there. Queries beyond that point evaluate the
//! last valid state; [`ProfileModel::valid_limit`] tells callers where it is.

use crate::error::FitError;
use crate::math::{ClampedSpline, OdeOptions, integrate_grid, linspace};
use crate::models::young_laplace::{SHAPE_INITIAL, off_axis, shape_rhs};

/// Growth applied to the integration limit when a query exceeds it.
pub const LIMIT_EXPANSION: f64 = 1.2;

/// One sample of the profile and its Bond-number sensitivities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileState {
    pub x: f64,
    pub y: f64,
    pub phi: f64,
    pub dx_dbond: f64,
    pub dy_dbond: f64,
    pub dphi_dbond: f64,
}

impl From<[f64; 6]> for ProfileState {
    fn from(v: [f64; 6]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            phi: v[2],
            dx_dbond: v[3],
            dy_dbond: v[4],
            dphi_dbond: v[5],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileModel {
    bond: f64,
    integration_limit: f64,
    sample_count: usize,
    spline: ClampedSpline<6>,
    profile_size: f64,
    integrations: usize,
}

impl ProfileModel {
    /// Integrate the profile for `bond` over `[0, integration_limit]` with `sample_count` samples.
    pub fn generate(bond: f64, integration_limit: f64, sample_count: usize) -> Result<Self, FitError> {
        if !bond.is_finite() {
            return Err(FitError::numerical(format!("non-finite Bond number {bond}")));
        }
        if !(integration_limit > 0.0 && integration_limit.is_finite()) {
            return Err(FitError::invalid(format!(
                "integration limit must be positive, got {integration_limit}"
            )));
        }
        if sample_count < 2 {
            return Err(FitError::invalid(format!(
                "profile needs at least 2 samples, got {sample_count}"
            )));
        }

        let spline = integrate_profile(bond, integration_limit, sample_count)?;
        Ok(Self {
            bond,
            integration_limit,
            sample_count,
            spline,
            profile_size: integration_limit,
            integrations: 1,
        })
    }

    pub fn bond(&self) -> f64 {
        self.bond
    }

    pub fn integration_limit(&self) -> f64 {
        self.integration_limit
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Largest arc length at which the profile is defined.
    ///
    /// Equal to the integration limit unless the profile closed on the axis.
    pub fn valid_limit(&self) -> f64 {
        self.spline.end()
    }

    pub fn is_truncated(&self) -> bool {
        self.spline.len() < self.sample_count
    }

    /// Largest arc length used when matching contour points in the latest pass.
    pub fn profile_size(&self) -> f64 {
        self.profile_size
    }

    pub(crate) fn set_profile_size(&mut self, size: f64) {
        self.profile_size = size;
    }

    /// How many times the ODE system has been integrated for this model.
    pub fn integrations(&self) -> usize {
        self.integrations
    }

    /// Evaluate the profile at arc length `s`.
    pub fn profile(&mut self, s: f64) -> Result<ProfileState, FitError> {
        if !(s >= 0.0) {
            return Err(FitError::Domain { s });
        }
        self.ensure_limit(s)?;
        Ok(ProfileState::from(self.spline.eval(s)))
    }

    /// Evaluate the profile at every arc length in `s`.
    pub fn profile_many(&mut self, s: &[f64]) -> Result<Vec<ProfileState>, FitError> {
        let mut s_max = 0.0_f64;
        for &v in s {
            if !(v >= 0.0) {
                return Err(FitError::Domain { s: v });
            }
            s_max = s_max.max(v);
        }
        self.ensure_limit(s_max)?;
        Ok(s.iter().map(|&v| ProfileState::from(self.spline.eval(v))).collect())
    }

    /// Arc-length positions of the integration samples that are still valid.
    pub fn sample_positions(&self) -> Vec<f64> {
        (0..self.spline.len()).map(|i| self.spline.knot(i)).collect()
    }

    /// The integrated state at sample `i`.
    pub fn sample(&self, i: usize) -> ProfileState {
        ProfileState::from(*self.spline.knot_value(i))
    }

    fn ensure_limit(&mut self, s: f64) -> Result<(), FitError> {
        if s <= self.integration_limit {
            return Ok(());
        }
        let limit = LIMIT_EXPANSION * s;
        if !limit.is_finite() {
            return Err(FitError::numerical(format!("cannot expand profile to s = {s}")));
        }
        log::debug!(
            "profile: expanding integration limit {:.4} -> {:.4} (bond {:.5})",
            self.integration_limit,
            limit,
            self.bond
        );
        self.spline = integrate_profile(self.bond, limit, self.sample_count)?;
        self.integration_limit = limit;
        self.integrations += 1;
        Ok(())
    }
}

fn integrate_profile(bond: f64, limit: f64, sample_count: usize) -> Result<ClampedSpline<6>, FitError> {
    let grid = linspace(0.0, limit, sample_count);
    let rhs = |_: f64, y: &[f64; 6]| shape_rhs(bond, y);
    let solution = integrate_grid(rhs, SHAPE_INITIAL, &grid, &OdeOptions::default(), off_axis);

    if let Some(s) = solution.halted_at {
        log::debug!("profile: bond {bond:.5} closes near s = {s:.4}, truncating");
    }

    let states = solution.states;
    if states.len() < 4 {
        return Err(FitError::numerical(format!(
            "profile for bond {bond} could not be integrated past s = {:.3e}",
            grid.get(states.len().saturating_sub(1)).copied().unwrap_or(0.0)
        )));
    }

    let first = states[0];
    let last = states[states.len() - 1];
    let step = grid[1] - grid[0];
    ClampedSpline::new(0.0, step, states, shape_rhs(bond, &first), shape_rhs(bond, &last))
        .ok_or_else(|| FitError::numerical("failed to build profile spline"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_reproduced_exactly() {
        let mut model = ProfileModel::generate(0.3, 2.0, 201).unwrap();
        let positions = model.sample_positions();
        for i in [0usize, 1, 57, 100, 200] {
            let expected = model.sample(i);
            let got = model.profile(positions[i]).unwrap();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn zero_bond_profile_is_a_circle() {
        let mut model = ProfileModel::generate(0.0, 2.5, 2001).unwrap();
        for &s in &[0.1, 0.77, 1.5, 2.4] {
            let p = model.profile(s).unwrap();
            assert!((p.x - s.sin()).abs() < 1e-5, "x({s}) = {}", p.x);
            assert!((p.y - (1.0 - s.cos())).abs() < 1e-5, "y({s}) = {}", p.y);
            assert!((p.phi - s).abs() < 1e-5, "phi({s}) = {}", p.phi);
        }
    }

    #[test]
    fn negative_arc_length_is_a_domain_error() {
        let mut model = ProfileModel::generate(0.3, 2.0, 101).unwrap();
        assert_eq!(model.profile(-0.1), Err(FitError::Domain { s: -0.1 }));
        assert!(model.profile_many(&[0.5, -1.0]).is_err());
    }

    #[test]
    fn queries_beyond_the_limit_expand_it() {
        let mut model = ProfileModel::generate(0.3, 2.0, 2001).unwrap();
        let p = model.profile(3.0).unwrap();
        assert!((model.integration_limit() - 3.6).abs() < 1e-12);
        assert_eq!(model.integrations(), 2);

        // Same answer as a profile integrated directly to the larger limit.
        let mut direct = ProfileModel::generate(0.3, 3.6, 2001).unwrap();
        let q = direct.profile(3.0).unwrap();
        assert!((p.x - q.x).abs() < 1e-9 && (p.y - q.y).abs() < 1e-9);
    }

    #[test]
    fn bond_sensitivity_matches_finite_difference() {
        let (b, db, s) = (0.4, 1e-4, 1.8);
        let mut mid = ProfileModel::generate(b, 2.5, 2001).unwrap();
        let mut up = ProfileModel::generate(b + db, 2.5, 2001).unwrap();
        let mut down = ProfileModel::generate(b - db, 2.5, 2001).unwrap();
        let p = mid.profile(s).unwrap();
        let fd_x = (up.profile(s).unwrap().x - down.profile(s).unwrap().x) / (2.0 * db);
        let fd_y = (up.profile(s).unwrap().y - down.profile(s).unwrap().y) / (2.0 * db);
        assert!((p.dx_dbond - fd_x).abs() < 1e-4, "{} vs {fd_x}", p.dx_dbond);
        assert!((p.dy_dbond - fd_y).abs() < 1e-4, "{} vs {fd_y}", p.dy_dbond);
    }

    #[test]
    fn profile_through_the_axis_stays_finite() {
        // A sphere closes on the axis at s = π; past it the model either stops
        // or continues through a numerical neck, but never yields NaN.
        let mut model = ProfileModel::generate(0.0, 4.0, 4001).unwrap();
        assert!(model.valid_limit() > 3.0);
        let p = model.profile(3.9).unwrap();
        assert!(p.x.is_finite() && p.y.is_finite() && p.phi.is_finite());
    }
}
