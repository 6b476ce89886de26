//! Nearest point on the theoretical profile.
//!
//! For a target `(r, z)` in the drop frame (pixels) we look for the arc length
//! `s` at which the scaled profile point `RP · (x(s), y(s))` is closest to the
//! target. The condition is that the error vector `e = target − RP·P(s)` is
//! normal to the profile tangent `(cos φ, sin φ)`:
//!
//! ```text
//! f(s) = e_r cos φ + e_z sin φ = 0
//! ```
//!
//! Newton's method on `f` gives the update
//!
//! ```text
//! s ← s + (e_r cos φ + e_z sin φ) / (RP + φ'(s) · (e_r sin φ − e_z cos φ))
//! ```
//!
//! The iteration is bounded: `s` is clamped to the valid profile, and two
//! consecutive clamps ("bumps") end the search at the boundary. Each step is
//! also guarded by the distance itself: a step that moves farther from the
//! target is halved until it does not, so the search cannot bounce between
//! the apex and a point past the true match.

use crate::error::FitError;
use crate::fit::pacer::{LogSink, Pacer};
use crate::fit::tolerances::FitConfig;
use crate::models::{ProfileModel, ProfileState, young_laplace::curvature};

/// Consecutive clamps after which the search stops at the boundary.
const MAX_BUMPS: usize = 2;

/// Halvings of a Newton step before it is given up as uphill.
const MAX_HALVINGS: usize = 12;

/// Result of a nearest-point search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint {
    /// Profile state (and Bond sensitivities) at `arc_length`.
    pub state: ProfileState,
    /// `r − RP·x`, pixels.
    pub e_r: f64,
    /// `z − RP·y`, pixels.
    pub e_z: f64,
    pub arc_length: f64,
    /// False when the step budget ran out or the update went non-finite.
    pub converged: bool,
}

impl NearestPoint {
    pub fn distance(&self) -> f64 {
        self.e_r.hypot(self.e_z)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NearestPointSolver {
    tolerance: f64,
    max_steps: usize,
}

impl NearestPointSolver {
    pub fn new(tolerance: f64, max_steps: usize) -> Self {
        Self {
            tolerance,
            max_steps: max_steps.max(1),
        }
    }

    pub fn from_config(config: &FitConfig) -> Self {
        Self::new(config.arclength_tol, config.max_arclength_steps)
    }

    /// Find the profile point nearest to `(target_r, target_z)`.
    ///
    /// The profile is symmetric about the axis so only `|target_r|` matters;
    /// callers restore the side from the sign of `target_r`.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &self,
        target_r: f64,
        target_z: f64,
        apex_radius: f64,
        profile: &mut ProfileModel,
        initial_s: f64,
        pacer: &mut Pacer,
        log: &mut LogSink,
    ) -> Result<NearestPoint, FitError> {
        let r = target_r.abs();
        let z = target_z;
        let bond = profile.bond();
        let distance_at = |state: &ProfileState| (r - apex_radius * state.x).hypot(z - apex_radius * state.y);

        let mut s = if initial_s.is_finite() { initial_s.max(0.0) } else { 0.0 };
        let mut state = profile.profile(s)?;
        let mut distance = distance_at(&state);
        let mut bumps = 0usize;
        let mut converged = false;

        // `distance` never increases, so `s` is always the best point seen so far.
        for _ in 0..self.max_steps {
            pacer.checkpoint()?;

            let e_r = r - apex_radius * state.x;
            let e_z = z - apex_radius * state.y;
            let (sin, cos) = state.phi.sin_cos();
            let dphi_ds = curvature(bond, state.x, state.y, state.phi);

            let mut step = (e_r * cos + e_z * sin) / (apex_radius + dphi_ds * (e_r * sin - e_z * cos));
            if !step.is_finite() {
                break;
            }

            let mut halvings = 0;
            let (s_next, bumped, next_state, next_distance) = loop {
                let (s_next, bumped) = self.bound(s + step, profile);
                let next_state = profile.profile(s_next)?;
                let next_distance = distance_at(&next_state);
                if next_distance <= distance || halvings >= MAX_HALVINGS {
                    break (s_next, bumped, next_state, next_distance);
                }
                step *= 0.5;
                halvings += 1;
            };

            let moved = (s_next - s).abs();
            if next_distance <= distance {
                s = s_next;
                state = next_state;
                distance = next_distance;
            }
            if moved < self.tolerance {
                converged = true;
                break;
            }
            if next_distance > distance {
                // Every shortened step was uphill.
                break;
            }

            bumps = if bumped { bumps + 1 } else { 0 };
            if bumps >= MAX_BUMPS {
                converged = true;
                break;
            }
        }

        if !converged {
            let message = format!(
                "Warning: nearest point search did not converge for ({target_r:.3}, {target_z:.3})"
            );
            log::warn!("{message}");
            log.line(&message);
        }

        Ok(NearestPoint {
            state,
            e_r: r - apex_radius * state.x,
            e_z: z - apex_radius * state.y,
            arc_length: s,
            converged,
        })
    }

    /// Clamp `s` into the valid profile; the flag reports whether it was clamped.
    fn bound(&self, s: f64, profile: &ProfileModel) -> (f64, bool) {
        if s < 0.0 {
            (0.0, true)
        } else if profile.is_truncated() && s > profile.valid_limit() {
            (profile.valid_limit(), true)
        } else {
            (s, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fit::pacer::CancelToken;

    fn pacer() -> Pacer {
        Pacer::new(Duration::from_secs(60), CancelToken::new())
    }

    #[test]
    fn point_on_a_sphere_is_found_exactly() {
        let mut profile = ProfileModel::generate(0.0, 4.0, 4001).unwrap();
        let radius = 20.0;
        let s_true: f64 = 1.1;
        let (r, z) = (radius * s_true.sin(), radius * (1.0 - s_true.cos()));

        let solver = NearestPointSolver::new(1e-9, 20);
        let hit = solver
            .solve(r, z, radius, &mut profile, 0.5, &mut pacer(), &mut LogSink::discard())
            .unwrap();
        assert!(hit.converged);
        assert!((hit.arc_length - s_true).abs() < 1e-5, "s = {}", hit.arc_length);
        assert!(hit.distance() < 1e-3);
    }

    #[test]
    fn offset_point_is_projected_along_the_normal() {
        // Outside a circle of radius 10 by 2 px along the radial direction.
        let mut profile = ProfileModel::generate(0.0, 4.0, 4001).unwrap();
        let s_true: f64 = 0.7;
        let (r, z) = (12.0 * s_true.sin(), 10.0 - 12.0 * s_true.cos());
        let solver = NearestPointSolver::new(1e-9, 20);
        let hit = solver
            .solve(-r, z, 10.0, &mut profile, 0.2, &mut pacer(), &mut LogSink::discard())
            .unwrap();
        assert!((hit.arc_length - s_true).abs() < 1e-5);
        assert!((hit.distance() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn search_from_the_apex_reaches_a_point_inside_the_drop() {
        // Circle of radius 30 centred at (0, 30); (21, 10) lies 1 px inside it.
        let mut profile = ProfileModel::generate(0.0, 4.0, 5000).unwrap();
        let solver = NearestPointSolver::from_config(&FitConfig::default());
        let hit = solver
            .solve(21.0, 10.0, 30.0, &mut profile, 0.0, &mut pacer(), &mut LogSink::discard())
            .unwrap();
        let s_true = 21.0_f64.atan2(20.0);
        assert!(hit.converged);
        assert!((hit.arc_length - s_true).abs() < 1e-5, "s = {}", hit.arc_length);
        assert!((hit.distance() - 1.0).abs() < 1e-4, "distance = {}", hit.distance());
    }

    #[test]
    fn search_never_ends_farther_than_it_started() {
        let mut profile = ProfileModel::generate(0.4, 4.0, 2001).unwrap();
        let solver = NearestPointSolver::new(1e-12, 3);
        for (r, z, seed) in [(25.0, 40.0, 0.0), (-5.0, 60.0, 2.5), (40.0, 2.0, 0.0)] {
            let start = profile.profile(seed).unwrap();
            let start_distance = (f64::abs(r) - 20.0 * start.x).hypot(z - 20.0 * start.y);
            let hit = solver
                .solve(r, z, 20.0, &mut profile, seed, &mut pacer(), &mut LogSink::discard())
                .unwrap();
            assert!(
                hit.distance() <= start_distance,
                "({r}, {z}): {} > {start_distance}",
                hit.distance()
            );
        }
    }

    #[test]
    fn points_below_the_apex_match_the_apex() {
        let mut profile = ProfileModel::generate(0.2, 4.0, 2001).unwrap();
        let solver = NearestPointSolver::new(1e-9, 10);
        let hit = solver
            .solve(0.0, -5.0, 10.0, &mut profile, 0.1, &mut pacer(), &mut LogSink::discard())
            .unwrap();
        assert!(hit.arc_length >= 0.0 && hit.arc_length < 1e-3, "s = {}", hit.arc_length);
        assert!(hit.state.x.is_finite());
    }

    #[test]
    fn cancellation_is_observed() {
        let token = CancelToken::new();
        token.cancel();
        let mut pacer = Pacer::new(Duration::ZERO, token);
        let mut profile = ProfileModel::generate(0.2, 4.0, 501).unwrap();
        let err = NearestPointSolver::new(1e-6, 10)
            .solve(1.0, 1.0, 10.0, &mut profile, 0.1, &mut pacer, &mut LogSink::discard())
            .unwrap_err();
        assert_eq!(err, FitError::Cancelled);
    }
}
