//! Fit tolerances and tuning knobs.
//!
//! The named tolerances are the stop thresholds of the optimizer and of the
//! arc-length search. Everything lives in `FitConfig` so a host can tighten or
//! relax them per session; the constants are the defaults.

use std::time::Duration;

use crate::error::FitError;

/// Parameter convergence: `max |δ_i / p_i|`.
pub const DELTA_TOL: f64 = 1e-8;
/// Gradient convergence: `max |v_i|`.
pub const GRADIENT_TOL: f64 = 1e-8;
/// Objective convergence: `S / dof`.
pub const OBJECTIVE_TOL: f64 = 1e-8;
pub const MAXIMUM_FITTING_STEPS: usize = 50;
/// Newton convergence on arc length (dimensionless).
pub const ARCLENGTH_TOL: f64 = 1e-6;
pub const MAXIMUM_ARCLENGTH_STEPS: usize = 10;

/// Minimum wall-clock time between two yields to the host.
pub const YIELD_INTERVAL: Duration = Duration::from_millis(15);

#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Samples of the integrated profile.
    pub profile_samples: usize,
    /// Starting integration limit (dimensionless arc length).
    pub initial_integration_limit: f64,

    pub delta_tol: f64,
    pub gradient_tol: f64,
    pub objective_tol: f64,
    pub max_fitting_steps: usize,

    pub arclength_tol: f64,
    pub max_arclength_steps: usize,

    pub yield_interval: Duration,

    /// Bond numbers scanned for the initial guess.
    pub guess_bond_min: f64,
    pub guess_bond_max: f64,
    pub guess_bond_steps: usize,
    /// Contour points used per scanned Bond number.
    pub guess_max_points: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            profile_samples: 5000,
            initial_integration_limit: 4.0,
            delta_tol: DELTA_TOL,
            gradient_tol: GRADIENT_TOL,
            objective_tol: OBJECTIVE_TOL,
            max_fitting_steps: MAXIMUM_FITTING_STEPS,
            arclength_tol: ARCLENGTH_TOL,
            max_arclength_steps: MAXIMUM_ARCLENGTH_STEPS,
            yield_interval: YIELD_INTERVAL,
            guess_bond_min: -1.0,
            guess_bond_max: 1.0,
            guess_bond_steps: 41,
            guess_max_points: 120,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        if self.profile_samples < 4 {
            return Err(FitError::invalid("profile_samples must be >= 4"));
        }
        if !(self.initial_integration_limit > 0.0 && self.initial_integration_limit.is_finite()) {
            return Err(FitError::invalid("initial_integration_limit must be finite and > 0"));
        }
        for (name, tol) in [
            ("delta_tol", self.delta_tol),
            ("gradient_tol", self.gradient_tol),
            ("objective_tol", self.objective_tol),
            ("arclength_tol", self.arclength_tol),
        ] {
            if !(tol >= 0.0 && tol.is_finite()) {
                return Err(FitError::invalid(format!("{name} must be finite and >= 0, got {tol}")));
            }
        }
        if self.max_fitting_steps == 0 || self.max_arclength_steps == 0 {
            return Err(FitError::invalid("step budgets must be >= 1"));
        }
        if !(self.guess_bond_min.is_finite()
            && self.guess_bond_max.is_finite()
            && self.guess_bond_max >= self.guess_bond_min)
        {
            return Err(FitError::invalid("guess Bond range must be finite with max >= min"));
        }
        if self.guess_bond_steps == 0 || self.guess_max_points < 5 {
            return Err(FitError::invalid(
                "guess needs >= 1 Bond candidate and >= 5 contour points",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(FitConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_bond_range_is_rejected() {
        let config = FitConfig {
            guess_bond_min: 1.0,
            guess_bond_max: 0.0,
            ..FitConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
