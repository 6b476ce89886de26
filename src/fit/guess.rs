//! Initial parameter estimate.
//!
//! 1. Fit a circle to the whole contour, then refit on the points below the
//!    first circle's centre. The second circle approximates the apex region:
//!    its bottom is the apex and its radius the apex radius.
//! 2. Scan a grid of Bond numbers on a subsample of the contour and keep the
//!    one with the lowest sum of squared residuals.
//!
//! Rotation starts at zero.

use crate::domain::{Contour, FitParameters, Point};
use crate::error::FitError;
use crate::fit::jacobian::{ResidualJacobianAssembler, SideSeeds};
use crate::fit::pacer::{LogSink, Pacer};
use crate::fit::tolerances::FitConfig;
use crate::math::{Circle, fit_circle, linspace};
use crate::models::ProfileModel;

pub struct InitialGuessEstimator<'a> {
    config: &'a FitConfig,
    assembler: &'a ResidualJacobianAssembler,
}

impl<'a> InitialGuessEstimator<'a> {
    pub fn new(config: &'a FitConfig, assembler: &'a ResidualJacobianAssembler) -> Self {
        Self { config, assembler }
    }

    pub fn estimate(
        &self,
        contour: &Contour,
        pacer: &mut Pacer,
        log: &mut LogSink,
    ) -> Result<FitParameters, FitError> {
        let circle = apex_circle(contour.points())
            .ok_or_else(|| FitError::numerical("contour is degenerate: no circle fits it"))?;
        log::debug!(
            "guess: apex circle centre ({:.2}, {:.2}), radius {:.2}",
            circle.cx,
            circle.cy,
            circle.radius
        );

        let mut params = FitParameters {
            apex_x: circle.cx,
            apex_y: circle.cy - circle.radius,
            apex_radius: circle.radius,
            bond: 0.0,
            rotation: 0.0,
        };
        params.bond = self.scan_bond(contour, &params, pacer, log)?;

        if !params.is_well_formed() {
            return Err(FitError::numerical(format!("initial guess is not usable: {params:?}")));
        }
        log.line(&format!(
            "Initial guess: apex ({:.3}, {:.3}), apex radius {:.3}, Bond {:.4}",
            params.apex_x, params.apex_y, params.apex_radius, params.bond
        ));
        Ok(params)
    }

    /// Bond number with the lowest SSE on a contour subsample.
    fn scan_bond(
        &self,
        contour: &Contour,
        base: &FitParameters,
        pacer: &mut Pacer,
        log: &mut LogSink,
    ) -> Result<f64, FitError> {
        let points = subsample(contour.points(), self.config.guess_max_points);
        let candidates = linspace(
            self.config.guess_bond_min,
            self.config.guess_bond_max,
            self.config.guess_bond_steps,
        );

        let mut best: Option<(f64, f64)> = None;
        for bond in candidates {
            let params = FitParameters { bond, ..*base };
            let sse = match self.sse(&points, &params, pacer, log) {
                Ok(sse) => sse,
                Err(FitError::Cancelled) => return Err(FitError::Cancelled),
                Err(e) => {
                    log::debug!("guess: skipping bond {bond:.3}: {e}");
                    continue;
                }
            };
            log::trace!("guess: bond {bond:.3} sse {sse:.6e}");
            if best.is_none_or(|(_, best_sse)| sse < best_sse) {
                best = Some((bond, sse));
            }
        }

        best.map(|(bond, _)| bond)
            .ok_or_else(|| FitError::numerical("no Bond number in the scan range produced a profile"))
    }

    fn sse(
        &self,
        points: &[Point],
        params: &FitParameters,
        pacer: &mut Pacer,
        log: &mut LogSink,
    ) -> Result<f64, FitError> {
        let mut profile = ProfileModel::generate(
            params.bond,
            self.config.initial_integration_limit,
            self.config.profile_samples,
        )?;
        let mut seeds = SideSeeds::for_profile(&profile);
        let mut sse = 0.0;
        for &point in points {
            let row = self
                .assembler
                .row(point, params, &mut profile, &mut seeds, pacer, log)?;
            sse += row.residual * row.residual;
        }
        if sse.is_finite() {
            Ok(sse)
        } else {
            Err(FitError::numerical("non-finite SSE"))
        }
    }
}

/// Circle through the apex region of a contour sorted by ascending `y`.
fn apex_circle(points: &[Point]) -> Option<Circle> {
    let whole = fit_circle(points)?;
    let y_min = points.first()?[1];
    let cap: Vec<Point> = points
        .iter()
        .copied()
        .filter(|p| p[1] < y_min + whole.radius)
        .collect();
    if cap.len() < 3 {
        return Some(whole);
    }
    Some(fit_circle(&cap).unwrap_or(whole))
}

/// Every k-th point so that at most `max_points` remain, order preserved.
fn subsample(points: &[Point], max_points: usize) -> Vec<Point> {
    let stride = points.len().div_ceil(max_points.max(1)).max(1);
    points.iter().step_by(stride).copied().collect()
}
