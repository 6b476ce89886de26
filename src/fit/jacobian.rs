//! Residuals and Jacobian of the contour against the scaled, rotated profile.
//!
//! A contour point `(x, y)` is mapped into the drop frame
//!
//! ```text
//! r = cos w · (x − xP) − sin w · (y − yP)
//! z = sin w · (x − xP) + cos w · (y − yP)
//! ```
//!
//! and matched to its nearest profile point. The residual is the distance
//! `‖e‖`, signed positive outside the drop, and each Jacobian row is the unit
//! error direction `u` applied to the partial derivatives of `e = (|r| − RP·x, z − RP·y)`.
//! Tangential terms vanish at the nearest point, so this is the exact gradient
//! of the distance there.
//!
//! A full pass is resumable: [`EvaluationPass`] keeps its position and partial
//! sums so the session can hand control back to the host between points.

use nalgebra::{Matrix5, Vector5};

use crate::domain::{Contour, FitParameters, Point, ResidualRecord};
use crate::error::FitError;
use crate::fit::nearest::{NearestPoint, NearestPointSolver};
use crate::fit::pacer::{LogSink, Pacer};
use crate::models::ProfileModel;

/// Fraction of the integration limit used to seed the first search on each side.
const SEED_FRACTION: f64 = 0.05;

/// Below this distance (pixels) the error direction falls back to the profile normal.
const DIRECTION_EPS: f64 = 1e-12;

/// Last matched arc length on each side of the apex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideSeeds {
    pub left: f64,
    pub right: f64,
}

impl SideSeeds {
    pub fn for_profile(profile: &ProfileModel) -> Self {
        let s = SEED_FRACTION * profile.integration_limit();
        Self { left: s, right: s }
    }

    /// Seed the next search on one side from this match.
    ///
    /// Matches at the apex are not reused: Newton started at `s = 0` sees the
    /// apex singularity, so those fall back to the default seed.
    pub fn record(&mut self, left: bool, arc_length: f64, profile: &ProfileModel) {
        let seed = arc_length.max(SEED_FRACTION * profile.integration_limit());
        if left {
            self.left = seed;
        } else {
            self.right = seed;
        }
    }
}

/// One contour point's contribution.
#[derive(Debug, Clone, Copy)]
pub struct JacobianRow {
    /// `∂e_i/∂(xP, yP, RP, B, w)`.
    pub row: Vector5<f64>,
    pub residual: f64,
    /// Matched arc length, negative on the left of the apex.
    pub arc_length: f64,
    pub nearest: NearestPoint,
}

#[derive(Debug, Clone, Copy)]
pub struct ResidualJacobianAssembler {
    solver: NearestPointSolver,
}

impl ResidualJacobianAssembler {
    pub fn new(solver: NearestPointSolver) -> Self {
        Self { solver }
    }

    pub fn solver(&self) -> &NearestPointSolver {
        &self.solver
    }

    /// Residual and Jacobian row of a single contour point.
    pub fn row(
        &self,
        point: Point,
        params: &FitParameters,
        profile: &mut ProfileModel,
        seeds: &mut SideSeeds,
        pacer: &mut Pacer,
        log: &mut LogSink,
    ) -> Result<JacobianRow, FitError> {
        let (r, z) = params.rz_from_xy(point[0] - params.apex_x, point[1] - params.apex_y);
        let left = r < 0.0;
        let side = if left { -1.0 } else { 1.0 };
        let seed = if left { seeds.left } else { seeds.right };

        let hit = self
            .solver
            .solve(r, z, params.apex_radius, profile, seed, pacer, log)?;
        seeds.record(left, hit.arc_length, profile);

        let state = hit.state;
        let (sin_phi, cos_phi) = state.phi.sin_cos();
        // Outward normal of the profile.
        let (n_r, n_z) = (sin_phi, -cos_phi);

        // Signed by the outward normal, not by the side of the axis, so the
        // sign means outside/inside on both halves of the profile.
        let distance = hit.distance();
        let (u_r, u_z) = if distance > DIRECTION_EPS {
            let outside = if hit.e_r * n_r + hit.e_z * n_z < 0.0 { -1.0 } else { 1.0 };
            (outside * hit.e_r / distance, outside * hit.e_z / distance)
        } else {
            (n_r, n_z)
        };
        let residual = u_r * hit.e_r + u_z * hit.e_z;

        let (sin_w, cos_w) = params.rotation.sin_cos();
        let rp = params.apex_radius;
        let row = Vector5::new(
            u_r * (-side * cos_w) + u_z * (-sin_w),
            u_r * (side * sin_w) + u_z * (-cos_w),
            -(u_r * state.x + u_z * state.y),
            -rp * (u_r * state.dx_dbond + u_z * state.dy_dbond),
            u_r * side * (-z) + u_z * r,
        );

        Ok(JacobianRow {
            row,
            residual,
            arc_length: side * hit.arc_length,
            nearest: hit,
        })
    }
}

/// Normal equations of one parameter vector, ready for the optimizer.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub params: FitParameters,
    /// The profile the pass ran against, with `profile_size` set.
    pub profile: ProfileModel,
    /// `JᵀJ`.
    pub normal: Matrix5<f64>,
    /// `Jᵀe`.
    pub gradient: Vector5<f64>,
    /// `Σ e_i²`.
    pub sse: f64,
    pub residuals: Vec<ResidualRecord>,
}

/// A residual/Jacobian pass over the contour that can stop between points.
#[derive(Debug, Clone)]
pub struct EvaluationPass {
    params: FitParameters,
    profile: ProfileModel,
    next: usize,
    seeds: SideSeeds,
    s_max: f64,
    normal: Matrix5<f64>,
    gradient: Vector5<f64>,
    sse: f64,
    residuals: Vec<ResidualRecord>,
}

impl EvaluationPass {
    pub fn new(params: FitParameters, profile: ProfileModel) -> Self {
        let seeds = SideSeeds::for_profile(&profile);
        Self {
            params,
            profile,
            next: 0,
            seeds,
            s_max: 0.0,
            normal: Matrix5::zeros(),
            gradient: Vector5::zeros(),
            sse: 0.0,
            residuals: Vec::new(),
        }
    }

    pub fn params(&self) -> &FitParameters {
        &self.params
    }

    /// Points processed so far.
    pub fn position(&self) -> usize {
        self.next
    }

    /// Process points until the contour is done (`true`) or the pacer asks for a yield (`false`).
    pub fn resume(
        &mut self,
        contour: &Contour,
        assembler: &ResidualJacobianAssembler,
        pacer: &mut Pacer,
        log: &mut LogSink,
    ) -> Result<bool, FitError> {
        let points = contour.points();
        if self.residuals.capacity() == 0 {
            self.residuals.reserve_exact(points.len());
        }

        while self.next < points.len() {
            let row = assembler.row(
                points[self.next],
                &self.params,
                &mut self.profile,
                &mut self.seeds,
                pacer,
                log,
            )?;

            let j = &row.row;
            for a in 0..5 {
                for b in 0..=a {
                    self.normal[(a, b)] += j[a] * j[b];
                }
            }
            self.gradient += j * row.residual;
            self.sse += row.residual * row.residual;
            self.s_max = self.s_max.max(row.arc_length.abs());
            self.residuals.push(ResidualRecord {
                arc_length: row.arc_length,
                residual: row.residual,
            });
            self.next += 1;

            if pacer.take_yield() && self.next < points.len() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Close a completed pass.
    pub fn finish(mut self) -> Result<Evaluation, FitError> {
        for a in 0..5 {
            for b in (a + 1)..5 {
                self.normal[(a, b)] = self.normal[(b, a)];
            }
        }
        if !self.sse.is_finite()
            || !self.gradient.iter().all(|v| v.is_finite())
            || !self.normal.iter().all(|v| v.is_finite())
        {
            return Err(FitError::numerical(format!(
                "non-finite residuals for bond {:.6}",
                self.params.bond
            )));
        }
        self.profile.set_profile_size(self.s_max);
        Ok(Evaluation {
            params: self.params,
            profile: self.profile,
            normal: self.normal,
            gradient: self.gradient,
            sse: self.sse,
            residuals: self.residuals,
        })
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

    fn params(bond: f64, rotation: f64) -> FitParameters {
        FitParameters {
            apex_x: 50.0,
            apex_y: 20.0,
            apex_radius: 30.0,
            bond,
            rotation,
        }
    }

    /// Residual of a point against params, with a fresh profile.
    fn residual(point: Point, p: &FitParameters) -> f64 {
        let solver = NearestPointSolver::new(1e-12, 50);
        let assembler = ResidualJacobianAssembler::new(solver);
        let mut profile = ProfileModel::generate(p.bond, 4.0, 4001).unwrap();
        let mut seeds = SideSeeds { left: 0.8, right: 0.8 };
        assembler
            .row(point, p, &mut profile, &mut seeds, &mut pacer(), &mut LogSink::discard())
            .unwrap()
            .residual
    }

    #[test]
    fn rows_match_finite_differences() {
        let base = params(0.3, 0.05);
        let solver = NearestPointSolver::new(1e-12, 50);
        let assembler = ResidualJacobianAssembler::new(solver);

        for point in [[72.0, 48.0], [31.0, 41.0]] {
            let mut profile = ProfileModel::generate(base.bond, 4.0, 4001).unwrap();
            let mut seeds = SideSeeds { left: 0.8, right: 0.8 };
            let row = assembler
                .row(point, &base, &mut profile, &mut seeds, &mut pacer(), &mut LogSink::discard())
                .unwrap();

            let steps = [1e-4, 1e-4, 1e-4, 1e-4, 1e-5];
            for (k, h) in steps.into_iter().enumerate() {
                let mut up = base.to_vector();
                let mut down = base.to_vector();
                up[k] += h;
                down[k] -= h;
                let fd = (residual(point, &FitParameters::from_vector(&up))
                    - residual(point, &FitParameters::from_vector(&down)))
                    / (2.0 * h);
                assert!(
                    (row.row[k] - fd).abs() < 1e-3 * (1.0 + fd.abs()),
                    "point {point:?} param {k}: analytic {} vs fd {fd}",
                    row.row[k]
                );
            }
        }
    }

    #[test]
    fn residual_sign_is_positive_outside() {
        let p = params(0.0, 0.0);
        // The apex is at (50, 20); a point below it is outside, a point above it inside.
        assert!(residual([50.0, 15.0], &p) > 4.9);
        assert!(residual([50.0, 25.0], &p) < -4.9);
    }

    #[test]
    fn residual_sign_does_not_depend_on_the_side() {
        let p = params(0.0, 0.0);
        // Circle centre is (50, 50).
        for x in [15.0, 85.0] {
            assert!((residual([x, 50.0], &p) - 5.0).abs() < 1e-6);
        }
        for x in [25.0, 75.0] {
            assert!((residual([x, 50.0], &p) + 5.0).abs() < 1e-6);
        }
    }

    #[test]
    fn arc_length_is_signed_by_side() {
        let p = params(0.0, 0.0);
        let contour = Contour::new(vec![
            [20.0, 50.0],
            [29.0, 30.0],
            [50.0, 20.0],
            [71.0, 30.0],
            [80.0, 50.0],
        ])
        .unwrap();
        let profile = ProfileModel::generate(0.0, 4.0, 2001).unwrap();
        let assembler = ResidualJacobianAssembler::new(NearestPointSolver::new(1e-9, 20));
        let mut pass = EvaluationPass::new(p, profile);
        assert!(pass
            .resume(&contour, &assembler, &mut pacer(), &mut LogSink::discard())
            .unwrap());
        let evaluation = pass.finish().unwrap();

        let records = &evaluation.residuals;
        let left: Vec<_> = records.iter().filter(|r| r.arc_length < -1e-6).collect();
        let right: Vec<_> = records.iter().filter(|r| r.arc_length > 1e-6).collect();
        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 2);
        assert!((evaluation.profile.profile_size() - std::f64::consts::FRAC_PI_2).abs() < 1e-3);
        assert!(evaluation.normal.transpose() == evaluation.normal);
    }

    #[test]
    fn apex_match_does_not_seed_the_next_point() {
        let profile = ProfileModel::generate(0.0, 4.0, 2001).unwrap();
        let mut seeds = SideSeeds::for_profile(&profile);
        seeds.record(false, 0.0, &profile);
        assert!((seeds.right - 0.2).abs() < 1e-12);
        seeds.record(true, 1.3, &profile);
        assert_eq!(seeds.left, 1.3);
    }

    #[test]
    fn sparse_points_after_the_apex_match_their_own_side() {
        // Radius-30 circle with apex (50, 20); the apex point is processed first.
        let p = params(0.0, 0.0);
        let contour = Contour::new(vec![
            [50.0, 20.0],
            [71.0, 30.0],
            [29.0, 30.0],
            [80.0, 50.0],
            [20.0, 50.0],
        ])
        .unwrap();
        let assembler = ResidualJacobianAssembler::new(NearestPointSolver::new(1e-9, 10));
        let mut pass = EvaluationPass::new(p, ProfileModel::generate(0.0, 4.0, 2001).unwrap());
        assert!(pass
            .resume(&contour, &assembler, &mut pacer(), &mut LogSink::discard())
            .unwrap());
        let evaluation = pass.finish().unwrap();
        for record in &evaluation.residuals {
            assert!(record.residual.abs() < 1.0 + 1e-6, "{record:?}");
        }
    }

    #[test]
    fn pass_suspends_and_resumes_to_the_same_result() {
        let p = params(0.2, 0.0);
        let contour = Contour::new(
            (0..40)
                .map(|i| {
                    let t = -1.4 + 2.8 * i as f64 / 39.0;
                    [50.0 + 31.0 * t.sin(), 50.0 - 31.0 * t.cos()]
                })
                .collect(),
        )
        .unwrap();
        let assembler = ResidualJacobianAssembler::new(NearestPointSolver::new(1e-9, 20));

        let mut straight = EvaluationPass::new(p, ProfileModel::generate(0.2, 4.0, 2001).unwrap());
        assert!(straight
            .resume(&contour, &assembler, &mut pacer(), &mut LogSink::discard())
            .unwrap());
        let straight = straight.finish().unwrap();

        let mut eager = Pacer::new(Duration::ZERO, CancelToken::new());
        let mut paced = EvaluationPass::new(p, ProfileModel::generate(0.2, 4.0, 2001).unwrap());
        let mut suspensions = 0;
        loop {
            std::thread::sleep(Duration::from_micros(50));
            if paced
                .resume(&contour, &assembler, &mut eager, &mut LogSink::discard())
                .unwrap()
            {
                break;
            }
            suspensions += 1;
        }
        let paced = paced.finish().unwrap();

        assert!(suspensions > 0);
        assert_eq!(paced.sse, straight.sse);
        assert_eq!(paced.gradient, straight.gradient);
        assert_eq!(paced.residuals, straight.residuals);
    }
}
