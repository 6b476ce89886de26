//! Levenberg-Marquardt-Fletcher damping and stop conditions.
//!
//! Each iteration solves the damped normal equations
//!
//! ```text
//! (A + λ·diag(A)) δ = −v        A = JᵀJ,  v = Jᵀe
//! ```
//!
//! and evaluates the trial `p + δ` before committing to it. With `S` the
//! current and `S'` the trial sum of squares, the gain ratio is
//!
//! ```text
//! R = (S − S') / (δ · (−2v − Aδ))
//! ```
//!
//! Fletcher's rules then adapt `λ`: a poor ratio (`R < ρ`) raises it by a
//! factor `ν ∈ [2, 10]`, switching damping on at the critical value
//! `λ_c = 1 / max|M⁻¹|` if it was off; a good ratio (`R > σ`) halves it and
//! turns damping off once it drops below `λ_c`. The trial is accepted only if
//! `S' < S`, so the accepted objective never increases.

use nalgebra::{Matrix5, Vector5};

use crate::domain::{FitParameters, StopReason};
use crate::error::FitError;
use crate::fit::jacobian::Evaluation;
use crate::fit::tolerances::FitConfig;

/// Gain ratio below which damping increases.
pub const RHO: f64 = 0.25;
/// Gain ratio above which damping decreases.
pub const SIGMA: f64 = 0.75;

const NU_MIN: f64 = 2.0;
const NU_MAX: f64 = 10.0;

/// A damped step waiting for its trial evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Proposal {
    pub delta: Vector5<f64>,
    pub params: FitParameters,
    inverse: Matrix5<f64>,
}

/// Outcome of one completed iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Iteration {
    /// 1-based iteration count.
    pub index: usize,
    pub accepted: bool,
    /// Objective at the current (accepted) parameters, `S / dof`.
    pub objective: f64,
    pub params: FitParameters,
    pub lambda: f64,
    pub gain_ratio: f64,
    /// Non-empty when the fit should stop.
    pub stop: StopReason,
}

#[derive(Debug, Clone)]
pub struct LmfOptimizer {
    current: Evaluation,
    degrees_of_freedom: f64,
    lambda: f64,
    lambda_c: Option<f64>,
    iteration: usize,
    delta_tol: f64,
    gradient_tol: f64,
    objective_tol: f64,
    max_steps: usize,
    history: Vec<f64>,
}

impl LmfOptimizer {
    /// Start from an evaluated seed.
    pub fn new(seed: Evaluation, degrees_of_freedom: usize, config: &FitConfig) -> Self {
        let degrees_of_freedom = degrees_of_freedom.max(1) as f64;
        let history = vec![seed.sse / degrees_of_freedom];
        Self {
            current: seed,
            degrees_of_freedom,
            lambda: 0.0,
            lambda_c: None,
            iteration: 0,
            delta_tol: config.delta_tol,
            gradient_tol: config.gradient_tol,
            objective_tol: config.objective_tol,
            max_steps: config.max_fitting_steps,
            history,
        }
    }

    pub fn current(&self) -> &Evaluation {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Evaluation {
        &mut self.current
    }

    pub fn objective(&self) -> f64 {
        self.current.sse / self.degrees_of_freedom
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Objective after the seed and after every accepted step.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// Solve the damped normal equations at the current parameters.
    pub fn propose(&self) -> Result<Proposal, FitError> {
        let a = &self.current.normal;
        let damped = a + Matrix5::from_diagonal(&a.diagonal()) * self.lambda;
        let inverse = damped
            .try_inverse()
            .ok_or_else(|| FitError::numerical("singular normal equations"))?;
        let delta = -(inverse * self.current.gradient);
        if !delta.iter().all(|d| d.is_finite()) {
            return Err(FitError::numerical("non-finite parameter step"));
        }
        let params = FitParameters::from_vector(&(self.current.params.to_vector() + delta));
        Ok(Proposal {
            delta,
            params,
            inverse,
        })
    }

    /// Apply the trial outcome: update damping, accept or reject, check stop conditions.
    ///
    /// `trial` is `None` when the trial parameters could not be evaluated; that
    /// counts as a rejected step.
    pub fn complete(&mut self, proposal: &Proposal, trial: Option<Evaluation>) -> Iteration {
        let s = self.current.sse;
        let s_new = trial.as_ref().map_or(f64::INFINITY, |t| t.sse);
        let delta = &proposal.delta;
        let v = &self.current.gradient;
        let a = &self.current.normal;

        let predicted = delta.dot(&(-2.0 * v - a * delta));
        let ratio = if predicted > 0.0 && predicted.is_finite() {
            (s - s_new) / predicted
        } else {
            f64::NEG_INFINITY
        };

        if !(ratio >= RHO) {
            let dv = delta.dot(v);
            let mut nu = (NU_MIN - (s_new - s) / dv).clamp(NU_MIN, NU_MAX);
            if !nu.is_finite() {
                nu = NU_MAX;
            }
            if self.lambda == 0.0 {
                let lambda_c = critical_lambda(&proposal.inverse);
                self.lambda_c = Some(lambda_c);
                self.lambda = lambda_c;
                nu /= 2.0;
            }
            self.lambda *= nu;
        } else if ratio > SIGMA {
            self.lambda /= 2.0;
            if self.lambda_c.is_some_and(|c| self.lambda < c) {
                self.lambda = 0.0;
            }
        }

        let accepted = s_new < s;
        if let Some(trial) = trial.filter(|_| accepted) {
            self.current = trial;
            self.history.push(self.objective());
        }
        self.iteration += 1;

        let stop = self.stop_reason(delta);
        log::debug!(
            "lmf: iter {} R {:.3} lambda {:.3e} accepted {} objective {:.6e}",
            self.iteration,
            ratio,
            self.lambda,
            accepted,
            self.objective()
        );

        Iteration {
            index: self.iteration,
            accepted,
            objective: self.objective(),
            params: self.current.params,
            lambda: self.lambda,
            gain_ratio: ratio,
            stop,
        }
    }

    fn stop_reason(&self, delta: &Vector5<f64>) -> StopReason {
        let params = self.current.params.to_vector();
        let scaled_step = delta
            .iter()
            .zip(params.iter())
            .map(|(d, p)| if *p == 0.0 { d.abs() } else { (d / p).abs() })
            .filter(|x| !x.is_nan())
            .fold(0.0_f64, f64::max);
        let gradient = self.current.gradient.amax();

        let mut stop = StopReason::empty();
        if scaled_step < self.delta_tol {
            stop |= StopReason::CONVERGENCE_IN_PARAMETERS;
        }
        if gradient < self.gradient_tol {
            stop |= StopReason::CONVERGENCE_IN_GRADIENT;
        }
        if self.objective() < self.objective_tol {
            stop |= StopReason::CONVERGENCE_IN_OBJECTIVE;
        }
        if self.iteration >= self.max_steps {
            stop |= StopReason::MAXIMUM_STEPS_EXCEEDED;
        }
        stop
    }
}

/// `1 / max|M⁻¹|`, falling back to 1 when the inverse is all zeros.
fn critical_lambda(inverse: &Matrix5<f64>) -> f64 {
    let max = inverse.amax();
    if max > 0.0 && max.is_finite() { 1.0 / max } else { 1.0 }
}
