//! One fit of one contour, driven step by step by its host.
//!
//! [`FitSession::advance`] does a bounded amount of work and returns. Between
//! calls the session keeps where it was: the seeding phase, a partially
//! assembled residual pass, or a finished result. [`FitSession::run`] just
//! loops until the session is terminal.
//!
//! Lifecycle:
//!
//! - `Seeding`: initial guess, then the seed pass
//! - `Evaluating`: the seed pass, then one trial pass per optimizer iteration
//! - terminal: `Converged`, `Cancelled` or `Error`
//!
//! Parameters, residuals and the profile only change when a trial is accepted,
//! so observers always see a consistent snapshot and cancellation never
//! leaves a half-updated result behind.

use crate::domain::{Contour, FitParameters, FitState, Point, ResidualRecord, StopReason};
use crate::error::FitError;
use crate::fit::guess::InitialGuessEstimator;
use crate::fit::jacobian::{Evaluation, EvaluationPass, ResidualJacobianAssembler};
use crate::fit::lmf::{Iteration, LmfOptimizer, Proposal};
use crate::fit::nearest::NearestPointSolver;
use crate::fit::pacer::{CancelToken, LogSink, Pacer};
use crate::fit::tolerances::FitConfig;
use crate::math::linspace;
use crate::models::{ProfileModel, ProfileState};

/// Notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum FitEvent {
    /// The seed or a trial step was accepted; `iteration` is 0 for the seed.
    Accepted {
        iteration: usize,
        params: FitParameters,
        objective: f64,
    },
    /// The session became terminal.
    Finished(FitState),
}

/// What one call to [`FitSession::advance`] achieved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepResult {
    /// Work was done but no iteration completed.
    Yielded,
    /// An optimizer iteration completed.
    Iterated(Iteration),
    Finished(FitState),
}

type Observer = Box<dyn FnMut(&FitEvent) + Send>;

enum Phase {
    Seeding,
    Evaluating {
        pass: EvaluationPass,
        /// `None` while evaluating the seed.
        proposal: Option<Proposal>,
    },
    /// The trial parameters could not even produce a profile.
    FailedTrial { proposal: Proposal, reason: FitError },
    Done,
}

pub struct FitSession {
    contour: Contour,
    config: FitConfig,
    assembler: ResidualJacobianAssembler,
    pacer: Pacer,
    log: LogSink,
    observers: Vec<Observer>,
    phase: Phase,
    optimizer: Option<LmfOptimizer>,
    state: FitState,
    stop_reason: StopReason,
    failure: Option<FitError>,
}

impl FitSession {
    pub fn new(contour: Contour, config: FitConfig) -> Result<Self, FitError> {
        config.validate()?;
        let assembler = ResidualJacobianAssembler::new(NearestPointSolver::from_config(&config));
        let pacer = Pacer::new(config.yield_interval, CancelToken::new());
        Ok(Self {
            contour,
            config,
            assembler,
            pacer,
            log: LogSink::discard(),
            observers: Vec::new(),
            phase: Phase::Seeding,
            optimizer: None,
            state: FitState::Running,
            stop_reason: StopReason::empty(),
            failure: None,
        })
    }

    /// Route progress lines to `log`.
    pub fn with_log(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    /// Share an externally owned cancellation flag.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.pacer = Pacer::new(self.config.yield_interval, token);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.pacer.cancel_token().clone()
    }

    pub fn cancel(&self) {
        self.pacer.cancel_token().cancel();
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&FitEvent) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn contour(&self) -> &Contour {
        &self.contour
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    /// Stop flags of the final iteration; empty unless converged.
    pub fn stop_reason(&self) -> StopReason {
        self.stop_reason
    }

    pub fn failure(&self) -> Option<&FitError> {
        self.failure.as_ref()
    }

    /// Accepted parameters, once the seed pass has completed.
    pub fn params(&self) -> Option<FitParameters> {
        self.optimizer.as_ref().map(|o| o.current().params)
    }

    pub fn residuals(&self) -> &[ResidualRecord] {
        self.optimizer
            .as_ref()
            .map(|o| o.current().residuals.as_slice())
            .unwrap_or(&[])
    }

    /// `S / dof` at the accepted parameters, NaN before the seed pass.
    pub fn objective(&self) -> f64 {
        self.optimizer.as_ref().map_or(f64::NAN, |o| o.objective())
    }

    pub fn objective_history(&self) -> &[f64] {
        self.optimizer.as_ref().map(|o| o.history()).unwrap_or(&[])
    }

    pub fn iterations(&self) -> usize {
        self.optimizer.as_ref().map_or(0, |o| o.iteration())
    }

    pub fn profile_size(&self) -> Option<f64> {
        self.optimizer.as_ref().map(|o| o.current().profile.profile_size())
    }

    /// Yields handed back to the host so far.
    pub fn yields(&self) -> usize {
        self.pacer.yields()
    }

    /// The accepted theoretical profile at arc length `s`.
    pub fn profile(&mut self, s: f64) -> Result<ProfileState, FitError> {
        self.accepted_profile()?.profile(s)
    }

    /// The accepted profile in image coordinates, left side mirrored.
    ///
    /// `samples` points per side, from the apex out to the profile size.
    pub fn fitted_contour(&mut self, samples: usize) -> Result<Vec<Point>, FitError> {
        let params = self
            .params()
            .ok_or_else(|| FitError::invalid("no accepted parameters yet"))?;
        let profile = self.accepted_profile()?;
        let positions = linspace(0.0, profile.profile_size(), samples.max(2));
        let states = profile.profile_many(&positions)?;

        let to_image = |r: f64, z: f64| -> Point {
            let (dx, dy) = params.xy_from_rz(params.apex_radius * r, params.apex_radius * z);
            [params.apex_x + dx, params.apex_y + dy]
        };
        let left = states.iter().rev().map(|p| to_image(-p.x, p.y));
        let right = states.iter().skip(1).map(|p| to_image(p.x, p.y));
        Ok(left.chain(right).collect())
    }

    fn accepted_profile(&mut self) -> Result<&mut ProfileModel, FitError> {
        self.optimizer
            .as_mut()
            .map(|o| &mut o.current_mut().profile)
            .ok_or_else(|| FitError::invalid("no accepted profile yet"))
    }

    /// Drive the fit to a terminal state.
    pub fn run(&mut self) -> FitState {
        loop {
            if let StepResult::Finished(state) = self.advance() {
                return state;
            }
        }
    }

    /// Do a bounded amount of work. Idempotent once terminal.
    pub fn advance(&mut self) -> StepResult {
        if self.state.is_terminal() {
            return StepResult::Finished(self.state);
        }
        match self.step() {
            Ok(result) => result,
            Err(FitError::Cancelled) => {
                self.log.blank();
                self.log.line("Cancelled.");
                StepResult::Finished(self.finish(FitState::Cancelled))
            }
            Err(err) => {
                log::error!("fit failed: {err}");
                self.log.blank();
                self.log.line(&format!("Error: {err}"));
                self.failure = Some(err);
                StepResult::Finished(self.finish(FitState::Error))
            }
        }
    }

    fn step(&mut self) -> Result<StepResult, FitError> {
        self.pacer.checkpoint()?;

        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Seeding => {
                let estimator = InitialGuessEstimator::new(&self.config, &self.assembler);
                let params = estimator.estimate(&self.contour, &mut self.pacer, &mut self.log)?;
                let profile = ProfileModel::generate(
                    params.bond,
                    self.config.initial_integration_limit,
                    self.config.profile_samples,
                )?;
                self.phase = Phase::Evaluating {
                    pass: EvaluationPass::new(params, profile),
                    proposal: None,
                };
                Ok(StepResult::Yielded)
            }
            Phase::Evaluating { mut pass, proposal } => {
                let complete =
                    match pass.resume(&self.contour, &self.assembler, &mut self.pacer, &mut self.log) {
                        Ok(complete) => complete,
                        Err(err) => return self.reject_or_fail(err, proposal),
                    };
                if !complete {
                    self.phase = Phase::Evaluating { pass, proposal };
                    return Ok(StepResult::Yielded);
                }

                let evaluation = match pass.finish() {
                    Ok(evaluation) => evaluation,
                    Err(err) => return self.reject_or_fail(err, proposal),
                };
                match proposal {
                    Some(proposal) => self.conclude(&proposal, Some(evaluation)),
                    None => {
                        self.start_optimizer(evaluation);
                        self.begin_trial()?;
                        Ok(StepResult::Yielded)
                    }
                }
            }
            Phase::FailedTrial { proposal, reason } => {
                log::debug!("trial rejected: {reason}");
                self.conclude(&proposal, None)
            }
            Phase::Done => Ok(StepResult::Finished(self.state)),
        }
    }

    fn start_optimizer(&mut self, seed: Evaluation) {
        let optimizer = LmfOptimizer::new(seed, self.contour.degrees_of_freedom(), &self.config);
        let params = optimizer.current().params;
        let objective = optimizer.objective();
        self.optimizer = Some(optimizer);

        self.log_header();
        self.log_progress(0, objective, &params);
        self.notify(&FitEvent::Accepted {
            iteration: 0,
            params,
            objective,
        });
    }

    /// A failed trial pass is a rejected step; failing the seed or cancelling ends the fit.
    fn reject_or_fail(
        &mut self,
        err: FitError,
        proposal: Option<Proposal>,
    ) -> Result<StepResult, FitError> {
        match proposal {
            Some(proposal) if err != FitError::Cancelled => {
                log::debug!("trial rejected: {err}");
                self.conclude(&proposal, None)
            }
            _ => Err(err),
        }
    }

    /// Propose the next step and set up its trial pass.
    fn begin_trial(&mut self) -> Result<(), FitError> {
        let optimizer = self
            .optimizer
            .as_ref()
            .ok_or_else(|| FitError::numerical("optimizer not initialised"))?;
        let proposal = optimizer.propose()?;
        let limit = optimizer.current().profile.integration_limit();

        self.phase = match ProfileModel::generate(proposal.params.bond, limit, self.config.profile_samples) {
            Ok(profile) => Phase::Evaluating {
                pass: EvaluationPass::new(proposal.params, profile),
                proposal: Some(proposal),
            },
            Err(reason) => Phase::FailedTrial { proposal, reason },
        };
        Ok(())
    }

    fn conclude(
        &mut self,
        proposal: &Proposal,
        trial: Option<Evaluation>,
    ) -> Result<StepResult, FitError> {
        let optimizer = self
            .optimizer
            .as_mut()
            .ok_or_else(|| FitError::numerical("optimizer not initialised"))?;
        let iteration = optimizer.complete(proposal, trial);

        self.log_progress(iteration.index, iteration.objective, &iteration.params);
        if iteration.accepted {
            self.notify(&FitEvent::Accepted {
                iteration: iteration.index,
                params: iteration.params,
                objective: iteration.objective,
            });
        }

        if !iteration.stop.is_empty() {
            self.stop_reason = iteration.stop;
            self.log.blank();
            self.log.line(&format!("Fitting finished ({})", iteration.stop));
            log::info!(
                "fit converged after {} iterations ({}), objective {:.4e}",
                iteration.index,
                iteration.stop,
                iteration.objective
            );
            self.finish(FitState::Converged);
            return Ok(StepResult::Iterated(iteration));
        }

        self.begin_trial()?;
        Ok(StepResult::Iterated(iteration))
    }

    fn finish(&mut self, state: FitState) -> FitState {
        self.state = state;
        self.phase = Phase::Done;
        self.notify(&FitEvent::Finished(state));
        state
    }

    fn notify(&mut self, event: &FitEvent) {
        for observer in &mut self.observers {
            observer(event);
        }
    }

    fn log_header(&mut self) {
        self.log.line(&format!(
            "{: >4}  {: >10}  {: >10}  {: >10}  {: >11}  {: >10}  {:>11}",
            "Step", "Objective", "x-centre", "z-centre", "Apex radius", "Bond", "Image angle"
        ));
    }

    fn log_progress(&mut self, step: usize, objective: f64, params: &FitParameters) {
        self.log.line(&format!(
            "{: >4} {: >11.4e} {: >11.4} {: >11.4}  {: >11.4} {: >11.4} {: >11.4}°",
            step,
            objective,
            params.apex_x,
            params.apex_y,
            params.apex_radius,
            params.bond,
            params.rotation.to_degrees()
        ));
    }
}

impl std::fmt::Debug for FitSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitSession")
            .field("points", &self.contour.len())
            .field("state", &self.state)
            .field("params", &self.params())
            .field("objective", &self.objective())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;

    fn circle_contour() -> Contour {
        Contour::new(
            (0..120)
                .map(|i| {
                    let t = (-150.0 + 300.0 * i as f64 / 119.0_f64).to_radians();
                    [100.0 + 40.0 * t.sin(), 140.0 - 40.0 * t.cos()]
                })
                .collect(),
        )
        .unwrap()
    }

    fn config() -> FitConfig {
        FitConfig {
            yield_interval: Duration::ZERO,
            ..FitConfig::default()
        }
    }

    #[derive(Clone, Default)]
    struct SharedLog(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn circle_converges_and_logs_progress() {
        let log = SharedLog::default();
        let mut session = FitSession::new(circle_contour(), config())
            .unwrap()
            .with_log(LogSink::new(log.clone()));
        assert_eq!(session.run(), FitState::Converged);
        assert!(!session.stop_reason().is_empty());

        let params = session.params().unwrap();
        assert!((params.apex_radius - 40.0).abs() < 1e-3);
        assert!(params.bond.abs() < 1e-3);

        let text = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("Step"));
        assert!(text.contains("Image angle"));
        assert!(text.contains("Fitting finished ("));
    }

    #[test]
    fn advance_is_idempotent_once_terminal() {
        let mut session = FitSession::new(circle_contour(), config()).unwrap();
        let state = session.run();
        let before = session.params();
        assert_eq!(session.advance(), StepResult::Finished(state));
        assert_eq!(session.advance(), StepResult::Finished(state));
        assert_eq!(session.params(), before);
    }

    #[test]
    fn cancelling_before_the_first_step() {
        let mut session = FitSession::new(circle_contour(), config()).unwrap();
        let finished = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&finished);
        session.subscribe(move |event| {
            if let FitEvent::Finished(state) = event {
                sink.lock().unwrap().push(*state);
            }
        });
        session.cancel();
        assert_eq!(session.run(), FitState::Cancelled);
        assert!(session.params().is_none());
        assert_eq!(*finished.lock().unwrap(), vec![FitState::Cancelled]);
    }

    #[test]
    fn fitted_contour_passes_through_the_apex() {
        let mut session = FitSession::new(circle_contour(), config()).unwrap();
        session.run();
        let overlay = session.fitted_contour(50).unwrap();
        assert_eq!(overlay.len(), 99);
        let apex = overlay[49];
        let params = session.params().unwrap();
        assert!((apex[0] - params.apex_x).abs() < 1e-3);
        assert!((apex[1] - params.apex_y).abs() < 1e-3);
    }
}
