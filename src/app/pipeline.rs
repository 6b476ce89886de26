//! Shared "fit pipeline" logic used by the `fit` and `demo` commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! orient contour -> fit session -> derived properties -> overlay -> report
//!
//! Several contours are fitted in parallel with rayon. Each session is
//! independent; the derived-property calculator is shared so its memo cache
//! serves the whole batch.

use std::io::Write;
use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use crate::derived::DerivedPropertiesCalculator;
use crate::domain::{Contour, DropKind, FitState, PhysicalConstants, Point, ResidualRecord};
use crate::fit::{FitConfig, FitSession, LogSink};
use crate::io::contour::{flips_y, orient};
use crate::report::FitReport;

/// Samples per side of the fitted overlay.
const OVERLAY_SAMPLES: usize = 200;

/// One contour to fit, in its input frame.
#[derive(Debug, Clone)]
pub struct FitJob {
    pub source: String,
    pub points: Vec<Point>,
    pub drop_kind: DropKind,
    /// Input `y` points down (image convention).
    pub y_down: bool,
}

/// Shared run settings.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub config: FitConfig,
    pub constants: PhysicalConstants,
    pub top_n: usize,
}

/// All computed outputs of a single fit.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub report: FitReport,
    pub residuals: Vec<ResidualRecord>,
    /// Fitted profile in the input frame; empty if the fit never got a seed.
    pub fitted: Vec<Point>,
    /// The session's progress log.
    pub log: String,
}

impl FitOutcome {
    pub fn converged(&self) -> bool {
        self.report.state == FitState::Converged
    }
}

/// In-memory log target, readable after the session is done.
#[derive(Debug, Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        self.0
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self
            .0
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Fit a batch of contours in parallel. Output order matches `jobs`.
pub fn run_batch(
    jobs: &[FitJob],
    settings: &RunSettings,
    calculator: &DerivedPropertiesCalculator,
) -> Vec<FitOutcome> {
    jobs.par_iter()
        .map(|job| run_fit(job, settings, calculator))
        .collect()
}

/// Fit a single contour and collect everything the report layer needs.
pub fn run_fit(job: &FitJob, settings: &RunSettings, calculator: &DerivedPropertiesCalculator) -> FitOutcome {
    let flipped = flips_y(job.y_down, job.drop_kind);
    let contour = match Contour::new(orient(&job.points, job.y_down, job.drop_kind)) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("{}: {e}", job.source);
            return FitOutcome {
                report: FitReport::failed(&job.source, job.drop_kind, e.to_string()),
                residuals: Vec::new(),
                fitted: Vec::new(),
                log: String::new(),
            };
        }
    };

    let captured = CapturedLog::default();
    let mut session = match FitSession::new(contour, settings.config.clone()) {
        Ok(s) => s.with_log(LogSink::new(captured.clone())),
        Err(e) => {
            return FitOutcome {
                report: FitReport::failed(&job.source, job.drop_kind, e.to_string()),
                residuals: Vec::new(),
                fitted: Vec::new(),
                log: String::new(),
            };
        }
    };

    log::info!("{}: fitting {} points", job.source, session.contour().len());
    let state = session.run();

    let derived = match (state, session.params(), session.profile_size()) {
        (FitState::Converged, Some(params), Some(size)) => {
            match calculator.compute(&params, size, &settings.constants) {
                Ok(d) => Some(d),
                Err(e) => {
                    log::warn!("{}: derived properties unavailable: {e}", job.source);
                    None
                }
            }
        }
        _ => None,
    };

    let sign = if flipped { -1.0 } else { 1.0 };
    let fitted = session
        .fitted_contour(OVERLAY_SAMPLES)
        .map(|pts| pts.into_iter().map(|p| [p[0], sign * p[1]]).collect())
        .unwrap_or_default();

    let report = FitReport::from_session(
        &job.source,
        &session,
        job.drop_kind,
        flipped,
        derived,
        settings.top_n,
    );

    FitOutcome {
        report,
        residuals: session.residuals().to_vec(),
        fitted,
        log: captured.contents(),
    }
}
