//! Reporting utilities: fit summaries, residual statistics and extremes.
//!
//! A [`FitReport`] is a plain, serializable snapshot of a finished session in
//! the caller's coordinate frame (any orientation flip undone), so it can be
//! printed or dumped as JSON without touching the engine again.

pub mod format;

pub use format::*;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::domain::{DerivedProperties, DropKind, FitParameters, FitState, ResidualRecord};
use crate::fit::FitSession;

/// Summary statistics of the signed residuals (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResidualStats {
    pub count: usize,
    pub rms: f64,
    pub max_abs: f64,
    pub mean: f64,
}

impl ResidualStats {
    pub fn from_records(records: &[ResidualRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let n = records.len() as f64;
        let sum: f64 = records.iter().map(|r| r.residual).sum();
        let sum_sq: f64 = records.iter().map(|r| r.residual * r.residual).sum();
        let max_abs = records.iter().map(|r| r.residual.abs()).fold(0.0_f64, f64::max);
        Some(Self {
            count: records.len(),
            rms: (sum_sq / n).sqrt(),
            max_abs,
            mean: sum / n,
        })
    }
}

/// Largest residuals on each side of the fitted profile (top-N each side).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResidualExtremes {
    /// Positive residuals, largest first.
    pub outside: Vec<ResidualRecord>,
    /// Negative residuals, most negative first.
    pub inside: Vec<ResidualRecord>,
}

pub fn residual_extremes(records: &[ResidualRecord], top_n: usize) -> ResidualExtremes {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| b.residual.total_cmp(&a.residual));

    let outside = sorted
        .iter()
        .filter(|r| r.residual > 0.0)
        .take(top_n)
        .copied()
        .collect();
    let inside = sorted
        .iter()
        .rev()
        .filter(|r| r.residual < 0.0)
        .take(top_n)
        .copied()
        .collect();

    ResidualExtremes { outside, inside }
}

/// Everything worth printing about one finished fit.
#[derive(Debug, Clone, Serialize)]
pub struct FitReport {
    pub source: String,
    pub generated_at: DateTime<Local>,
    pub drop_kind: DropKind,
    pub state: FitState,
    /// Stop flags, e.g. `CONVERGENCE_IN_PARAMETERS | CONVERGENCE_IN_GRADIENT`.
    pub stop_reason: String,
    pub iterations: usize,
    pub objective: Option<f64>,
    /// Parameters in the input frame; rotation in degrees.
    pub params: Option<ReportedParameters>,
    pub profile_size: Option<f64>,
    pub residuals: Option<ResidualStats>,
    #[serde(skip)]
    pub extremes: ResidualExtremes,
    pub derived: Option<DerivedProperties>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReportedParameters {
    pub apex_x: f64,
    pub apex_y: f64,
    pub apex_radius: f64,
    pub bond: f64,
    pub rotation_deg: f64,
}

impl ReportedParameters {
    /// Undo the `y` flip applied when orienting the contour.
    pub fn from_fit(params: &FitParameters, y_flipped: bool) -> Self {
        let sign = if y_flipped { -1.0 } else { 1.0 };
        Self {
            apex_x: params.apex_x,
            apex_y: sign * params.apex_y,
            apex_radius: params.apex_radius,
            bond: params.bond,
            rotation_deg: sign * params.rotation.to_degrees(),
        }
    }
}

impl FitReport {
    pub fn from_session(
        source: impl Into<String>,
        session: &FitSession,
        drop_kind: DropKind,
        y_flipped: bool,
        derived: Option<DerivedProperties>,
        top_n: usize,
    ) -> Self {
        let records = session.residuals();
        let objective = session.objective();
        Self {
            source: source.into(),
            generated_at: Local::now(),
            drop_kind,
            state: session.state(),
            stop_reason: session.stop_reason().to_string(),
            iterations: session.iterations(),
            objective: objective.is_finite().then_some(objective),
            params: session
                .params()
                .map(|p| ReportedParameters::from_fit(&p, y_flipped)),
            profile_size: session.profile_size(),
            residuals: ResidualStats::from_records(records),
            extremes: residual_extremes(records, top_n),
            derived,
            error: session.failure().map(|e| e.to_string()),
        }
    }

    /// A report for an input that never reached the engine.
    pub fn failed(source: impl Into<String>, drop_kind: DropKind, error: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            generated_at: Local::now(),
            drop_kind,
            state: FitState::Error,
            stop_reason: String::new(),
            iterations: 0,
            objective: None,
            params: None,
            profile_size: None,
            residuals: None,
            extremes: ResidualExtremes::default(),
            derived: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(arc_length: f64, residual: f64) -> ResidualRecord {
        ResidualRecord { arc_length, residual }
    }

    #[test]
    fn stats_of_signed_residuals() {
        let stats = ResidualStats::from_records(&[rec(0.0, 3.0), rec(0.1, -4.0)]).unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.rms - 12.5_f64.sqrt()).abs() < 1e-12);
        assert_eq!(stats.max_abs, 4.0);
        assert_eq!(stats.mean, -0.5);
        assert!(ResidualStats::from_records(&[]).is_none());
    }

    #[test]
    fn extremes_split_by_sign() {
        let records = [rec(0.0, 0.5), rec(0.1, -2.0), rec(0.2, 1.5), rec(-0.3, -0.1), rec(0.4, 0.0)];
        let ext = residual_extremes(&records, 1);
        assert_eq!(ext.outside, vec![rec(0.2, 1.5)]);
        assert_eq!(ext.inside, vec![rec(0.1, -2.0)]);
    }

    #[test]
    fn flipped_parameters_are_reported_in_the_input_frame() {
        let p = FitParameters {
            apex_x: 10.0,
            apex_y: -200.0,
            apex_radius: 40.0,
            bond: 0.3,
            rotation: 0.01,
        };
        let r = ReportedParameters::from_fit(&p, true);
        assert_eq!(r.apex_y, 200.0);
        assert!((r.rotation_deg + 0.01_f64.to_degrees()).abs() < 1e-12);
        assert_eq!(ReportedParameters::from_fit(&p, false).apex_y, -200.0);
    }
}
