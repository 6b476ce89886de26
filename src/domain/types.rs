//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between the fitting engine and its host
//! - printed as a JSON summary by the CLI
//! - snapshotted by observers while a fit is still running

use clap::ValueEnum;
use nalgebra::Vector5;
use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// A 2D point `[x, y]` in pixels.
pub type Point = [f64; 2];

/// Number of fitted parameters.
pub const PARAMETER_DIMENSIONS: usize = 5;

/// Which way the drop hangs relative to gravity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DropKind {
    /// Hanging from a needle; apex at the bottom.
    Pendant,
    /// Resting on a substrate; apex at the top.
    Sessile,
}

impl DropKind {
    pub fn display_name(self) -> &'static str {
        match self {
            DropKind::Pendant => "pendant",
            DropKind::Sessile => "sessile",
        }
    }
}

/// Ordered drop outline, sorted by ascending `y`, with `y` pointing against gravity.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    points: Vec<Point>,
}

impl Contour {
    /// Validate and sort a raw contour.
    ///
    /// A fit has five free parameters, so at least five points are required.
    pub fn new(mut points: Vec<Point>) -> Result<Self, FitError> {
        if points.len() < PARAMETER_DIMENSIONS {
            return Err(FitError::invalid(format!(
                "contour has {} points, need at least {PARAMETER_DIMENSIONS}",
                points.len()
            )));
        }
        if let Some(bad) = points.iter().position(|p| !(p[0].is_finite() && p[1].is_finite())) {
            return Err(FitError::invalid(format!("contour point {bad} is not finite")));
        }
        points.sort_by(|a, b| a[1].total_cmp(&b[1]));
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `num_points - 5 + 1`, the divisor of the reported objective.
    pub fn degrees_of_freedom(&self) -> usize {
        self.points.len() + 1 - PARAMETER_DIMENSIONS
    }
}

/// `[apex_x, apex_y, apex_radius, bond_number, image_rotation]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParameters {
    pub apex_x: f64,
    pub apex_y: f64,
    /// Apex radius of curvature in pixels.
    pub apex_radius: f64,
    pub bond: f64,
    /// Image rotation in radians.
    pub rotation: f64,
}

impl FitParameters {
    pub fn to_vector(&self) -> Vector5<f64> {
        Vector5::new(
            self.apex_x,
            self.apex_y,
            self.apex_radius,
            self.bond,
            self.rotation,
        )
    }

    pub fn from_vector(v: &Vector5<f64>) -> Self {
        Self {
            apex_x: v[0],
            apex_y: v[1],
            apex_radius: v[2],
            bond: v[3],
            rotation: v[4],
        }
    }

    /// Finite everywhere with a positive apex radius.
    pub fn is_well_formed(&self) -> bool {
        self.to_vector().iter().all(|v| v.is_finite()) && self.apex_radius > 0.0
    }

    /// Map an image-frame offset from the apex into the rotated `(r, z)` frame.
    pub fn rz_from_xy(&self, dx: f64, dy: f64) -> (f64, f64) {
        let (sin, cos) = self.rotation.sin_cos();
        (cos * dx - sin * dy, sin * dx + cos * dy)
    }

    /// Inverse of [`FitParameters::rz_from_xy`].
    pub fn xy_from_rz(&self, r: f64, z: f64) -> (f64, f64) {
        let (sin, cos) = self.rotation.sin_cos();
        (cos * r + sin * z, -sin * r + cos * z)
    }
}

/// Per contour point: where it matched on the profile and how far off it is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualRecord {
    /// Dimensionless arc length of the matched profile point, negative on the
    /// left-hand side of the apex.
    pub arc_length: f64,
    /// Distance to the profile in pixels, positive outside the drop. The sign
    /// follows the profile's outward normal, not the side of the axis.
    pub residual: f64,
}

/// Lifecycle of a fit. Terminal once it leaves `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitState {
    Running,
    Converged,
    Cancelled,
    Error,
}

impl FitState {
    pub fn is_terminal(self) -> bool {
        self != FitState::Running
    }

    pub fn display_name(self) -> &'static str {
        match self {
            FitState::Running => "running",
            FitState::Converged => "converged",
            FitState::Cancelled => "cancelled",
            FitState::Error => "error",
        }
    }
}

/// Bitmask of the stop conditions that fired on the final iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StopReason(u8);

impl StopReason {
    pub const CONVERGENCE_IN_PARAMETERS: StopReason = StopReason(1);
    pub const CONVERGENCE_IN_GRADIENT: StopReason = StopReason(2);
    pub const CONVERGENCE_IN_OBJECTIVE: StopReason = StopReason(4);
    pub const MAXIMUM_STEPS_EXCEEDED: StopReason = StopReason(8);

    const NAMED: [(StopReason, &'static str); 4] = [
        (Self::CONVERGENCE_IN_PARAMETERS, "CONVERGENCE_IN_PARAMETERS"),
        (Self::CONVERGENCE_IN_GRADIENT, "CONVERGENCE_IN_GRADIENT"),
        (Self::CONVERGENCE_IN_OBJECTIVE, "CONVERGENCE_IN_OBJECTIVE"),
        (Self::MAXIMUM_STEPS_EXCEEDED, "MAXIMUM_STEPS_EXCEEDED"),
    ];

    pub fn empty() -> Self {
        StopReason(0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: StopReason) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for StopReason {
    type Output = StopReason;

    fn bitor(self, rhs: StopReason) -> StopReason {
        StopReason(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for StopReason {
    fn bitor_assign(&mut self, rhs: StopReason) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join(" | "))
    }
}

/// Physical inputs needed to turn a shape fit into material properties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalConstants {
    /// Needle outer diameter (mm).
    pub needle_width_mm: f64,
    /// Density of the drop phase (kg/m³).
    pub drop_density: f64,
    /// Density of the surrounding phase (kg/m³).
    pub continuous_density: f64,
    /// Gravitational acceleration (m/s²).
    pub gravity: f64,
    /// Millimetres per pixel.
    pub pixel_scale_mm: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self {
            needle_width_mm: 1.0,
            drop_density: 1000.0,
            continuous_density: 1.2,
            gravity: 9.80035,
            pixel_scale_mm: 0.01,
        }
    }
}

impl PhysicalConstants {
    pub fn validate(&self) -> Result<(), FitError> {
        let positive = [
            ("needle width", self.needle_width_mm),
            ("gravity", self.gravity),
            ("pixel scale", self.pixel_scale_mm),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(FitError::invalid(format!("{name} must be finite and > 0, got {value}")));
            }
        }
        if !(self.drop_density.is_finite() && self.continuous_density.is_finite()) {
            return Err(FitError::invalid("densities must be finite"));
        }
        Ok(())
    }

    pub fn delta_density(&self) -> f64 {
        (self.drop_density - self.continuous_density).abs()
    }

    /// A drop lighter than its surroundings rests on a substrate.
    pub fn drop_kind(&self) -> DropKind {
        if self.drop_density < self.continuous_density {
            DropKind::Sessile
        } else {
            DropKind::Pendant
        }
    }
}

/// Quantities derived from a converged fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedProperties {
    /// Interfacial tension (mN/m).
    pub ift: f64,
    /// Drop volume (mm³).
    pub volume: f64,
    /// Drop surface area (mm²).
    pub surface_area: f64,
    pub worthington: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contour_is_sorted_by_height() {
        let c = Contour::new(vec![[0.0, 3.0], [1.0, 1.0], [2.0, 2.0], [3.0, 0.0], [4.0, 5.0]]).unwrap();
        let ys: Vec<f64> = c.points().iter().map(|p| p[1]).collect();
        assert_eq!(ys, vec![0.0, 1.0, 2.0, 3.0, 5.0]);
        assert_eq!(c.degrees_of_freedom(), 1);
    }

    #[test]
    fn contour_rejects_short_or_non_finite_input() {
        assert!(Contour::new(vec![[0.0, 0.0]; 4]).is_err());
        let mut pts = vec![[0.0, 0.0]; 6];
        pts[2] = [f64::NAN, 1.0];
        assert!(Contour::new(pts).is_err());
    }

    #[test]
    fn rotation_round_trips() {
        let p = FitParameters {
            apex_x: 0.0,
            apex_y: 0.0,
            apex_radius: 1.0,
            bond: 0.3,
            rotation: 0.2,
        };
        let (r, z) = p.rz_from_xy(3.0, -1.5);
        let (x, y) = p.xy_from_rz(r, z);
        assert!((x - 3.0).abs() < 1e-12 && (y + 1.5).abs() < 1e-12);
    }

    #[test]
    fn stop_reason_lists_flag_names() {
        let flags = StopReason::CONVERGENCE_IN_GRADIENT | StopReason::MAXIMUM_STEPS_EXCEEDED;
        assert_eq!(flags.to_string(), "CONVERGENCE_IN_GRADIENT | MAXIMUM_STEPS_EXCEEDED");
        assert!(flags.contains(StopReason::MAXIMUM_STEPS_EXCEEDED));
        assert!(!flags.contains(StopReason::CONVERGENCE_IN_OBJECTIVE));
        assert!(StopReason::empty().is_empty());
    }

    #[test]
    fn physical_constants_are_validated() {
        assert!(PhysicalConstants::default().validate().is_ok());
        let bad = PhysicalConstants {
            needle_width_mm: 0.0,
            ..PhysicalConstants::default()
        };
        assert!(bad.validate().is_err());
    }
}
