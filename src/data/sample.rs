//! Synthetic drop contours from the Young-Laplace profile.
//!
//! Used by `ylfit demo` and by the tests: integrate a profile for a known Bond
//! number, scale and rotate it into image coordinates, then add Gaussian pixel
//! noise. The noise stream is seeded from the drop description, so the same
//! request always yields the same contour.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{FitParameters, Point};
use crate::error::AppError;
use crate::math::linspace;
use crate::models::ProfileModel;

/// Integration samples used for synthetic profiles.
const SAMPLE_RESOLUTION: usize = 5000;

#[derive(Debug, Clone)]
pub struct SyntheticDrop {
    /// True parameters, with `y` pointing against gravity.
    pub params: FitParameters,
    /// Largest dimensionless arc length to sample on each side.
    pub max_arc_length: f64,
    pub points_per_side: usize,
    /// Standard deviation of the pixel noise.
    pub noise_px: f64,
    pub seed: u64,
}

impl Default for SyntheticDrop {
    fn default() -> Self {
        Self {
            params: FitParameters {
                apex_x: 320.0,
                apex_y: 80.0,
                apex_radius: 50.0,
                bond: 0.5,
                rotation: 0.0,
            },
            max_arc_length: 2.5,
            points_per_side: 150,
            noise_px: 0.0,
            seed: 7,
        }
    }
}

impl SyntheticDrop {
    /// Generate the contour: left side, apex, right side.
    pub fn generate(&self) -> Result<Vec<Point>, AppError> {
        if self.points_per_side < 3 {
            return Err(AppError::new(2, "Synthetic drop needs at least 3 points per side."));
        }
        if !(self.max_arc_length > 0.0 && self.max_arc_length.is_finite()) {
            return Err(AppError::new(2, "Synthetic arc length must be finite and > 0."));
        }
        if !(self.noise_px >= 0.0 && self.noise_px.is_finite()) {
            return Err(AppError::new(2, "Synthetic noise must be finite and >= 0."));
        }
        if !self.params.is_well_formed() {
            return Err(AppError::new(2, "Synthetic drop parameters are not usable."));
        }

        let p = &self.params;
        let mut profile = ProfileModel::generate(p.bond, self.max_arc_length.max(1.0), SAMPLE_RESOLUTION)?;
        if profile.is_truncated() && profile.valid_limit() < self.max_arc_length {
            return Err(AppError::new(
                2,
                format!(
                    "Profile for Bond {} closes at s = {:.3}, below the requested {:.3}.",
                    p.bond,
                    profile.valid_limit(),
                    self.max_arc_length
                ),
            ));
        }

        let positions = linspace(0.0, self.max_arc_length, self.points_per_side);
        let states = profile.profile_many(&positions)?;

        let mut rng = StdRng::seed_from_u64(sample_seed(self));
        let normal = Normal::new(0.0, self.noise_px.max(f64::MIN_POSITIVE))
            .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
        let mut noise = || {
            if self.noise_px > 0.0 {
                normal.sample(&mut rng)
            } else {
                0.0
            }
        };

        let mut points = Vec::with_capacity(2 * self.points_per_side - 1);
        let left = states.iter().rev().map(|s| (-s.x, s.y));
        let right = states.iter().skip(1).map(|s| (s.x, s.y));
        for (r, z) in left.chain(right) {
            let (dx, dy) = p.xy_from_rz(p.apex_radius * r, p.apex_radius * z);
            points.push([p.apex_x + dx + noise(), p.apex_y + dy + noise()]);
        }
        Ok(points)
    }
}

fn sample_seed(drop: &SyntheticDrop) -> u64 {
    let mut hasher = DefaultHasher::new();
    drop.seed.hash(&mut hasher);
    for v in drop.params.to_vector().iter() {
        v.to_bits().hash(&mut hasher);
    }
    drop.noise_px.to_bits().hash(&mut hasher);
    drop.points_per_side.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noiseless_contour_is_symmetric_about_the_apex() {
        let drop = SyntheticDrop::default();
        let pts = drop.generate().unwrap();
        assert_eq!(pts.len(), 2 * drop.points_per_side - 1);

        let apex = pts[drop.points_per_side - 1];
        assert!((apex[0] - 320.0).abs() < 1e-3);
        assert!((apex[1] - 80.0).abs() < 1e-9);
        let (first, last) = (pts[0], pts[pts.len() - 1]);
        assert!((first[0] + last[0] - 640.0).abs() < 1e-9);
        assert_eq!(first[1], last[1]);
    }

    #[test]
    fn noise_is_reproducible() {
        let drop = SyntheticDrop {
            noise_px: 0.5,
            ..SyntheticDrop::default()
        };
        assert_eq!(drop.generate().unwrap(), drop.generate().unwrap());
        let other = SyntheticDrop { seed: 8, ..drop.clone() };
        assert_ne!(drop.generate().unwrap(), other.generate().unwrap());
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let drop = SyntheticDrop {
            points_per_side: 1,
            ..SyntheticDrop::default()
        };
        assert_eq!(drop.generate().unwrap_err().exit_code(), 2);
    }
}
