//! Physical properties derived from fitted parameters.
//!
//! The dimensionless volume and surface area of a profile depend only on the
//! Bond number and how far along the profile the drop extends. They are
//! integrated once per `(profile_size, bond)` pair and memoized, so repeated
//! queries for the same fit (or a batch of fits run in parallel) reuse them.
//!
//! Units: interfacial tension in mN/m, volume in mm³, area in mm².

use std::collections::{HashMap, VecDeque};
use std::f64::consts::PI;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::{DerivedProperties, FitParameters, PhysicalConstants};
use crate::error::FitError;
use crate::math::{OdeOptions, integrate_grid};
use crate::models::young_laplace::{VOLUME_AREA_INITIAL, off_axis, volume_area_rhs};

/// Memoized coefficient pairs kept before the oldest is evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Dimensionless volume (`b³`) and surface area (`b²`) of a profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeCoefficients {
    pub volume: f64,
    pub area: f64,
}

type CacheKey = (u64, u64);

#[derive(Debug, Default)]
struct Memo {
    entries: HashMap<CacheKey, ShapeCoefficients>,
    order: VecDeque<CacheKey>,
}

/// Thread-safe calculator, shareable across fits.
#[derive(Debug)]
pub struct DerivedPropertiesCalculator {
    memo: RwLock<Memo>,
    capacity: usize,
    integrations: AtomicUsize,
}

impl Default for DerivedPropertiesCalculator {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl DerivedPropertiesCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            memo: RwLock::new(Memo::default()),
            capacity: capacity.max(1),
            integrations: AtomicUsize::new(0),
        }
    }

    /// How many volume/area integrations have run (cache misses).
    pub fn integration_count(&self) -> usize {
        self.integrations.load(Ordering::Relaxed)
    }

    pub fn compute(
        &self,
        params: &FitParameters,
        profile_size: f64,
        constants: &PhysicalConstants,
    ) -> Result<DerivedProperties, FitError> {
        constants.validate()?;
        if !(params.bond.is_finite() && params.bond != 0.0) {
            return Err(FitError::numerical(format!(
                "interfacial tension is undefined for Bond number {}",
                params.bond
            )));
        }
        if !params.is_well_formed() {
            return Err(FitError::invalid(format!("fit parameters are not usable: {params:?}")));
        }

        let coefficients = self.coefficients(params.bond, profile_size)?;

        let radius_mm = params.apex_radius * constants.pixel_scale_mm;
        let radius_m = radius_mm * 1e-3;
        let delta_rho_g = constants.delta_density() * constants.gravity;

        let ift = delta_rho_g * radius_m * radius_m / params.bond * 1e3;
        let volume = coefficients.volume * radius_mm.powi(3);
        let surface_area = coefficients.area * radius_mm * radius_mm;
        let worthington =
            delta_rho_g * volume * 1e-9 / (PI * ift * 1e-3 * constants.needle_width_mm * 1e-3);

        Ok(DerivedProperties {
            ift,
            volume,
            surface_area,
            worthington,
        })
    }

    /// Memoized dimensionless volume and area for a profile of length `profile_size`.
    pub fn coefficients(&self, bond: f64, profile_size: f64) -> Result<ShapeCoefficients, FitError> {
        if !(profile_size >= 0.0 && profile_size.is_finite()) {
            return Err(FitError::Domain { s: profile_size });
        }
        let key = (profile_size.to_bits(), bond.to_bits());

        if let Ok(memo) = self.memo.read() {
            if let Some(hit) = memo.entries.get(&key) {
                return Ok(*hit);
            }
        }

        let computed = integrate_volume_area(bond, profile_size)?;
        self.integrations.fetch_add(1, Ordering::Relaxed);

        let mut memo = self
            .memo
            .write()
            .map_err(|_| FitError::numerical("derived-property cache lock poisoned"))?;
        if let Some(existing) = memo.entries.get(&key) {
            return Ok(*existing);
        }
        if memo.entries.len() >= self.capacity {
            if let Some(oldest) = memo.order.pop_front() {
                memo.entries.remove(&oldest);
            }
        }
        memo.entries.insert(key, computed);
        memo.order.push_back(key);
        Ok(computed)
    }
}

fn integrate_volume_area(bond: f64, profile_size: f64) -> Result<ShapeCoefficients, FitError> {
    if profile_size == 0.0 {
        return Ok(ShapeCoefficients { volume: 0.0, area: 0.0 });
    }
    let rhs = |_: f64, y: &[f64; 5]| volume_area_rhs(bond, y);
    let solution = integrate_grid(
        rhs,
        VOLUME_AREA_INITIAL,
        &[0.0, profile_size],
        &OdeOptions::default(),
        off_axis,
    );
    if let Some(s) = solution.halted_at {
        return Err(FitError::numerical(format!(
            "profile for bond {bond} closes at s = {s:.4}, before the profile size {profile_size:.4}"
        )));
    }
    let last = solution
        .states
        .last()
        .ok_or_else(|| FitError::numerical("volume integration produced no state"))?;
    let (volume, area) = (last[3], last[4]);
    if !(volume.is_finite() && area.is_finite()) {
        return Err(FitError::numerical(format!(
            "non-finite volume/area for bond {bond}"
        )));
    }
    Ok(ShapeCoefficients { volume, area })
}
