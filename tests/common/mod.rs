#![allow(dead_code)]

use std::time::Duration;

use ylfit::data::SyntheticDrop;
use ylfit::domain::{Contour, FitParameters, Point};
use ylfit::fit::FitConfig;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Config that yields after every checkpoint, to exercise suspension.
pub fn eager_yield_config() -> FitConfig {
    FitConfig {
        yield_interval: Duration::ZERO,
        ..FitConfig::default()
    }
}

/// Points on a circle of `radius` around `(cx, cy)`, apex at the bottom, spanning `±half_angle_deg`.
pub fn circle_arc(cx: f64, cy: f64, radius: f64, half_angle_deg: f64, n: usize) -> Vec<Point> {
    assert!(n >= 2, "need at least two points");
    (0..n)
        .map(|i| {
            let t = (-half_angle_deg + 2.0 * half_angle_deg * i as f64 / (n - 1) as f64).to_radians();
            [cx + radius * t.sin(), cy + radius - radius * t.cos()]
        })
        .collect()
}

pub fn pendant_params() -> FitParameters {
    FitParameters {
        apex_x: 320.0,
        apex_y: 80.0,
        apex_radius: 50.0,
        bond: 0.5,
        rotation: 0.0,
    }
}

/// Noise-free synthetic pendant drop with the given parameters.
pub fn synthetic_contour(params: FitParameters) -> Contour {
    let points = SyntheticDrop {
        params,
        ..SyntheticDrop::default()
    }
    .generate()
    .expect("synthetic drop");
    Contour::new(points).expect("contour")
}
