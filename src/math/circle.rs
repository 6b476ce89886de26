//! Algebraic least-squares circle fit.
//!
//! Writes the circle as `x² + y² + D x + E y + F = 0`, which is linear in
//! `(D, E, F)`, and solves the overdetermined system with [`solve_least_squares`].
//! Coordinates are centred on their mean first to keep the design well scaled
//! for contours far from the image origin.

use nalgebra::{DMatrix, DVector};

use crate::math::solve_least_squares;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub cx: f64,
    pub cy: f64,
    pub radius: f64,
}

/// Fit a circle to `points`. Needs at least three non-collinear points.
pub fn fit_circle(points: &[[f64; 2]]) -> Option<Circle> {
    let n = points.len();
    if n < 3 {
        return None;
    }

    let mx = points.iter().map(|p| p[0]).sum::<f64>() / n as f64;
    let my = points.iter().map(|p| p[1]).sum::<f64>() / n as f64;

    let mut design = DMatrix::<f64>::zeros(n, 3);
    let mut rhs = DVector::<f64>::zeros(n);
    for (i, p) in points.iter().enumerate() {
        let (x, y) = (p[0] - mx, p[1] - my);
        design[(i, 0)] = x;
        design[(i, 1)] = y;
        design[(i, 2)] = 1.0;
        rhs[i] = -(x * x + y * y);
    }

    let coeffs = solve_least_squares(&design, &rhs)?;
    let (d, e, f) = (coeffs[0], coeffs[1], coeffs[2]);
    let r2 = 0.25 * (d * d + e * e) - f;
    if !(r2 > 0.0 && r2.is_finite()) {
        return None;
    }

    Some(Circle {
        cx: mx - 0.5 * d,
        cy: my - 0.5 * e,
        radius: r2.sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_circle_from_partial_arc() {
        let (cx, cy, r) = (310.0, -42.5, 37.0);
        let points: Vec<[f64; 2]> = (0..40)
            .map(|i| {
                let t = -1.2 + 2.4 * i as f64 / 39.0;
                [cx + r * t.sin(), cy - r * t.cos()]
            })
            .collect();
        let c = fit_circle(&points).unwrap();
        assert!((c.cx - cx).abs() < 1e-8);
        assert!((c.cy - cy).abs() < 1e-8);
        assert!((c.radius - r).abs() < 1e-8);
    }

    #[test]
    fn rejects_too_few_points() {
        assert!(fit_circle(&[[0.0, 0.0], [1.0, 1.0]]).is_none());
    }
}
