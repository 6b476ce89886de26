//! Linear least squares solver.
//!
//! The circle fit used to seed a drop-shape fit is an overdetermined linear
//! system (one row per contour point, three unknowns). We solve it with SVD so
//! that tall, nearly collinear designs (a short arc of contour) still return a
//! usable answer instead of panicking.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Short contour arcs make the columns nearly dependent; accept progressively
    // looser singular value cut-offs before giving up.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}
