//! Adaptive Dormand–Prince 5(4) integration reported on a fixed output grid.
//!
//! The drop-shape equations contain `sin φ / x`, which is singular wherever the
//! profile returns to the symmetry axis. Integration therefore stops cleanly
//! at the first state the caller rejects (or when the step size collapses) and
//! reports how far it got, instead of returning garbage past the singularity.

/// Step-size control for [`integrate_grid`].
#[derive(Debug, Clone)]
pub struct OdeOptions {
    pub rtol: f64,
    pub atol: f64,
    /// Smallest step before integration is declared stuck.
    pub min_step: f64,
    /// Total accepted + rejected step budget.
    pub max_steps: usize,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-10,
            atol: 1e-12,
            min_step: 1e-12,
            max_steps: 200_000,
        }
    }
}

/// States at the grid points that were reached.
#[derive(Debug, Clone)]
pub struct GridSolution<const N: usize> {
    /// `states[i]` is the solution at `grid[i]`.
    pub states: Vec<[f64; N]>,
    /// Arc length at which integration halted early, if it did.
    pub halted_at: Option<f64>,
}

impl<const N: usize> GridSolution<N> {
    pub fn is_complete(&self) -> bool {
        self.halted_at.is_none()
    }
}

// Dormand–Prince tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Difference between the 5th and embedded 4th order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

fn combine<const N: usize>(y: &[f64; N], h: f64, terms: &[(f64, &[f64; N])]) -> [f64; N] {
    let mut out = *y;
    for (i, o) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (w, k) in terms {
            acc += w * k[i];
        }
        *o += h * acc;
    }
    out
}

/// Integrate `dy/ds = rhs(s, y)` from `grid[0]` and report the state at every grid point.
///
/// `valid` is checked after every accepted step; the first rejected state halts
/// integration and `halted_at` records where.
pub fn integrate_grid<const N: usize, F, V>(
    rhs: F,
    y0: [f64; N],
    grid: &[f64],
    opts: &OdeOptions,
    valid: V,
) -> GridSolution<N>
where
    F: Fn(f64, &[f64; N]) -> [f64; N],
    V: Fn(&[f64; N]) -> bool,
{
    let mut states = Vec::with_capacity(grid.len());
    let Some(&s_start) = grid.first() else {
        return GridSolution {
            states,
            halted_at: None,
        };
    };
    states.push(y0);

    let mut s = s_start;
    let mut y = y0;
    let mut h = match grid.get(1) {
        Some(&next) => (next - s_start).abs().max(opts.min_step),
        None => 0.0,
    };
    let mut steps = 0usize;

    for &target in &grid[1..] {
        while s < target {
            if steps >= opts.max_steps {
                log::debug!("ode: step budget exhausted at s = {s:.6}");
                return GridSolution {
                    states,
                    halted_at: Some(s),
                };
            }
            steps += 1;

            let remaining = target - s;
            let clipped = h >= remaining;
            let h_try = if clipped { remaining } else { h };

            let k1 = rhs(s, &y);
            let k2 = rhs(s + C2 * h_try, &combine(&y, h_try, &[(A21, &k1)]));
            let k3 = rhs(s + C3 * h_try, &combine(&y, h_try, &[(A31, &k1), (A32, &k2)]));
            let k4 = rhs(
                s + C4 * h_try,
                &combine(&y, h_try, &[(A41, &k1), (A42, &k2), (A43, &k3)]),
            );
            let k5 = rhs(
                s + C5 * h_try,
                &combine(&y, h_try, &[(A51, &k1), (A52, &k2), (A53, &k3), (A54, &k4)]),
            );
            let k6 = rhs(
                s + h_try,
                &combine(
                    &y,
                    h_try,
                    &[(A61, &k1), (A62, &k2), (A63, &k3), (A64, &k4), (A65, &k5)],
                ),
            );
            let y_next = combine(
                &y,
                h_try,
                &[(B1, &k1), (B3, &k3), (B4, &k4), (B5, &k5), (B6, &k6)],
            );
            let k7 = rhs(s + h_try, &y_next);

            let mut err = 0.0_f64;
            for i in 0..N {
                let e = h_try
                    * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
                let scale = opts.atol + opts.rtol * y[i].abs().max(y_next[i].abs());
                err = err.max((e / scale).abs());
            }

            if !err.is_finite() {
                h = h_try * 0.2;
                if h < opts.min_step {
                    return GridSolution {
                        states,
                        halted_at: Some(s),
                    };
                }
                continue;
            }

            let factor = if err == 0.0 {
                5.0
            } else {
                (0.9 * err.powf(-0.2)).clamp(0.2, 5.0)
            };

            if err <= 1.0 {
                if !(y_next.iter().all(|v| v.is_finite()) && valid(&y_next)) {
                    return GridSolution {
                        states,
                        halted_at: Some(s + h_try),
                    };
                }
                s = if clipped { target } else { s + h_try };
                y = y_next;
                let h_new = h_try * factor;
                h = if clipped { h.max(h_new) } else { h_new };
            } else {
                h = h_try * factor;
                if h < opts.min_step {
                    return GridSolution {
                        states,
                        halted_at: Some(s),
                    };
                }
            }
        }
        states.push(y);
    }

    GridSolution {
        states,
        halted_at: None,
    }
}

/// `n` evenly spaced points over `[start, end]`, endpoints included.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n as f64 - 1.0);
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}
