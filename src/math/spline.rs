//! Cubic spline over a uniform grid with prescribed end slopes.
//!
//! Every component of an `N`-vector is interpolated independently. The end
//! conditions are first-derivative ("clamped") conditions supplied by the caller,
//! which for an ODE solution are simply the right-hand side evaluated at the
//! two end states.
//!
//! Queries that land exactly on a knot return the stored knot value untouched,
//! so the interpolant reproduces the sampled solution bit-for-bit there.

#[derive(Debug, Clone)]
pub struct ClampedSpline<const N: usize> {
    start: f64,
    step: f64,
    values: Vec<[f64; N]>,
    second: Vec<[f64; N]>,
}

impl<const N: usize> ClampedSpline<N> {
    /// Build the spline through `values` sampled at `start + i * step`.
    ///
    /// Returns `None` for fewer than two samples or a non-positive step.
    pub fn new(
        start: f64,
        step: f64,
        values: Vec<[f64; N]>,
        start_slope: [f64; N],
        end_slope: [f64; N],
    ) -> Option<Self> {
        let m = values.len();
        if m < 2 || !(step > 0.0 && step.is_finite()) {
            return None;
        }
        let n = m - 1;
        let h = step;

        // Tridiagonal system for the knot second derivatives. The matrix is the
        // same for every component, so its forward sweep is shared.
        let mut sub = vec![1.0; m];
        let mut diag = vec![4.0; m];
        let sup = vec![1.0; m];
        diag[0] = 2.0;
        diag[n] = 2.0;
        sub[0] = 0.0;

        let mut rhs = vec![[0.0; N]; m];
        for c in 0..N {
            rhs[0][c] = 6.0 / h * ((values[1][c] - values[0][c]) / h - start_slope[c]);
            rhs[n][c] = 6.0 / h * (end_slope[c] - (values[n][c] - values[n - 1][c]) / h);
        }
        for i in 1..n {
            for c in 0..N {
                rhs[i][c] =
                    6.0 / (h * h) * (values[i + 1][c] - 2.0 * values[i][c] + values[i - 1][c]);
            }
        }

        // Thomas algorithm.
        let mut c_prime = vec![0.0; m];
        c_prime[0] = sup[0] / diag[0];
        for c in 0..N {
            rhs[0][c] /= diag[0];
        }
        for i in 1..m {
            let denom = diag[i] - sub[i] * c_prime[i - 1];
            if i < n {
                c_prime[i] = sup[i] / denom;
            }
            for c in 0..N {
                rhs[i][c] = (rhs[i][c] - sub[i] * rhs[i - 1][c]) / denom;
            }
        }
        let mut second = rhs;
        for i in (0..n).rev() {
            for c in 0..N {
                second[i][c] -= c_prime[i] * second[i + 1][c];
            }
        }

        Some(Self {
            start,
            step,
            values,
            second,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    /// Position of the last knot.
    pub fn end(&self) -> f64 {
        self.knot(self.values.len() - 1)
    }

    pub fn knot(&self, i: usize) -> f64 {
        self.start + self.step * i as f64
    }

    pub fn knot_value(&self, i: usize) -> &[f64; N] {
        &self.values[i]
    }

    /// Evaluate at `s`, clamped into `[start, end]`.
    pub fn eval(&self, s: f64) -> [f64; N] {
        let n = self.values.len() - 1;
        let s = s.clamp(self.start, self.end());

        let nearest = ((s - self.start) / self.step).round() as usize;
        let nearest = nearest.min(n);
        if s == self.knot(nearest) {
            return self.values[nearest];
        }

        let i = (((s - self.start) / self.step).floor() as usize).min(n - 1);
        let h = self.step;
        let t = s - self.knot(i);
        let u = h - t;

        let (y0, y1) = (&self.values[i], &self.values[i + 1]);
        let (m0, m1) = (&self.second[i], &self.second[i + 1]);
        let mut out = [0.0; N];
        for c in 0..N {
            out[c] = m0[c] * u * u * u / (6.0 * h)
                + m1[c] * t * t * t / (6.0 * h)
                + (y0[c] / h - m0[c] * h / 6.0) * u
                + (y1[c] / h - m1[c] * h / 6.0) * t;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reproduces_cubic_exactly_with_true_slopes() {
        // y = s^3 - 2 s, y' = 3 s^2 - 2. A clamped spline reproduces cubics.
        let f = |s: f64| s * s * s - 2.0 * s;
        let df = |s: f64| 3.0 * s * s - 2.0;
        let n = 11;
        let h = 0.3;
        let values: Vec<[f64; 1]> = (0..n).map(|i| [f(i as f64 * h)]).collect();
        let end = (n - 1) as f64 * h;
        let spline = ClampedSpline::new(0.0, h, values, [df(0.0)], [df(end)]).unwrap();

        for &s in &[0.05, 0.71, 1.234, 2.0, 2.95] {
            let got = spline.eval(s)[0];
            assert!((got - f(s)).abs() < 1e-10, "s={s}: {got} vs {}", f(s));
        }
    }

    #[test]
    fn knots_are_returned_untouched() {
        let values: Vec<[f64; 2]> = (0..6).map(|i| [i as f64 * 0.1, (i as f64).sin()]).collect();
        let spline = ClampedSpline::new(0.0, 0.2, values.clone(), [0.5, 1.0], [0.5, 0.0]).unwrap();
        for (i, v) in values.iter().enumerate() {
            assert_eq!(&spline.eval(spline.knot(i)), v);
        }
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(ClampedSpline::<1>::new(0.0, 0.1, vec![[1.0]], [0.0], [0.0]).is_none());
        assert!(ClampedSpline::<1>::new(0.0, 0.0, vec![[1.0], [2.0]], [0.0], [0.0]).is_none());
    }
}
