//! Cubic Hermite interpolation on uniform grids.

use crate::{
    error::{ Error, Result },
    quad::Quadrable,
};

/// Behavior of an interpolant when evaluated outside its grid.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Extrapolation {
    /// Hold the boundary value.
    #[default]
    Flat,
    /// Return [`Error::OutOfRange`].
    Error,
}

/// Piecewise-cubic interpolant through samples on a uniform grid, with
/// Catmull-Rom (centered finite-difference) slopes.
///
/// Linear data are reproduced exactly.
#[derive(Clone, Debug)]
pub struct GridInterpolant<T> {
    x0: f64,
    dx: f64,
    values: Vec<T>,
    slopes: Vec<T>,
    policy: Extrapolation,
}

impl<T> GridInterpolant<T>
where T: Quadrable
{
    /// Create a new interpolant from samples `values[k]` taken at
    /// `x0 + k * dx`.
    ///
    /// Fails if fewer than two samples are given or `dx` is not positive.
    pub fn new(x0: f64, dx: f64, values: Vec<T>, policy: Extrapolation)
        -> Result<Self>
    {
        if values.len() < 2 {
            return Err(Error::InvalidParameter(
                "interpolation requires at least two samples".into()));
        }
        if !(dx > 0.0 && dx.is_finite()) {
            return Err(Error::InvalidParameter(
                format!("interpolation grid step must be positive, got {dx}")));
        }
        let n = values.len();
        let slopes: Vec<T>
            = (0..n)
            .map(|k| {
                let (lo, hi, width)
                    = if k == 0 {
                        (0, 1, dx)
                    } else if k == n - 1 {
                        (n - 2, n - 1, dx)
                    } else {
                        (k - 1, k + 1, 2.0 * dx)
                    };
                let mut m = values[hi].clone();
                m.axpy(-1.0, &values[lo]);
                let mut out = m.zeros_like();
                out.axpy(width.recip(), &m);
                out
            })
            .collect();
        Ok(Self { x0, dx, values, slopes, policy })
    }

    /// Sample `f` at `n` evenly spaced points over `[lo, hi]` and interpolate.
    pub fn tabulate<F>(lo: f64, hi: f64, n: usize, policy: Extrapolation, f: F)
        -> Result<Self>
    where F: FnMut(f64) -> T
    {
        let mut f = f;
        Self::try_tabulate(lo, hi, n, policy, |x| Ok(f(x)))
    }

    /// Like [`tabulate`][Self::tabulate], stopping at the first sample that
    /// fails.
    pub fn try_tabulate<F>(lo: f64, hi: f64, n: usize, policy: Extrapolation, f: F)
        -> Result<Self>
    where F: FnMut(f64) -> Result<T>
    {
        if n < 2 || hi <= lo {
            return Err(Error::InvalidParameter(
                format!("cannot tabulate {n} point(s) over [{lo}, {hi}]")));
        }
        let dx = (hi - lo) / (n - 1) as f64;
        let values: Vec<T>
            = (0..n).map(|k| lo + k as f64 * dx).map(f).collect::<Result<_>>()?;
        Self::new(lo, dx, values, policy)
    }

    /// Lower and upper bounds of the grid.
    pub fn range(&self) -> (f64, f64) {
        (self.x0, self.x0 + self.dx * (self.values.len() - 1) as f64)
    }

    /// Number of grid points.
    pub fn len(&self) -> usize { self.values.len() }

    /// Always `false`; interpolants hold at least two points.
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Extrapolation policy.
    pub fn policy(&self) -> Extrapolation { self.policy }

    /// Evaluate the interpolant at `x`.
    pub fn eval(&self, x: f64) -> Result<T> {
        let (lo, hi) = self.range();
        let n = self.values.len();
        if x < lo || x > hi || x.is_nan() {
            return match self.policy {
                Extrapolation::Flat if x < lo => Ok(self.values[0].clone()),
                Extrapolation::Flat if x > hi => Ok(self.values[n - 1].clone()),
                _ => Err(Error::OutOfRange { t: x, lo, hi }),
            };
        }
        let u = (x - self.x0) / self.dx;
        let k = (u.floor() as usize).min(n - 2);
        let t = u - k as f64;
        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        let mut out = self.values[k].zeros_like();
        out.axpy(h00, &self.values[k]);
        out.axpy(h10 * self.dx, &self.slopes[k]);
        out.axpy(h01, &self.values[k + 1]);
        out.axpy(h11 * self.dx, &self.slopes[k + 1]);
        Ok(out)
    }
}
