//! Adaptive Gauss-Kronrod quadrature over finite, semi-infinite, and infinite
//! intervals.
//!
//! Integrands may be real, complex, or matrix-valued (anything implementing
//! [`Quadrable`]), and may be fallible, in which case the first error returned
//! by the integrand aborts the integration and is passed back unchanged.
//!
//! An integration that runs out of subdivisions before meeting its tolerance
//! is logged and returned with [`QuadResult::unresolved`] set. The fallible
//! entry points turn this into [`Error::Convergence`] when
//! [`QuadOptions::strict`] is on.

use std::convert::Infallible;
use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::warn;
use crate::error::Error;

// 15-point Kronrod abscissae on [0, 1]; the odd-indexed ones (and zero) are
// shared with the 7-point Gauss rule
const XGK: [f64; 8] = [
    0.991455371120812639206854697526329,
    0.949107912342758524526189684047851,
    0.864864423359769072789712788640926,
    0.741531185599394439863864773280788,
    0.586087235467691130294144845693013,
    0.405845151377397166906606412076961,
    0.207784955007898467600689403773245,
    0.000000000000000000000000000000000,
];

const WGK: [f64; 8] = [
    0.022935322010529224963732008058970,
    0.063092092629978553290700663189204,
    0.104790010322250183839876322541518,
    0.140653259715525918745189590510238,
    0.169004726639267902826583426598550,
    0.190350578064785409913256402421014,
    0.204432940075298892414161999234649,
    0.209482141084727828012999174891714,
];

const WG: [f64; 4] = [
    0.129484966168869693270611432679082,
    0.279705391489276667901467771423780,
    0.381830050505118944950369775488975,
    0.417959183673469387755102040816327,
];

/// Values that can be accumulated by the quadrature routines.
pub trait Quadrable: Clone {
    /// Return an additive identity with the same shape as `self`.
    fn zeros_like(&self) -> Self;

    /// Perform `self += a * x`.
    fn axpy(&mut self, a: f64, x: &Self);

    /// Largest elementwise absolute difference between `self` and `other`.
    fn distance(&self, other: &Self) -> f64;

    /// Largest elementwise absolute value.
    fn magnitude(&self) -> f64;
}

impl Quadrable for f64 {
    fn zeros_like(&self) -> Self { 0.0 }

    fn axpy(&mut self, a: f64, x: &Self) { *self += a * x; }

    fn distance(&self, other: &Self) -> f64 { (self - other).abs() }

    fn magnitude(&self) -> f64 { self.abs() }
}

impl Quadrable for C64 {
    fn zeros_like(&self) -> Self { C64::new(0.0, 0.0) }

    fn axpy(&mut self, a: f64, x: &Self) { *self += *x * a; }

    fn distance(&self, other: &Self) -> f64 { (self - other).norm() }

    fn magnitude(&self) -> f64 { self.norm() }
}

impl<D> Quadrable for nd::Array<C64, D>
where D: nd::Dimension
{
    fn zeros_like(&self) -> Self { nd::Array::zeros(self.raw_dim()) }

    fn axpy(&mut self, a: f64, x: &Self) {
        self.zip_mut_with(x, |s, xk| { *s += *xk * a; });
    }

    fn distance(&self, other: &Self) -> f64 {
        self.iter().zip(other)
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max)
    }

    fn magnitude(&self) -> f64 {
        self.iter().map(|a| a.norm()).fold(0.0, f64::max)
    }
}

/// Tolerances and subdivision budget for an adaptive integration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct QuadOptions {
    pub abstol: f64,
    pub reltol: f64,
    /// Maximum number of bisections before giving up on the tolerances.
    pub max_subdivisions: usize,
    /// Fail instead of warning when the tolerances cannot be met.
    pub strict: bool,
}

impl Default for QuadOptions {
    fn default() -> Self {
        Self { abstol: 1e-10, reltol: 1e-8, max_subdivisions: 200, strict: false }
    }
}

impl QuadOptions {
    fn target(&self, value: f64) -> f64 {
        self.abstol.max(self.reltol * value)
    }
}

/// Output of an adaptive integration.
#[derive(Clone, Debug)]
pub struct QuadResult<T> {
    /// Estimated value of the integral.
    pub value: T,
    /// Estimated absolute error.
    pub error: f64,
    /// Number of integrand evaluations.
    pub evals: usize,
    /// Midpoint of the least accurate segment if the tolerances were not met.
    pub unresolved: Option<f64>,
}

impl<T> QuadResult<T> {
    /// Return `true` if the error estimate is within the requested tolerances.
    pub fn converged(&self) -> bool { self.unresolved.is_none() }
}

#[derive(Clone, Debug)]
struct Segment<T> {
    a: f64,
    b: f64,
    value: T,
    error: f64,
}

fn gk15<T, E, F>(f: &mut F, a: f64, b: f64) -> Result<Segment<T>, E>
where
    T: Quadrable,
    F: FnMut(f64) -> Result<T, E>,
{
    let c = (a + b) / 2.0;
    let h = (b - a) / 2.0;
    let fc = f(c)?;
    let mut kronrod = fc.zeros_like();
    let mut gauss = fc.zeros_like();
    kronrod.axpy(WGK[7], &fc);
    gauss.axpy(WG[3], &fc);
    for (j, (&x, &w)) in XGK.iter().zip(&WGK).take(7).enumerate() {
        let f1 = f(c - h * x)?;
        let f2 = f(c + h * x)?;
        kronrod.axpy(w, &f1);
        kronrod.axpy(w, &f2);
        if j % 2 == 1 {
            gauss.axpy(WG[j / 2], &f1);
            gauss.axpy(WG[j / 2], &f2);
        }
    }
    let mut value = kronrod.zeros_like();
    value.axpy(h, &kronrod);
    let error = h.abs() * kronrod.distance(&gauss);
    Ok(Segment { a, b, value, error })
}

fn adapt<T, E, F>(mut f: F, points: &[f64], opts: &QuadOptions)
    -> Result<QuadResult<T>, E>
where
    T: Quadrable,
    F: FnMut(f64) -> Result<T, E>,
{
    let mut segments: Vec<Segment<T>> = Vec::with_capacity(points.len() + 16);
    for (&a, &b) in points.iter().zip(points.iter().skip(1)) {
        if a == b { continue; }
        segments.push(gk15(&mut f, a, b)?);
    }
    let mut evals = 15 * segments.len();
    let sum = |segments: &[Segment<T>]| -> Option<(T, f64)> {
        let first = segments.first()?;
        let mut value = first.value.zeros_like();
        let mut error = 0.0;
        for seg in segments.iter() {
            value.axpy(1.0, &seg.value);
            error += seg.error;
        }
        Some((value, error))
    };
    let Some((mut value, mut error)) = sum(&segments) else {
        // empty interval; evaluate once only to learn the output's shape
        let sample = f(points.first().copied().unwrap_or(0.0))?;
        return Ok(QuadResult {
            value: sample.zeros_like(), error: 0.0, evals: 1, unresolved: None });
    };
    let mut subdivisions: usize = 0;
    let mut unresolved: Option<f64> = None;
    while error > opts.target(value.magnitude()) {
        let worst
            = segments.iter().enumerate()
            .max_by(|(_, l), (_, r)| l.error.total_cmp(&r.error))
            .map(|(k, _)| k)
            .unwrap_or(0);
        let (lo, hi) = (segments[worst].a, segments[worst].b);
        let mid = (lo + hi) / 2.0;
        if subdivisions >= opts.max_subdivisions {
            warn!(
                error,
                target = opts.target(value.magnitude()),
                subdivisions,
                "quadrature subdivision budget exhausted",
            );
            unresolved = Some(mid);
            break;
        }
        if mid <= lo.min(hi) || mid >= lo.max(hi) {
            // interval can no longer be split in floating point
            warn!(error, at = mid, "quadrature interval cannot be split further");
            unresolved = Some(mid);
            break;
        }
        let seg = segments.swap_remove(worst);
        segments.push(gk15(&mut f, seg.a, mid)?);
        segments.push(gk15(&mut f, mid, seg.b)?);
        evals += 30;
        subdivisions += 1;
        if let Some((v, e)) = sum(&segments) {
            value = v;
            error = e;
        }
    }
    Ok(QuadResult { value, error, evals, unresolved })
}

fn check<T, E>(res: QuadResult<T>, opts: &QuadOptions) -> Result<QuadResult<T>, E>
where E: From<Error>
{
    match res.unresolved {
        Some(t) if opts.strict => Err(Error::Convergence {
            t,
            reason: format!(
                "quadrature error {:e} above tolerance after {} subdivisions",
                res.error, opts.max_subdivisions,
            ),
        }.into()),
        _ => Ok(res),
    }
}

fn never<T>(res: Result<T, Infallible>) -> T {
    match res {
        Ok(x) => x,
        Err(never) => match never { },
    }
}

/// Integrate a fallible function over the finite interval `[a, b]`.
///
/// In strict mode, failure to meet the tolerances is reported as
/// [`Error::Convergence`] at the midpoint of the least accurate segment.
pub fn try_integrate<T, E, F>(f: F, a: f64, b: f64, opts: &QuadOptions)
    -> Result<QuadResult<T>, E>
where
    T: Quadrable,
    E: From<Error>,
    F: FnMut(f64) -> Result<T, E>,
{
    check(adapt(f, &[a, b], opts)?, opts)
}

/// Integrate a function over the finite interval `[a, b]`.
pub fn integrate<T, F>(mut f: F, a: f64, b: f64, opts: &QuadOptions)
    -> QuadResult<T>
where
    T: Quadrable,
    F: FnMut(f64) -> T,
{
    never(adapt(|x| Ok(f(x)), &[a, b], opts))
}

/// Integrate a function over `[points[0], points[n - 1]]`, with each point
/// taken as a boundary of the initial partition.
///
/// Points must be sorted. Useful for integrands with kinks or integrable
/// singularities at known locations.
pub fn integrate_points<T, F>(mut f: F, points: &[f64], opts: &QuadOptions)
    -> QuadResult<T>
where
    T: Quadrable,
    F: FnMut(f64) -> T,
{
    never(adapt(|x| Ok(f(x)), points, opts))
}

/// Like [`integrate_points`], for a fallible integrand.
pub fn try_integrate_points<T, E, F>(f: F, points: &[f64], opts: &QuadOptions)
    -> Result<QuadResult<T>, E>
where
    T: Quadrable,
    E: From<Error>,
    F: FnMut(f64) -> Result<T, E>,
{
    check(adapt(f, points, opts)?, opts)
}

/// Nodes and weights of the composite 15-point Kronrod rule on `panels` equal
/// panels of `[a, b]`, in ascending order of the nodes.
pub fn kronrod_nodes(a: f64, b: f64, panels: usize) -> Vec<(f64, f64)> {
    let panels = panels.max(1);
    let width = (b - a) / panels as f64;
    let h = width / 2.0;
    let mut nodes: Vec<(f64, f64)> = Vec::with_capacity(15 * panels);
    for p in 0..panels {
        let c = a + (p as f64 + 0.5) * width;
        nodes.extend(XGK.iter().zip(&WGK).take(7).map(|(&x, &w)| (c - h * x, h * w)));
        nodes.push((c, h * WGK[7]));
        nodes.extend(
            XGK.iter().zip(&WGK).take(7).rev().map(|(&x, &w)| (c + h * x, h * w)));
    }
    nodes
}

/// Integrate a fallible function over `[a, +∞)` via the substitution
/// `x = a + t / (1 - t)`.
pub fn try_integrate_semi_inf<T, E, F>(f: F, a: f64, opts: &QuadOptions)
    -> Result<QuadResult<T>, E>
where
    T: Quadrable,
    E: From<Error>,
    F: FnMut(f64) -> Result<T, E>,
{
    check(semi_inf(f, a, opts)?, opts)
}

fn semi_inf<T, E, F>(mut f: F, a: f64, opts: &QuadOptions)
    -> Result<QuadResult<T>, E>
where
    T: Quadrable,
    F: FnMut(f64) -> Result<T, E>,
{
    let g = |t: f64| -> Result<T, E> {
        let u = 1.0 - t;
        let y = f(a + t / u)?;
        let mut out = y.zeros_like();
        out.axpy(1.0 / (u * u), &y);
        Ok(out)
    };
    adapt(g, &[0.0, 1.0], opts)
}

/// Integrate a function over `[a, +∞)`.
pub fn integrate_semi_inf<T, F>(mut f: F, a: f64, opts: &QuadOptions)
    -> QuadResult<T>
where
    T: Quadrable,
    F: FnMut(f64) -> T,
{
    never(semi_inf(|x| Ok(f(x)), a, opts))
}

/// Integrate a function over the whole real line via the substitution
/// `x = t / (1 - t²)`.
pub fn integrate_inf<T, F>(mut f: F, opts: &QuadOptions) -> QuadResult<T>
where
    T: Quadrable,
    F: FnMut(f64) -> T,
{
    let g = |t: f64| -> Result<T, Infallible> {
        let u = 1.0 - t * t;
        let y = f(t / u);
        let mut out = y.zeros_like();
        out.axpy((1.0 + t * t) / (u * u), &y);
        Ok(out)
    };
    never(adapt(g, &[-1.0, 0.0, 1.0], opts))
}
