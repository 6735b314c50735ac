//! Adaptive Dormand-Prince 5(4) integration of complex array-valued ODEs with
//! dense output, exact stopping times, and step callbacks.
//!
//! Systems are described by implementing [`OdeSystem`], which provides the
//! right-hand side and optionally observes every accepted step (to halt the
//! integration or to reset the state discontinuously) and every stopping time
//! (to apply an instantaneous update). The output is a [`Solution`] that can
//! be evaluated anywhere within the integrated range by cubic Hermite
//! interpolation between accepted steps.

use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::{ debug, trace };
use crate::{
    error::{ Error, Result },
    quad::Quadrable,
};

/// Array state type for a given dimension.
pub type State<D> = nd::Array<C64, D>;

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
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;
// difference between fifth- and fourth-order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Integrator settings.
#[derive(Clone, Debug, PartialEq)]
pub struct OdeOptions {
    pub abstol: f64,
    pub reltol: f64,
    /// Maximum number of attempted steps, accepted or rejected.
    pub max_steps: usize,
    /// Upper bound on the step size.
    pub dt_max: f64,
    /// Initial step size; chosen automatically if `None`.
    pub dt_init: Option<f64>,
    /// Times that the integrator must land on exactly, where
    /// [`OdeSystem::on_tstop`] is called.
    pub tstops: Vec<f64>,
}

impl Default for OdeOptions {
    fn default() -> Self { Self::new(1e-8, 1e-6) }
}

impl OdeOptions {
    /// Create a new `OdeOptions` with the given tolerances.
    pub fn new(abstol: f64, reltol: f64) -> Self {
        Self {
            abstol,
            reltol,
            max_steps: 100_000,
            dt_max: f64::INFINITY,
            dt_init: None,
            tstops: Vec::new(),
        }
    }
}

/// An accepted step, as seen by [`OdeSystem::on_step`].
#[derive(Debug)]
pub struct Step<'a, D>
where D: nd::Dimension
{
    pub t0: f64,
    pub t1: f64,
    pub u0: &'a State<D>,
    pub u1: &'a State<D>,
    pub f0: &'a State<D>,
    pub f1: &'a State<D>,
}

impl<'a, D> Step<'a, D>
where D: nd::Dimension
{
    /// Interpolate the state at `t` within the step.
    pub fn interpolate(&self, t: f64) -> State<D> {
        hermite(self.t0, self.t1, self.u0, self.u1, self.f0, self.f1, t)
    }

    /// Interpolate the time derivative of the state at `t` within the step.
    pub fn interpolate_deriv(&self, t: f64) -> State<D> {
        hermite_deriv(self.t0, self.t1, self.u0, self.u1, self.f0, self.f1, t)
    }
}

/// Instruction returned by [`OdeSystem::on_step`].
#[derive(Clone, Debug)]
pub enum StepAction<D>
where D: nd::Dimension
{
    /// Keep integrating.
    Continue,
    /// Stop after this step; the solution is marked as halted.
    Halt(String),
    /// Truncate the step at time `t` (which must lie within the step) and
    /// restart the integration from `state`.
    Reset { t: f64, state: State<D> },
}

/// An ODE `du/dt = f(t, u)` together with hooks into the integration.
pub trait OdeSystem<D>
where D: nd::Dimension
{
    /// Compute the right-hand side.
    fn rhs(&mut self, t: f64, u: &State<D>) -> Result<State<D>>;

    /// Observe an accepted step.
    fn on_step(&mut self, _step: &Step<D>) -> Result<StepAction<D>> {
        Ok(StepAction::Continue)
    }

    /// Apply an update at a stopping time. Returns `true` if the state was
    /// changed, in which case the right-hand side is recomputed and the
    /// solution receives a second point at `t`.
    fn on_tstop(&mut self, _t: f64, _u: &mut State<D>) -> Result<bool> {
        Ok(false)
    }
}

/// Final status of an integration.
#[derive(Clone, Debug, PartialEq)]
pub enum Status {
    /// The full time span was integrated.
    Solved,
    /// A step callback stopped the integration early.
    Halted { t: f64, reason: String },
}

/// Dense output of an integration.
///
/// Discontinuous updates are recorded as two points at the same time;
/// evaluation is right-continuous, returning the post-update value there.
#[derive(Clone, Debug)]
pub struct Solution<D>
where D: nd::Dimension
{
    t: Vec<f64>,
    u: Vec<State<D>>,
    du: Vec<State<D>>,
    status: Status,
}

impl<D> Solution<D>
where D: nd::Dimension
{
    /// Time points of all accepted steps.
    pub fn t(&self) -> &[f64] { &self.t }

    /// States at all accepted steps.
    pub fn u(&self) -> &[State<D>] { &self.u }

    /// Final status of the integration.
    pub fn status(&self) -> &Status { &self.status }

    /// Return `true` if the integration was stopped by a callback.
    pub fn is_halted(&self) -> bool { matches!(self.status, Status::Halted { .. }) }

    /// Time range covered.
    pub fn span(&self) -> (f64, f64) {
        (
            self.t.first().copied().unwrap_or(f64::NAN),
            self.t.last().copied().unwrap_or(f64::NAN),
        )
    }

    /// Final state.
    pub fn last(&self) -> Option<&State<D>> { self.u.last() }

    /// Evaluate the solution at time `t`.
    pub fn eval(&self, t: f64) -> Result<State<D>> {
        let (lo, hi) = self.span();
        if !(t >= lo && t <= hi) {
            return Err(Error::OutOfRange { t, lo, hi });
        }
        let k = self.t.partition_point(|&tk| tk <= t);
        if k >= self.t.len() {
            return Ok(self.u[self.t.len() - 1].clone());
        }
        Ok(hermite(
            self.t[k - 1], self.t[k],
            &self.u[k - 1], &self.u[k],
            &self.du[k - 1], &self.du[k],
            t,
        ))
    }

    /// Evaluate the solution at each of a series of times.
    pub fn sample(&self, ts: &[f64]) -> Result<Vec<State<D>>> {
        ts.iter().map(|&t| self.eval(t)).collect()
    }

    /// Apply a linear map to every stored state and derivative.
    pub fn map_states<E, F>(self, f: F) -> Result<Solution<E>>
    where
        E: nd::Dimension,
        F: Fn(State<D>) -> Result<State<E>>,
    {
        let Self { t, u, du, status } = self;
        let u: Vec<State<E>> = u.into_iter().map(&f).collect::<Result<_>>()?;
        let du: Vec<State<E>> = du.into_iter().map(&f).collect::<Result<_>>()?;
        Ok(Solution { t, u, du, status })
    }

    fn push(&mut self, t: f64, u: State<D>, du: State<D>) {
        self.t.push(t);
        self.u.push(u);
        self.du.push(du);
    }
}

fn hermite_weights(t0: f64, t1: f64, t: f64) -> (f64, f64, f64, f64, f64) {
    let h = t1 - t0;
    let th = (t - t0) / h;
    let th2 = th * th;
    let th3 = th2 * th;
    (
        h,
        2.0 * th3 - 3.0 * th2 + 1.0,
        th3 - 2.0 * th2 + th,
        -2.0 * th3 + 3.0 * th2,
        th3 - th2,
    )
}

fn hermite<D>(
    t0: f64,
    t1: f64,
    u0: &State<D>,
    u1: &State<D>,
    f0: &State<D>,
    f1: &State<D>,
    t: f64,
) -> State<D>
where D: nd::Dimension
{
    if t1 == t0 { return u1.clone(); }
    let (h, h00, h10, h01, h11) = hermite_weights(t0, t1, t);
    let mut out = u0.zeros_like();
    out.axpy(h00, u0);
    out.axpy(h10 * h, f0);
    out.axpy(h01, u1);
    out.axpy(h11 * h, f1);
    out
}

fn hermite_deriv<D>(
    t0: f64,
    t1: f64,
    u0: &State<D>,
    u1: &State<D>,
    f0: &State<D>,
    f1: &State<D>,
    t: f64,
) -> State<D>
where D: nd::Dimension
{
    if t1 == t0 { return f1.clone(); }
    let h = t1 - t0;
    let th = (t - t0) / h;
    let th2 = th * th;
    let mut out = u0.zeros_like();
    out.axpy((6.0 * th2 - 6.0 * th) / h, u0);
    out.axpy(3.0 * th2 - 4.0 * th + 1.0, f0);
    out.axpy((-6.0 * th2 + 6.0 * th) / h, u1);
    out.axpy(3.0 * th2 - 2.0 * th, f1);
    out
}

fn stage<D>(u: &State<D>, coeffs: &[(f64, &State<D>)]) -> State<D>
where D: nd::Dimension
{
    let mut y = u.clone();
    coeffs.iter().for_each(|(c, k)| { y.axpy(*c, k); });
    y
}

fn error_norm<D>(err: &State<D>, u0: &State<D>, u1: &State<D>, opts: &OdeOptions)
    -> f64
where D: nd::Dimension
{
    let n = err.len().max(1) as f64;
    let sq: f64
        = err.iter().zip(u0).zip(u1)
        .map(|((e, a), b)| {
            let sc = opts.abstol + opts.reltol * a.norm().max(b.norm());
            (e.norm() / sc).powi(2)
        })
        .sum();
    (sq / n).sqrt()
}

fn initial_step<D>(u0: &State<D>, f0: &State<D>, opts: &OdeOptions) -> f64
where D: nd::Dimension
{
    let n = u0.len().max(1) as f64;
    let (d0, d1)
        = u0.iter().zip(f0)
        .fold((0.0, 0.0), |(d0, d1), (u, f)| {
            let sc = opts.abstol + opts.reltol * u.norm();
            (d0 + (u.norm() / sc).powi(2), d1 + (f.norm() / sc).powi(2))
        });
    let (d0, d1) = ((d0 / n).sqrt(), (d1 / n).sqrt());
    if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 }
}

/// Integrate `system` from `u0` over `span = (t0, t1)`.
///
/// Fails with [`Error::Convergence`] if the step budget is exhausted or the
/// step size underflows; errors raised by the system are passed through
/// unchanged.
pub fn solve<D, S>(
    system: &mut S,
    u0: State<D>,
    span: (f64, f64),
    opts: &OdeOptions,
) -> Result<Solution<D>>
where
    D: nd::Dimension,
    S: OdeSystem<D> + ?Sized,
{
    let (t_start, t_end) = span;
    if !(t_end > t_start) {
        return Err(Error::InvalidParameter(
            format!("integration span ({t_start}, {t_end}) must be increasing")));
    }
    // (time, whether on_tstop is called there)
    let mut stops: Vec<(f64, bool)>
        = opts.tstops.iter().copied()
        .filter(|&ts| ts > t_start && ts <= t_end)
        .map(|ts| (ts, true))
        .collect();
    stops.sort_by(|l, r| l.0.total_cmp(&r.0));
    stops.dedup_by(|l, r| l.0 == r.0);
    if stops.last().map(|s| s.0 < t_end).unwrap_or(true) {
        stops.push((t_end, false));
    }

    let mut sol = Solution {
        t: Vec::new(),
        u: Vec::new(),
        du: Vec::new(),
        status: Status::Solved,
    };
    let mut t = t_start;
    let mut u = u0;
    let mut f = system.rhs(t, &u)?;
    if opts.tstops.iter().any(|&ts| ts == t_start) {
        sol.push(t, u.clone(), f.clone());
        if system.on_tstop(t, &mut u)? {
            f = system.rhs(t, &u)?;
        }
    }
    sol.push(t, u.clone(), f.clone());

    let mut h
        = opts.dt_init
        .unwrap_or_else(|| initial_step(&u, &f, opts))
        .min(opts.dt_max)
        .min(t_end - t_start);
    let mut stop_idx: usize = 0;
    let mut steps: usize = 0;
    let mut rejected: usize = 0;
    while stop_idx < stops.len() {
        let (t_stop, apply) = stops[stop_idx];
        if steps >= opts.max_steps {
            return Err(Error::Convergence {
                t,
                reason: format!("maximum number of steps ({}) exceeded", opts.max_steps),
            });
        }
        steps += 1;
        h = h.min(opts.dt_max);
        let remaining = t_stop - t;
        let hit = h >= remaining * (1.0 - 1e-12);
        if hit { h = remaining; }
        if h.abs() <= 1e-14 * t.abs().max(1.0) {
            return Err(Error::Convergence {
                t,
                reason: format!("step size {h:e} too small"),
            });
        }

        let k1 = &f;
        let k2 = system.rhs(t + C2 * h, &stage(&u, &[(h * A21, k1)]))?;
        let k3 = system.rhs(
            t + C3 * h, &stage(&u, &[(h * A31, k1), (h * A32, &k2)]))?;
        let k4 = system.rhs(
            t + C4 * h,
            &stage(&u, &[(h * A41, k1), (h * A42, &k2), (h * A43, &k3)]),
        )?;
        let k5 = system.rhs(
            t + C5 * h,
            &stage(&u, &[
                (h * A51, k1), (h * A52, &k2), (h * A53, &k3), (h * A54, &k4),
            ]),
        )?;
        let k6 = system.rhs(
            t + h,
            &stage(&u, &[
                (h * A61, k1), (h * A62, &k2), (h * A63, &k3), (h * A64, &k4),
                (h * A65, &k5),
            ]),
        )?;
        let u_new = stage(&u, &[
            (h * B1, k1), (h * B3, &k3), (h * B4, &k4), (h * B5, &k5), (h * B6, &k6),
        ]);
        let t_new = if hit { t_stop } else { t + h };
        let k7 = system.rhs(t_new, &u_new)?;
        let mut err_vec = u.zeros_like();
        for (c, k) in [
            (E1, k1), (E3, &k3), (E4, &k4), (E5, &k5), (E6, &k6), (E7, &k7),
        ] {
            err_vec.axpy(h * c, k);
        }
        let err = error_norm(&err_vec, &u, &u_new, opts);

        if !err.is_finite() || err > 1.0 {
            rejected += 1;
            let factor
                = if err.is_finite() { (0.9 * err.powf(-0.2)).max(0.2) } else { 0.2 };
            h *= factor.min(1.0);
            trace!(t, h, err, "step rejected");
            continue;
        }

        let action = {
            let step = Step {
                t0: t, t1: t_new, u0: &u, u1: &u_new, f0: &f, f1: &k7,
            };
            match system.on_step(&step)? {
                StepAction::Continue => None,
                StepAction::Halt(reason) => Some(Err(reason)),
                StepAction::Reset { t: t_reset, state } => {
                    let t_reset = t_reset.clamp(t, t_new);
                    let u_pre = step.interpolate(t_reset);
                    let f_pre = step.interpolate_deriv(t_reset);
                    Some(Ok((t_reset, u_pre, f_pre, state)))
                },
            }
        };
        let factor
            = if err == 0.0 { 5.0 } else { (0.9 * err.powf(-0.2)).clamp(0.2, 5.0) };
        match action {
            None => {
                sol.push(t_new, u_new.clone(), k7.clone());
                t = t_new;
                u = u_new;
                f = k7;
            },
            Some(Err(reason)) => {
                sol.push(t_new, u_new, k7);
                debug!(t = t_new, %reason, "integration halted by callback");
                sol.status = Status::Halted { t: t_new, reason };
                return Ok(sol);
            },
            Some(Ok((t_reset, u_pre, f_pre, state))) => {
                if t_reset > t {
                    sol.push(t_reset, u_pre, f_pre);
                }
                t = t_reset;
                u = state;
                f = system.rhs(t, &u)?;
                sol.push(t, u.clone(), f.clone());
            },
        }
        h *= factor;
        if t >= t_stop {
            stop_idx += 1;
            if apply && system.on_tstop(t, &mut u)? {
                f = system.rhs(t, &u)?;
                sol.push(t, u.clone(), f.clone());
            }
        }
    }
    debug!(steps, rejected, points = sol.t.len(), "integration finished");
    Ok(sol)
}
