//! Polaron-transformed Redfield equation (PTRE).
//!
//! In the polaron frame the system-bath coupling moves into the tunneling
//! terms. Each tunneling operator `L_k` becomes a pair of channels `(L_k, L_k†)`
//! coupled to displaced bath operators whose cross-correlations are
//! ```text
//! C(τ) = exp(-4 Q(τ)),  Q(τ) = ∫_0^τ ∫_0^τ1 C0(τ2) dτ2 dτ1
//! ```
//! for the correlation function `C0` of the untransformed bath. The resulting
//! problem is solved by the ordinary Redfield equation.

use std::sync::Arc;
use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::{ debug, info };
use crate::{
    bath::{ Bath, BathModel, CorrelatedBath, CorrelationFn },
    config::SolverConfig,
    dynamics::{ Annealing, CouplingSet, InitialState, Operator },
    error::{ Error, Result },
    interp::{ Extrapolation, GridInterpolant },
    quad::{ self, QuadOptions },
};
use super::{ redfield::solve_redfield, Solution };

/// Tabulate `Q(τ) = ∫_0^τ (τ - x) C0(x) dx` at `points` evenly spaced lags
/// over `[0, tmax]`.
///
/// The two moments `∫ C0` and `∫ x C0` are accumulated interval by interval,
/// so each piece of the correlation function is integrated once.
pub fn polaron_q(
    base: &dyn BathModel,
    tmax: f64,
    points: usize,
    opts: &QuadOptions,
) -> Result<GridInterpolant<C64>>
{
    if !(tmax > 0.0) || points < 2 {
        return Err(Error::InvalidParameter(
            format!("cannot tabulate Q with {points} point(s) over [0, {tmax}]")));
    }
    let dt = tmax / (points - 1) as f64;
    let mut Q: Vec<C64> = Vec::with_capacity(points);
    Q.push(C64::from(0.0));
    let mut I1 = C64::from(0.0);
    let mut I2 = C64::from(0.0);
    for k in 1..points {
        let (a, b) = ((k - 1) as f64 * dt, k as f64 * dt);
        I1 += quad::integrate(|x| base.correlation(x), a, b, opts).value;
        I2 += quad::integrate(|x| base.correlation(x) * x, a, b, opts).value;
        Q.push(I1 * b - I2);
    }
    GridInterpolant::new(0.0, dt, Q, Extrapolation::Flat)
}

/// Correlated bath of the polaron frame for `pairs` tunneling operators:
/// channels `(2k, 2k + 1)` and `(2k + 1, 2k)` share `C(τ) = exp(-4 Q(τ))`,
/// with `Q` tabulated over `[0, tmax]` and held flat beyond it.
pub fn polaron_bath(
    base: &dyn BathModel,
    pairs: usize,
    tmax: f64,
    points: usize,
) -> Result<CorrelatedBath>
{
    debug!(tmax, points, "tabulating polaron correlation");
    let Q = polaron_q(base, tmax, points, &QuadOptions::default())?;
    let values: Vec<C64>
        = (0..points)
        .map(|k| Q.eval(k as f64 * tmax / (points - 1) as f64).map(|q| (q * -4.0).exp()))
        .collect::<Result<_>>()?;
    let table = Arc::new(
        GridInterpolant::new(0.0, tmax / (points - 1) as f64, values, Extrapolation::Flat)?);
    let c: CorrelationFn = Arc::new(move |tau: f64| {
        let value = table.eval(tau.abs()).unwrap_or(C64::new(f64::NAN, f64::NAN));
        if tau < 0.0 { value.conj() } else { value }
    });
    let entries: Vec<((usize, usize), CorrelationFn)>
        = (0..pairs)
        .flat_map(|k| [((2 * k, 2 * k + 1), c.clone()), ((2 * k + 1, 2 * k), c.clone())])
        .collect();
    CorrelatedBath::new(2 * pairs, entries)
}

/// Assemble a polaron-frame problem from the transformed Hamiltonian, the
/// tunneling operators `L_k`, and a bath from [`polaron_bath`].
///
/// The coupling operators are `[L_0, L_0†, L_1, L_1†, ...]`.
pub fn polaron_annealing<S>(
    H: Operator,
    tunneling: Vec<Operator>,
    u0: S,
    bath: CorrelatedBath,
) -> Result<Annealing>
where S: Into<InitialState>
{
    let ops: Vec<Operator>
        = tunneling.into_iter()
        .flat_map(|L| {
            let Ld = L.adjoint();
            [L, Ld]
        })
        .collect();
    Annealing::new(H, u0)?
        .with_coupling(CouplingSet::new(ops)?)?
        .with_bath(bath)
}

/// Solve the polaron-transformed Redfield equation with memory depth `Ta`,
/// given the polaron-frame propagator `U`.
///
/// Expects a problem built by [`polaron_annealing`]; any cross-correlated
/// problem is accepted, since the equation is Redfield's.
pub fn solve_ptre(
    annealing: &Annealing,
    tf: f64,
    U: &Solution<nd::Ix2>,
    Ta: f64,
    config: &SolverConfig,
) -> Result<Solution<nd::Ix2>>
{
    match annealing.bath() {
        Some(Bath::Correlated(bath)) => {
            info!(channels = bath.num_channels(), "solving polaron-frame Redfield equation");
            solve_redfield(annealing, tf, U, Ta, config)
        },
        Some(other) => Err(Error::MissingCapability(format!(
            "polaron-frame Redfield equation needs a correlated bath, but the bath is {}",
            other.kind(),
        ))),
        None => Err(Error::MissingCapability(
            "polaron-frame Redfield equation needs a bath".into())),
    }
}
