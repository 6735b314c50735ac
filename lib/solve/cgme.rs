//! Coarse-grained master equation (CGME).
//!
//! The second-order kernel is averaged over a window of width `Ta` around the
//! current time, which makes the generator completely positive:
//! ```text
//! D(ρ) = (1/Ta) ∫∫ C_ab(t1 - t2) [A_b(t2) ρ A_a(t1) - ½{A_a(t1) A_b(t2), ρ}]
//! H_LS = (1/2i Ta) ∫∫ sgn(t1 - t2) C_ab(t1 - t2) A_a(t1) A_b(t2)
//! ```
//! with `A(t') = U(t, t') S(t') U†(t, t')`. The double integral is taken with
//! a tensor-product Gauss-Kronrod rule whose panel count is doubled until the
//! dissipator and Lamb shift settle.

use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::{ info, trace, warn };
use crate::{
    bath::{ self, Bath },
    config::SolverConfig,
    dynamics::{ Annealing, CouplingSet, Operator },
    error::{ Error, Result },
    quad::{ kronrod_nodes, QuadOptions },
};
use super::{
    anti_commutator, check_tf, commutator, integrate_matrix, DensityGenerator,
    Propagator, PulseAction, Solution,
};

/// Options for the CGME.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CgmeOptions {
    /// Coarse-graining window `Ta` (ns). Defaults to
    /// [`coarse_grain_timescale`][bath::coarse_grain_timescale] of the bath,
    /// with moments taken over the whole anneal.
    pub window: Option<f64>,
    /// Upper bound on the number of quadrature panels per axis. Reaching it
    /// without convergence is an error under
    /// [`SolverConfig::strict_quadrature`] and a warning otherwise.
    pub max_panels: usize,
}

impl Default for CgmeOptions {
    fn default() -> Self { Self { window: None, max_panels: 8 } }
}

impl CgmeOptions {
    /// Set the coarse-graining window.
    pub fn with_window(mut self, Ta: f64) -> Self {
        self.window = Some(Ta);
        self
    }
}

#[derive(Clone, Debug)]
struct CgmeTerms {
    /// `(L, R)` such that the gain is `Σ L ρ R`.
    gain: Vec<(nd::Array2<C64>, nd::Array2<C64>)>,
    M: nd::Array2<C64>,
    H_LS: nd::Array2<C64>,
}

impl CgmeTerms {
    fn distance(&self, other: &Self) -> f64 {
        let d = |a: &nd::Array2<C64>, b: &nd::Array2<C64>| -> f64 {
            a.iter().zip(b.iter()).map(|(x, y)| (x - y).norm()).fold(0.0, f64::max)
        };
        d(&self.M, &other.M).max(d(&self.H_LS, &other.H_LS))
    }

    fn magnitude(&self) -> f64 {
        self.M.iter().chain(self.H_LS.iter()).map(|x| x.norm()).fold(0.0, f64::max)
    }
}

struct CgmeGenerator<'a> {
    H: &'a Operator,
    coupling: &'a CouplingSet,
    bath: &'a Bath,
    pairs: Vec<(usize, usize)>,
    U: Propagator<'a>,
    tf: f64,
    Ta: f64,
    tol: QuadOptions,
    max_panels: usize,
}

impl<'a> CgmeGenerator<'a> {
    /// Physical-time window containing `t = tf s`.
    fn window(&self, s: f64) -> (f64, f64) {
        let t = self.tf * s;
        let lo = (t - self.Ta / 2.0).clamp(0.0, (self.tf - self.Ta).max(0.0));
        (lo, (lo + self.Ta).min(self.tf))
    }

    fn terms_with(&self, s: f64, panels: usize) -> Result<CgmeTerms> {
        let n = self.coupling.dim();
        let (lo, hi) = self.window(s);
        let nodes = kronrod_nodes(lo, hi, panels);
        let U_s = self.U.at(s)?;
        // A[c][k]: channel c transported from node k to the current time
        let mut A: Vec<Vec<nd::Array2<C64>>>
            = vec![Vec::with_capacity(nodes.len()); self.coupling.len()];
        for &(tk, _) in nodes.iter() {
            let sk = tk / self.tf;
            for (c, op) in self.coupling.iter().enumerate() {
                A[c].push(self.U.transport(&U_s, sk, &op.evaluate(sk))?);
            }
        }
        let mut gain: Vec<(nd::Array2<C64>, nd::Array2<C64>)> = Vec::new();
        let mut M: nd::Array2<C64> = nd::Array2::zeros((n, n));
        let mut H_LS: nd::Array2<C64> = nd::Array2::zeros((n, n));
        for &(a, b) in self.pairs.iter() {
            for (l, &(tl, wl)) in nodes.iter().enumerate() {
                let mut B: nd::Array2<C64> = nd::Array2::zeros((n, n));
                let mut B_sgn: nd::Array2<C64> = nd::Array2::zeros((n, n));
                for (k, &(tk, wk)) in nodes.iter().enumerate() {
                    let K = self.bath.correlation(a, b, tk - tl) * (wk * wl / self.Ta);
                    B.scaled_add(K, &A[a][k]);
                    if k != l {
                        B_sgn.scaled_add(K * (tk - tl).signum(), &A[a][k]);
                    }
                }
                M += &B.dot(&A[b][l]);
                H_LS += &B_sgn.dot(&A[b][l]);
                gain.push((A[b][l].clone(), B));
            }
        }
        let H_LS = H_LS * C64::new(0.0, -0.5);
        Ok(CgmeTerms { gain, M, H_LS })
    }

    fn terms(&self, s: f64) -> Result<CgmeTerms> {
        let mut panels: usize = 1;
        let mut prev = self.terms_with(s, panels)?;
        while panels < self.max_panels {
            panels *= 2;
            let next = self.terms_with(s, panels)?;
            let diff = next.distance(&prev);
            let target = self.tol.abstol.max(self.tol.reltol * next.magnitude());
            prev = next;
            if diff <= target {
                trace!(s, panels, diff, "CGME kernel converged");
                return Ok(prev);
            }
        }
        if self.tol.strict {
            return Err(Error::Convergence {
                t: self.tf * s,
                reason: format!("CGME kernel not converged with {panels} panels"),
            });
        }
        warn!(s, panels, "CGME kernel not converged at the panel limit");
        Ok(prev)
    }
}

impl<'a> DensityGenerator for CgmeGenerator<'a> {
    fn rhs(&mut self, s: f64, rho: &nd::Array2<C64>) -> Result<nd::Array2<C64>> {
        let terms = self.terms(s)?;
        let H = self.H.evaluate(s) + &terms.H_LS;
        let mut drho = commutator(&H, rho) * C64::new(0.0, -1.0);
        for (L, R) in terms.gain.iter() {
            drho += &L.dot(rho).dot(R);
        }
        drho = drho - anti_commutator(&terms.M, rho) / C64::from(2.0);
        Ok(drho * C64::from(self.tf))
    }
}

/// Solve the coarse-grained master equation over `s ∈ [0, 1]`, given the
/// closed-system propagator `U`.
///
/// Without an explicit window the bath must be a single model, from whose
/// correlation function the default window is derived. Pair this solver with
/// the looser [`SolverConfig::cgme`] tolerances.
pub fn solve_cgme(
    annealing: &Annealing,
    tf: f64,
    U: &Solution<nd::Ix2>,
    opts: &CgmeOptions,
    config: &SolverConfig,
) -> Result<Solution<nd::Ix2>>
{
    check_tf(tf)?;
    let (coupling, bath) = annealing.open_system("coarse-grained master equation")?;
    let Ta = match opts.window {
        Some(Ta) => Ta,
        None => {
            let model = bath.require_model("correlation timescale")?;
            bath::coarse_grain_timescale(model, tf)?
        },
    };
    if !(Ta > 0.0 && Ta.is_finite()) {
        return Err(Error::InvalidParameter(
            format!("coarse-graining window must be positive and finite, got {Ta}")));
    }
    let gen = CgmeGenerator {
        H: annealing.hamiltonian(),
        coupling,
        bath,
        pairs: bath.channel_pairs(coupling.len()),
        U: Propagator::new(U, annealing.dim())?,
        tf,
        Ta,
        tol: config.quad_options(),
        max_panels: opts.max_panels.max(1),
    };
    info!(tf, Ta, dim = annealing.dim(), "solving coarse-grained master equation");
    let sol = integrate_matrix(
        gen, annealing.initial_state().to_density(), PulseAction::Conjugate, config)?;
    info!(steps = sol.t().len(), halted = sol.is_halted(), "coarse-grained master equation done");
    Ok(sol)
}
