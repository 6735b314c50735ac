//! Universal Lindblad equation (ULE).
//!
//! One jump operator per channel,
//! ```text
//! L(t) = ∫ g(τ) U(t, t - τ) S(t - τ) U†(t, t - τ) dτ
//! ```
//! with the jump correlator `g` of a [`UleBath`], over
//! `τ ∈ [t - tf, t] ∩ [-W, W]`. The optional Lamb shift
//! ```text
//! Λ = (1/2i) ∫∫ g(τ) g*(τ') sgn(τ' - τ) S̃(t - τ) S̃(t - τ') dτ dτ'
//! ```
//! is evaluated on a composite Gauss-Kronrod rule in linear time, using
//! running sums over the ordered nodes.

use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::{ info, trace };
use crate::{
    bath::{ Bath, UleBath },
    config::SolverConfig,
    dynamics::{ Annealing, CouplingSet, Operator },
    error::{ Error, Result },
    quad::{ self, kronrod_nodes, QuadOptions },
};
use super::{
    anti_commutator, check_tf, commutator, integrate_matrix, DensityGenerator,
    Propagator, PulseAction, Solution,
};

/// Options for the ULE.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UleSolverOptions {
    /// Include the Lamb shift `Λ`.
    pub lamb_shift: bool,
    /// Quadrature panels on each side of `τ = 0` for `Λ`.
    pub lamb_panels: usize,
}

impl Default for UleSolverOptions {
    fn default() -> Self { Self { lamb_shift: true, lamb_panels: 8 } }
}

impl UleSolverOptions {
    /// Drop the Lamb shift.
    pub fn without_lamb_shift(mut self) -> Self {
        self.lamb_shift = false;
        self
    }
}

struct UleGenerator<'a> {
    H: &'a Operator,
    coupling: &'a CouplingSet,
    bath: &'a UleBath,
    U: Propagator<'a>,
    tf: f64,
    quad: QuadOptions,
    opts: UleSolverOptions,
}

impl<'a> UleGenerator<'a> {
    /// Range of `τ` at annealing parameter `s`.
    fn lag_range(&self, s: f64) -> (f64, f64) {
        let t = self.tf * s;
        let W = self.bath.window();
        ((t - self.tf).max(-W), t.min(W))
    }

    fn jump_operators(&self, s: f64, U_s: &nd::Array2<C64>) -> Result<Vec<nd::Array2<C64>>> {
        let n = self.coupling.dim();
        let nc = self.coupling.len();
        let (lo, hi) = self.lag_range(s);
        let points: Vec<f64>
            = if lo < 0.0 && 0.0 < hi { vec![lo, 0.0, hi] } else { vec![lo, hi] };
        let integrand = |tau: f64| -> Result<nd::Array3<C64>> {
            let g = self.bath.jump_correlator(tau)?;
            let s_prime = s - tau / self.tf;
            let mut out: nd::Array3<C64> = nd::Array3::zeros((nc, n, n));
            for (c, op) in self.coupling.iter().enumerate() {
                let X = self.U.transport(U_s, s_prime, &op.evaluate(s_prime))?;
                out.slice_mut(nd::s![c, .., ..]).assign(&(X * g));
            }
            Ok(out)
        };
        let res = quad::try_integrate_points(integrand, &points, &self.quad)?;
        trace!(s, evals = res.evals, error = res.error, "ULE jump operators");
        Ok(res.value.outer_iter().map(|m| m.to_owned()).collect())
    }

    fn lamb_shift(&self, s: f64, U_s: &nd::Array2<C64>) -> Result<nd::Array2<C64>> {
        let n = self.coupling.dim();
        let (lo, hi) = self.lag_range(s);
        let mut nodes: Vec<(f64, f64)> = Vec::new();
        if lo < 0.0 { nodes.extend(kronrod_nodes(lo, hi.min(0.0), self.opts.lamb_panels)); }
        if hi > 0.0 { nodes.extend(kronrod_nodes(lo.max(0.0), hi, self.opts.lamb_panels)); }
        let mut lamb: nd::Array2<C64> = nd::Array2::zeros((n, n));
        for op in self.coupling.iter() {
            // (c_k X_k, conj(c_k) X_k) at each node, ascending in τ
            let terms: Vec<(nd::Array2<C64>, nd::Array2<C64>)>
                = nodes.iter()
                .map(|&(tau, w)| -> Result<(nd::Array2<C64>, nd::Array2<C64>)> {
                    let c = self.bath.jump_correlator(tau)? * w;
                    let s_prime = s - tau / self.tf;
                    let X = self.U.transport(U_s, s_prime, &op.evaluate(s_prime))?;
                    Ok((&X * c, X * c.conj()))
                })
                .collect::<Result<_>>()?;
            let mut total: nd::Array2<C64> = nd::Array2::zeros((n, n));
            terms.iter().for_each(|(_, y)| total += y);
            let mut below: nd::Array2<C64> = nd::Array2::zeros((n, n));
            for (x, y) in terms.iter() {
                // Σ_{l > k} - Σ_{l < k}
                let signed = &total - &below * C64::from(2.0) - y;
                lamb += &x.dot(&signed);
                below += y;
            }
        }
        Ok(lamb * C64::new(0.0, -0.5))
    }
}

impl<'a> DensityGenerator for UleGenerator<'a> {
    fn rhs(&mut self, s: f64, rho: &nd::Array2<C64>) -> Result<nd::Array2<C64>> {
        let U_s = self.U.at(s)?;
        let mut H = self.H.evaluate(s);
        if self.opts.lamb_shift {
            H += &self.lamb_shift(s, &U_s)?;
        }
        let mut drho = commutator(&H, rho) * C64::new(0.0, -1.0);
        for L in self.jump_operators(s, &U_s)?.iter() {
            let Ld = L.t().mapv(|a| a.conj());
            drho = drho + L.dot(rho).dot(&Ld)
                - anti_commutator(&Ld.dot(L), rho) / C64::from(2.0);
        }
        Ok(drho * C64::from(self.tf))
    }
}

/// Solve the universal Lindblad equation over `s ∈ [0, 1]`, given the
/// closed-system propagator `U`.
///
/// Requires a [`UleBath`]; its jump-correlator table is built on first use if
/// it has not been already.
pub fn solve_ule(
    annealing: &Annealing,
    tf: f64,
    U: &Solution<nd::Ix2>,
    opts: &UleSolverOptions,
    config: &SolverConfig,
) -> Result<Solution<nd::Ix2>>
{
    check_tf(tf)?;
    let (coupling, bath) = annealing.open_system("universal Lindblad equation")?;
    let Bath::Ule(bath) = bath else {
        return Err(Error::MissingCapability(format!(
            "universal Lindblad equation needs a jump correlator, but the bath is {}",
            bath.kind(),
        )));
    };
    bath.table()?;
    let gen = UleGenerator {
        H: annealing.hamiltonian(),
        coupling,
        bath,
        U: Propagator::new(U, annealing.dim())?,
        tf,
        quad: config.quad_options(),
        opts: *opts,
    };
    info!(
        tf,
        window = bath.window(),
        lamb_shift = opts.lamb_shift,
        dim = annealing.dim(),
        "solving universal Lindblad equation",
    );
    let sol = integrate_matrix(
        gen, annealing.initial_state().to_density(), PulseAction::Conjugate, config)?;
    info!(steps = sol.t().len(), halted = sol.is_halted(), "universal Lindblad equation done");
    Ok(sol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use approx::assert_relative_eq;
    use crate::{
        bath::{ OhmicBath, UleOptions },
        dynamics::Unit,
        hilbert::{ ket, pauli_x, pauli_z },
        solve::{ min_eigenvalue, solve_unitary, trace },
    };

    fn qubit(eta: f64, beta: f64) -> Annealing {
        let H = Operator::constant(pauli_z().mapv(|a| a / 2.0), Unit::Angular).unwrap();
        let ohmic = OhmicBath::new(eta, 4.0, beta).unwrap();
        let opts = UleOptions { points: 601, ..UleOptions::new(6.0, 160.0) };
        let bath = UleBath::new(Arc::new(ohmic), opts).unwrap();
        Annealing::new(H, ket(0, 2).unwrap()).unwrap()
            .with_coupling(CouplingSet::constant([pauli_x()]).unwrap()).unwrap()
            .with_bath(bath).unwrap()
    }

    #[test]
    fn relaxes_toward_thermal_state() {
        let annealing = qubit(1e-2, 1.0);
        let tf = 40.0;
        let config = SolverConfig::default().with_tolerances(1e-7, 1e-6);
        let U = solve_unitary(&annealing, tf, &SolverConfig::default()).unwrap();
        let sol = solve_ule(&annealing, tf, &U, &UleSolverOptions::default(), &config).unwrap();
        let rho = sol.last().unwrap();
        let gibbs = 1.0 / (1.0 + (-1.0_f64).exp());
        assert_relative_eq!(trace(rho).re, 1.0, epsilon = 1e-6);
        assert_relative_eq!(rho[[1, 1]].re, gibbs, epsilon = 5e-2);
        for rho in sol.u().iter() {
            assert!(min_eigenvalue(rho).unwrap() > -1e-6);
        }
    }

    #[test]
    fn lamb_shift_is_hermitian() {
        let annealing = qubit(0.1, 4.0);
        let U = solve_unitary(&annealing, 10.0, &SolverConfig::default()).unwrap();
        let (coupling, bath) = annealing.open_system("test").unwrap();
        let Bath::Ule(bath) = bath else { panic!("expected a ULE bath") };
        let gen = UleGenerator {
            H: annealing.hamiltonian(),
            coupling,
            bath,
            U: Propagator::new(&U, 2).unwrap(),
            tf: 10.0,
            quad: QuadOptions::default(),
            opts: UleSolverOptions::default(),
        };
        let U_s = U.eval(0.5).unwrap();
        let lamb = gen.lamb_shift(0.5, &U_s).unwrap();
        for ((i, j), x) in lamb.indexed_iter() {
            assert_relative_eq!(x.re, lamb[[j, i]].re, epsilon = 1e-8);
            assert_relative_eq!(x.im, -lamb[[j, i]].im, epsilon = 1e-8);
        }
        assert_eq!(gen.lag_range(0.5), (-5.0, 5.0));
        assert_eq!(gen.lag_range(0.1), (-6.0, 1.0));
    }

    #[test]
    fn requires_jump_correlator() {
        let annealing = crate::solve::redfield::tests::thermalizing_qubit();
        let config = SolverConfig::default();
        let U = solve_unitary(&annealing, 1.0, &config).unwrap();
        assert!(matches!(
            solve_ule(&annealing, 1.0, &U, &UleSolverOptions::default(), &config),
            Err(Error::MissingCapability(_)),
        ));
    }
}
