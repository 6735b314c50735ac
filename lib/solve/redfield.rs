//! Redfield master equation with a finite memory depth.
//!
//! In physical time,
//! ```text
//! dρ/dt = -i[H, ρ] - Σ_(a,b) ([S_a, Λ_ab ρ] + [ρ Λ_ab†, S_a†])
//! Λ_ab(t) = ∫_0^min(t, Ta) C_ab(τ) U(t, t - τ) S_b(t - τ) U†(t, t - τ) dτ
//! ```
//! where `U(t, t')` is the closed-system propagator and `Ta` the memory depth.
//! The kernel `Λ` is computed by matrix-valued adaptive quadrature and cached
//! for the most recent value of `s`.

use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::{ info, trace };
use crate::{
    bath::Bath,
    config::SolverConfig,
    dynamics::{ Annealing, CouplingSet, Operator },
    error::{ Error, Result },
    quad::{ self, QuadOptions },
};
use super::{
    check_tf, commutator, integrate_matrix, DensityGenerator, Propagator,
    PulseAction, Solution,
};

pub(crate) struct RedfieldGenerator<'a> {
    H: &'a Operator,
    coupling: &'a CouplingSet,
    bath: &'a Bath,
    pairs: Vec<(usize, usize)>,
    U: Propagator<'a>,
    tf: f64,
    Ta: f64,
    quad: QuadOptions,
    cache: Option<(f64, Vec<nd::Array2<C64>>)>,
}

impl<'a> RedfieldGenerator<'a> {
    pub(crate) fn new(
        annealing: &'a Annealing,
        tf: f64,
        U: &'a Solution<nd::Ix2>,
        Ta: f64,
        config: &SolverConfig,
    ) -> Result<Self>
    {
        check_tf(tf)?;
        if !(Ta > 0.0 && Ta.is_finite()) {
            return Err(Error::InvalidParameter(
                format!("memory depth must be positive and finite, got {Ta}")));
        }
        let (coupling, bath) = annealing.open_system("Redfield equation")?;
        let U = Propagator::new(U, annealing.dim())?;
        Ok(Self {
            H: annealing.hamiltonian(),
            coupling,
            bath,
            pairs: bath.channel_pairs(coupling.len()),
            U,
            tf,
            Ta,
            quad: config.quad_options(),
            cache: None,
        })
    }

    fn compute_kernel(&self, s: f64) -> Result<Vec<nd::Array2<C64>>> {
        let n = self.coupling.dim();
        let t = self.tf * s;
        let upper = t.min(self.Ta);
        let U_s = self.U.at(s)?;
        let npairs = self.pairs.len();
        let integrand = |tau: f64| -> Result<nd::Array3<C64>> {
            let s_prime = s - tau / self.tf;
            let mut out: nd::Array3<C64> = nd::Array3::zeros((npairs, n, n));
            for (k, &(a, b)) in self.pairs.iter().enumerate() {
                let c = self.bath.correlation(a, b, tau);
                if c == C64::from(0.0) { continue; }
                let S_b
                    = self.coupling.evaluate_one(b, s_prime)
                    .ok_or(Error::ChannelCount { bath: b + 1, coupling: self.coupling.len() })?;
                let S_tilde = self.U.transport(&U_s, s_prime, &S_b)?;
                out.slice_mut(nd::s![k, .., ..]).assign(&(S_tilde * c));
            }
            Ok(out)
        };
        let res = quad::try_integrate(integrand, 0.0, upper, &self.quad)?;
        trace!(s, evals = res.evals, error = res.error, "Redfield kernel");
        Ok(res.value.outer_iter().map(|m| m.to_owned()).collect())
    }

    fn kernel(&mut self, s: f64) -> Result<&[nd::Array2<C64>]> {
        let fresh = !matches!(&self.cache, Some((s_cached, _)) if *s_cached == s);
        if fresh {
            let lambda = self.compute_kernel(s)?;
            self.cache = Some((s, lambda));
        }
        Ok(self.cache.as_ref().map(|(_, l)| l.as_slice()).unwrap_or(&[]))
    }
}

impl<'a> DensityGenerator for RedfieldGenerator<'a> {
    fn rhs(&mut self, s: f64, rho: &nd::Array2<C64>) -> Result<nd::Array2<C64>> {
        let H = self.H.evaluate(s);
        let S = self.coupling.evaluate(s);
        let pairs = self.pairs.clone();
        let lambda = self.kernel(s)?;
        let mut drho = commutator(&H, rho) * C64::new(0.0, -1.0);
        for (L, &(a, _)) in lambda.iter().zip(pairs.iter()) {
            let S_a = &S[a];
            let S_a_dag = S_a.t().mapv(|x| x.conj());
            let L_rho = L.dot(rho);
            let rho_L_dag = rho.dot(&L.t().mapv(|x| x.conj()));
            drho = drho - commutator(S_a, &L_rho) - commutator(&rho_L_dag, &S_a_dag);
        }
        Ok(drho * C64::from(self.tf))
    }
}

/// Solve the Redfield equation over `s ∈ [0, 1]` with memory depth `Ta` (ns),
/// given the closed-system propagator `U` from [`solve_unitary`][super::solve_unitary].
///
/// `Ta` should cover the decay of the bath correlation function; larger values
/// cost more per step. Cross-correlated baths contribute one kernel per listed
/// channel pair.
pub fn solve_redfield(
    annealing: &Annealing,
    tf: f64,
    U: &Solution<nd::Ix2>,
    Ta: f64,
    config: &SolverConfig,
) -> Result<Solution<nd::Ix2>>
{
    let gen = RedfieldGenerator::new(annealing, tf, U, Ta, config)?;
    info!(
        tf,
        Ta,
        dim = annealing.dim(),
        pairs = gen.pairs.len(),
        positivity_check = config.positivity_threshold.is_some(),
        "solving Redfield equation",
    );
    let sol = integrate_matrix(
        gen, annealing.initial_state().to_density(), PulseAction::Conjugate, config)?;
    info!(steps = sol.t().len(), halted = sol.is_halted(), "Redfield equation done");
    Ok(sol)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::{
        bath::OhmicBath,
        dynamics::Unit,
        hilbert::{ ket, pauli_x, pauli_z },
        solve::{ solve_unitary, trace },
    };

    /// `H = σz / 2` coupled through `σx` to an Ohmic bath at `β = 1`, starting
    /// in the excited state.
    pub(crate) fn thermalizing_qubit() -> Annealing {
        let H = Operator::constant(pauli_z().mapv(|a| a / 2.0), Unit::Angular).unwrap();
        let bath = OhmicBath::new(1e-2, 8.0 * std::f64::consts::PI, 1.0).unwrap();
        Annealing::new(H, ket(0, 2).unwrap()).unwrap()
            .with_coupling(CouplingSet::constant([pauli_x()]).unwrap()).unwrap()
            .with_bath(bath).unwrap()
    }

    /// Ground-state population of the Gibbs state of [`thermalizing_qubit`].
    pub(crate) fn gibbs_ground() -> f64 { 1.0 / (1.0 + (-1.0_f64).exp()) }

    #[test]
    fn relaxes_to_thermal_state() {
        let annealing = thermalizing_qubit();
        let tf = 60.0;
        let config = SolverConfig::default().with_tolerances(1e-8, 1e-7);
        let U = solve_unitary(&annealing, tf, &config).unwrap();
        let sol = solve_redfield(&annealing, tf, &U, 4.0, &config).unwrap();
        let rho = sol.last().unwrap();
        assert_relative_eq!(trace(rho).re, 1.0, epsilon = 1e-6);
        assert_relative_eq!(rho[[1, 1]].re, gibbs_ground(), epsilon = 2e-2);
        assert!(rho[[0, 1]].norm() < 2e-2);
    }

    #[test]
    fn requires_open_system() {
        let H = Operator::constant(pauli_z(), Unit::Angular).unwrap();
        let closed = Annealing::new(H, ket(0, 2).unwrap()).unwrap();
        let config = SolverConfig::default();
        let U = solve_unitary(&closed, 1.0, &config).unwrap();
        assert!(matches!(
            solve_redfield(&closed, 1.0, &U, 1.0, &config),
            Err(Error::MissingCapability(_)),
        ));
    }

    #[test]
    fn memory_depth_must_be_positive() {
        let annealing = thermalizing_qubit();
        let config = SolverConfig::default();
        let U = solve_unitary(&annealing, 1.0, &config).unwrap();
        assert!(matches!(
            solve_redfield(&annealing, 1.0, &U, 0.0, &config),
            Err(Error::InvalidParameter(_)),
        ));
    }

    #[test]
    fn propagator_dimension_checked() {
        let annealing = thermalizing_qubit();
        let config = SolverConfig::default();
        let H3 = Operator::constant(crate::hilbert::identity(3), Unit::Angular).unwrap();
        let qutrit = Annealing::new(H3, ket(0, 3).unwrap()).unwrap();
        let U3 = solve_unitary(&qutrit, 1.0, &config).unwrap();
        assert!(matches!(
            solve_redfield(&annealing, 1.0, &U3, 1.0, &config),
            Err(Error::Dimension(_)),
        ));
    }
}
