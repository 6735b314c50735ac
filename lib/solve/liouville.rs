//! Evolution of a density matrix under the von Neumann equation, or under
//! any caller-supplied generator.

use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::info;
use crate::{
    config::SolverConfig,
    dynamics::{ Annealing, Operator },
    error::Result,
};
use super::{
    check_tf, commutator, integrate_matrix, DensityGenerator, PulseAction,
    Solution,
};

pub(crate) struct VonNeumann<'a> {
    H: &'a Operator,
    tf: f64,
}

impl<'a> DensityGenerator for VonNeumann<'a> {
    fn rhs(&mut self, s: f64, rho: &nd::Array2<C64>) -> Result<nd::Array2<C64>> {
        Ok(commutator(&self.H.evaluate(s), rho) * C64::new(0.0, -self.tf))
    }
}

/// Solve `dρ/ds = -i tf [H(s), ρ]` over `s ∈ [0, 1]`.
///
/// Pure initial states are promoted to density matrices.
pub fn solve_von_neumann(annealing: &Annealing, tf: f64, config: &SolverConfig)
    -> Result<Solution<nd::Ix2>>
{
    check_tf(tf)?;
    info!(tf, dim = annealing.dim(), vectorize = config.vectorize, "solving von Neumann equation");
    let gen = VonNeumann { H: annealing.hamiltonian(), tf };
    integrate_matrix(gen, annealing.initial_state().to_density(), PulseAction::Conjugate, config)
}

/// Integrate a caller-supplied density-matrix generator `dρ/ds` over
/// `s ∈ [0, 1]`, starting from the annealing's initial state.
///
/// The generator sees the same pulses, positivity check, and vectorization
/// setting as the built-in solvers; it is responsible for its own factor of
/// `tf`, which is only validated here. Errors it returns are passed through
/// unchanged.
pub fn solve_density_with<G>(
    annealing: &Annealing,
    tf: f64,
    generator: G,
    config: &SolverConfig,
) -> Result<Solution<nd::Ix2>>
where G: DensityGenerator
{
    check_tf(tf)?;
    info!(tf, dim = annealing.dim(), "solving custom density-matrix generator");
    integrate_matrix(
        generator, annealing.initial_state().to_density(), PulseAction::Conjugate, config)
}
