//! Evolution of the full propagator `U(s)`.

use ndarray as nd;
use ndarray_linalg::Determinant;
use num_complex::Complex64 as C64;
use tracing::info;
use crate::{
    config::SolverConfig,
    dynamics::{ Annealing, Operator },
    error::Result,
};
use super::{ check_tf, integrate_matrix, DensityGenerator, PulseAction, Solution };

struct UnitaryGenerator<'a> {
    H: &'a Operator,
    tf: f64,
}

impl<'a> DensityGenerator for UnitaryGenerator<'a> {
    fn rhs(&mut self, s: f64, U: &nd::Array2<C64>) -> Result<nd::Array2<C64>> {
        Ok(self.H.evaluate(s).dot(U) * C64::new(0.0, -self.tf))
    }
}

/// Solve `dU/ds = -i tf H(s) U` with `U(0) = I` over `s ∈ [0, 1]`.
///
/// The result is the propagator consumed by the Redfield-family solvers, and
/// is independent of the annealing's initial state.
pub fn solve_unitary(annealing: &Annealing, tf: f64, config: &SolverConfig)
    -> Result<Solution<nd::Ix2>>
{
    check_tf(tf)?;
    info!(tf, dim = annealing.dim(), vectorize = config.vectorize, "solving for the propagator");
    let gen = UnitaryGenerator { H: annealing.hamiltonian(), tf };
    let U0: nd::Array2<C64> = nd::Array2::eye(annealing.dim());
    integrate_matrix(gen, U0, PulseAction::Left, config)
}

/// `|det U|`, which stays at 1 for an accurate unitary evolution.
pub fn det_magnitude(U: &nd::Array2<C64>) -> Result<f64> {
    Ok(U.det()?.norm())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::{
        dynamics::Unit,
        hilbert::{ pauli_x, pauli_z, plus_state },
        solve::solve_schrodinger,
    };

    fn annealing() -> Annealing {
        let H = Operator::annealing(
            |s| 1.0 - s, |s| s, pauli_x(), pauli_z(), Unit::Linear,
        ).unwrap();
        Annealing::new(H, plus_state(1)).unwrap()
    }

    #[test]
    fn propagates_schrodinger_solution() {
        let annealing = annealing();
        let config = SolverConfig::default().with_tolerances(1e-10, 1e-10);
        let U = solve_unitary(&annealing, 3.0, &config).unwrap();
        let psi = solve_schrodinger(&annealing, 3.0, &config).unwrap();
        let psi0 = plus_state(1);
        for &s in [0.2, 0.6, 1.0].iter() {
            let via_U = U.eval(s).unwrap().dot(&psi0);
            let direct = psi.eval(s).unwrap();
            for (a, b) in via_U.iter().zip(direct.iter()) {
                assert_relative_eq!(a.re, b.re, epsilon = 1e-6);
                assert_relative_eq!(a.im, b.im, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn determinant_conserved() {
        let annealing = annealing();
        let config = SolverConfig::default().with_tolerances(1e-10, 1e-10);
        let U = solve_unitary(&annealing, 3.0, &config).unwrap();
        for u in U.u().iter() {
            assert_relative_eq!(det_magnitude(u).unwrap(), 1.0, epsilon = 1e-7);
        }
        let flat = solve_unitary(&annealing, 3.0, &config.with_vectorize(true)).unwrap();
        assert_relative_eq!(det_magnitude(flat.last().unwrap()).unwrap(), 1.0, epsilon = 1e-7);
    }
}
