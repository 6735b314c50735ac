//! Evolution of a pure state under the Schrödinger equation.

use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::{ debug, info };
use crate::{
    config::SolverConfig,
    dynamics::{ Annealing, Operator },
    error::{ Error, Result },
    ode::{ self, OdeSystem, State },
};
use super::{ check_pulses, check_tf, Pulse, Solution };

pub(crate) struct SchrodingerSystem<'a> {
    pub(crate) H: &'a Operator,
    pub(crate) tf: f64,
    pub(crate) pulses: &'a [Pulse],
}

impl<'a> OdeSystem<nd::Ix1> for SchrodingerSystem<'a> {
    fn rhs(&mut self, s: f64, psi: &State<nd::Ix1>) -> Result<State<nd::Ix1>> {
        Ok(self.H.evaluate(s).dot(psi) * C64::new(0.0, -self.tf))
    }

    fn on_tstop(&mut self, s: f64, psi: &mut State<nd::Ix1>) -> Result<bool> {
        apply_pulses(self.pulses, s, psi)
    }
}

pub(crate) fn apply_pulses(pulses: &[Pulse], s: f64, psi: &mut nd::Array1<C64>)
    -> Result<bool>
{
    let mut applied = false;
    for pulse in pulses.iter().filter(|p| p.s == s) {
        debug!(s, "applying pulse");
        *psi = pulse.U.dot(&*psi);
        applied = true;
    }
    Ok(applied)
}

/// Solve `dψ/ds = -i tf H(s) ψ` over `s ∈ [0, 1]`.
///
/// Requires a pure initial state.
pub fn solve_schrodinger(annealing: &Annealing, tf: f64, config: &SolverConfig)
    -> Result<Solution<nd::Ix1>>
{
    check_tf(tf)?;
    let psi0
        = annealing.initial_state().as_pure()
        .ok_or_else(|| Error::InvalidState(
            "Schrödinger evolution needs a pure initial state".into()))?
        .clone();
    check_pulses(&config.pulses, annealing.dim())?;
    info!(tf, dim = annealing.dim(), "solving Schrödinger equation");
    let mut system = SchrodingerSystem {
        H: annealing.hamiltonian(),
        tf,
        pulses: &config.pulses,
    };
    ode::solve(&mut system, psi0, (0.0, 1.0), &config.ode_options())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use approx::assert_relative_eq;
    use crate::{
        dynamics::Unit,
        hilbert::{ ket, pauli_x, pauli_z, plus_state },
    };

    #[test]
    fn rabi_oscillation() {
        // H = σx: |0> -> cos t |0> - i sin t |1>
        let H = Operator::constant(pauli_x(), Unit::Angular).unwrap();
        let annealing = Annealing::new(H, ket(0, 2).unwrap()).unwrap();
        let tf = PI / 4.0;
        let config = SolverConfig::default().with_tolerances(1e-10, 1e-10);
        let sol = solve_schrodinger(&annealing, tf, &config).unwrap();
        let psi = sol.last().unwrap();
        assert_relative_eq!(psi[0].norm_sqr(), 0.5, epsilon = 1e-7);
        assert_relative_eq!(psi[1].norm_sqr(), 0.5, epsilon = 1e-7);
        let mid = sol.eval(0.5).unwrap();
        assert_relative_eq!(mid[1].norm_sqr(), (PI / 8.0).sin().powi(2), epsilon = 1e-6);
    }

    #[test]
    fn pulse_flips_state() {
        // X pulse halfway through a diagonal evolution
        let H = Operator::constant(pauli_z(), Unit::Angular).unwrap();
        let annealing = Annealing::new(H, ket(0, 2).unwrap()).unwrap();
        let config = SolverConfig::default().with_pulse(Pulse::new(0.5, pauli_x()));
        let sol = solve_schrodinger(&annealing, 1.0, &config).unwrap();
        let k = sol.t().iter().position(|&s| s == 0.5).unwrap();
        assert_eq!(sol.t()[k + 1], 0.5);
        assert_relative_eq!(sol.u()[k][0].norm_sqr(), 1.0, epsilon = 1e-8);
        assert_relative_eq!(sol.u()[k + 1][1].norm_sqr(), 1.0, epsilon = 1e-8);
        assert_relative_eq!(sol.eval(0.5).unwrap()[1].norm_sqr(), 1.0, epsilon = 1e-8);
        assert_relative_eq!(sol.last().unwrap()[1].norm_sqr(), 1.0, epsilon = 1e-8);
    }

    #[test]
    fn density_initial_state_rejected() {
        let H = Operator::constant(pauli_z(), Unit::Angular).unwrap();
        let rho = crate::hilbert::outer_prod(&plus_state(1), &plus_state(1));
        let annealing = Annealing::new(H, rho).unwrap();
        assert!(matches!(
            solve_schrodinger(&annealing, 1.0, &SolverConfig::default()),
            Err(Error::InvalidState(_)),
        ));
    }

    #[test]
    fn nonpositive_time_rejected() {
        let H = Operator::constant(pauli_z(), Unit::Angular).unwrap();
        let annealing = Annealing::new(H, ket(0, 2).unwrap()).unwrap();
        assert!(matches!(
            solve_schrodinger(&annealing, 0.0, &SolverConfig::default()),
            Err(Error::InvalidParameter(_)),
        ));
    }
}
