//! Schrödinger evolution under sampled classical telegraph noise,
//! `H(s) + Σ_c n_c(tf s) S_c(s)`.
//!
//! Every coupling channel sees its own independent realization of the
//! fluctuator noise. Switching times are integrator stop points, so the
//! noise is constant over every step.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    bath::TelegraphNoise,
    dynamics::{ CouplingSet, Operator },
    error::Result,
    ode::{ OdeSystem, State },
    solve::{ schrodinger::apply_pulses, Pulse },
};

pub(crate) struct NoiseSystem<'a> {
    H: &'a Operator,
    coupling: &'a CouplingSet,
    tf: f64,
    pulses: &'a [Pulse],
    noise: Vec<TelegraphNoise>,
    segment: Vec<usize>,
}

impl<'a> NoiseSystem<'a> {
    pub(crate) fn new(
        H: &'a Operator,
        coupling: &'a CouplingSet,
        tf: f64,
        pulses: &'a [Pulse],
        noise: Vec<TelegraphNoise>,
    ) -> Self
    {
        let segment = vec![0; noise.len()];
        Self { H, coupling, tf, pulses, noise, segment }
    }

    /// Switching times of all channels, in units of `s`.
    pub(crate) fn stops(&self) -> Vec<f64> {
        self.noise.iter()
            .flat_map(|n| n.switch_times().iter().map(|t| t / self.tf))
            .collect()
    }
}

impl<'a> OdeSystem<nd::Ix1> for NoiseSystem<'a> {
    fn rhs(&mut self, s: f64, psi: &State<nd::Ix1>) -> Result<State<nd::Ix1>> {
        let mut H = self.H.evaluate(s);
        for ((op, noise), &k) in self.coupling.iter().zip(&self.noise).zip(&self.segment) {
            H.scaled_add(C64::from(noise.values()[k]), &op.evaluate(s));
        }
        Ok(H.dot(psi) * C64::new(0.0, -self.tf))
    }

    fn on_tstop(&mut self, s: f64, psi: &mut State<nd::Ix1>) -> Result<bool> {
        let mut switched = false;
        for (noise, k) in self.noise.iter().zip(self.segment.iter_mut()) {
            let times = noise.switch_times();
            while *k < times.len() && times[*k] / self.tf <= s {
                *k += 1;
                switched = true;
            }
        }
        let pulsed = apply_pulses(self.pulses, s, psi)?;
        Ok(switched || pulsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{ rngs::StdRng, SeedableRng };
    use crate::{
        bath::FluctuatorEnsemble,
        dynamics::Unit,
        hilbert::{ pauli_z, plus_state },
        ode::{ self, OdeOptions },
    };

    #[test]
    fn noise_segments_follow_switches() {
        let H = Operator::constant(nd::Array2::zeros((2, 2)), Unit::Angular).unwrap();
        let coupling = CouplingSet::constant([pauli_z()]).unwrap();
        let fluct = FluctuatorEnsemble::new(vec![1.0], vec![5.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let noise = fluct.sample(&mut rng, 2.0);
        let nswitch = noise.num_switches();
        let mut system = NoiseSystem::new(&H, &coupling, 2.0, &[], vec![noise.clone()]);
        let mut opts = OdeOptions::new(1e-10, 1e-10);
        opts.tstops = system.stops();
        let sol = ode::solve(&mut system, plus_state(1), (0.0, 1.0), &opts).unwrap();
        assert_eq!(system.segment[0], nswitch);
        // relative phase accumulates as 2 ∫ n(t) dt
        let mut phase = 0.0;
        let mut t_prev = 0.0;
        for (t, v) in noise.switch_times().iter().chain([2.0].iter()).zip(noise.values()) {
            phase += 2.0 * v * (t - t_prev);
            t_prev = *t;
        }
        let psi = sol.last().unwrap();
        let rel = psi[1] * psi[0].conj() * 2.0;
        approx::assert_relative_eq!(rel.re, phase.cos(), epsilon = 1e-6);
        approx::assert_relative_eq!(rel.im, phase.sin(), epsilon = 1e-6);
    }
}
