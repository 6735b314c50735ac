//! Ensembles of independently seeded stochastic trajectories.
//!
//! [`build_ensembles`] validates a problem once and returns an
//! [`EnsembleBuilder`], from which any trajectory can be solved on its own by
//! index. Every trajectory deep-copies the mutable caches it needs and draws
//! from its own random number generator, seeded from the base seed and its
//! index only, so results do not depend on the execution [`Strategy`].

use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ rngs::StdRng, SeedableRng };
use rayon::prelude::*;
use tracing::{ debug, info };
use crate::{
    bath::{ Bath, FluctuatorEnsemble },
    config::SolverConfig,
    dynamics::{ Annealing, CouplingSet, Operator },
    error::{ Error, Result },
    hilbert::outer_prod,
    ode::{ self, Solution },
    solve::{ ame::{ AmeModel, AmeOptions }, check_pulses, check_tf },
};

pub mod qtraj;
pub mod stochastic;

use qtraj::JumpSystem;
use stochastic::NoiseSystem;

/// Type of stochastic unraveling.
#[derive(Clone, Debug, PartialEq)]
pub enum EnsembleKind {
    /// Quantum-jump trajectories of the adiabatic master equation.
    Ame(AmeOptions),
    /// Schrödinger evolution under sampled fluctuator noise.
    Stochastic,
}

/// How trajectories are distributed over threads.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// One after another on the calling thread.
    #[default]
    Serial,
    /// On rayon's global thread pool.
    Threads,
    /// On a dedicated pool of the given number of threads.
    Pool(usize),
}

/// Settings shared by every trajectory of an ensemble.
#[derive(Clone, Debug, Default)]
pub struct EnsembleOptions {
    /// Base seed from which every trajectory's seed is derived.
    pub seed: u64,
    /// Integrator settings and pulses.
    pub config: SolverConfig,
}

impl EnsembleOptions {
    /// Set the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the solver configuration.
    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }
}

/// Seed of trajectory `index`: a splitmix64 mix of the base seed and index.
pub fn trajectory_seed(base: u64, index: usize) -> u64 {
    let mut z
        = base.wrapping_add(
            (index as u64).wrapping_add(1).wrapping_mul(0x9e3779b97f4a7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

#[derive(Clone, Debug)]
enum Prototype {
    Jump(AmeModel),
    Noise {
        H: Operator,
        coupling: CouplingSet,
        fluctuators: FluctuatorEnsemble,
    },
}

/// Validated ensemble problem; solves individual trajectories on demand.
#[derive(Clone, Debug)]
pub struct EnsembleBuilder {
    prototype: Prototype,
    psi0: nd::Array1<C64>,
    tf: f64,
    seed: u64,
    config: SolverConfig,
}

/// Validate a problem for stochastic unraveling.
///
/// Trajectories evolve state vectors, so the initial state must be pure.
/// [`EnsembleKind::Ame`] has the requirements of
/// [`solve_ame`][crate::solve::solve_ame]; [`EnsembleKind::Stochastic`] needs
/// coupling operators and a [`FluctuatorEnsemble`] bath.
pub fn build_ensembles(
    annealing: &Annealing,
    tf: f64,
    kind: EnsembleKind,
    options: EnsembleOptions,
) -> Result<EnsembleBuilder>
{
    check_tf(tf)?;
    check_pulses(&options.config.pulses, annealing.dim())?;
    let psi0
        = annealing.initial_state().as_pure()
        .ok_or_else(|| Error::InvalidState(
            "trajectory ensembles need a pure initial state".into()))?
        .clone();
    let prototype = match kind {
        EnsembleKind::Ame(opts) => Prototype::Jump(AmeModel::new(annealing, &opts)?),
        EnsembleKind::Stochastic => {
            let (coupling, bath) = annealing.open_system("stochastic ensemble")?;
            let Bath::Fluctuator(fluctuators) = bath else {
                return Err(Error::MissingCapability(format!(
                    "stochastic ensembles sample fluctuator noise, but the bath is {}",
                    bath.kind(),
                )));
            };
            Prototype::Noise {
                H: annealing.hamiltonian().clone(),
                coupling: coupling.clone(),
                fluctuators: fluctuators.clone(),
            }
        },
    };
    Ok(EnsembleBuilder { prototype, psi0, tf, seed: options.seed, config: options.config })
}

impl EnsembleBuilder {
    /// Seed of trajectory `index`.
    pub fn seed_of(&self, index: usize) -> u64 { trajectory_seed(self.seed, index) }

    /// Solve trajectory `index`.
    pub fn trajectory(&self, index: usize) -> Result<Solution<nd::Ix1>> {
        let mut rng = StdRng::seed_from_u64(self.seed_of(index));
        let mut opts = self.config.ode_options();
        let pulses = self.config.pulses.as_slice();
        let span = (0.0, 1.0);
        match &self.prototype {
            Prototype::Jump(model) => {
                let mut system = JumpSystem::new(model.clone(), self.tf, pulses, rng);
                let sol = ode::solve(&mut system, self.psi0.clone(), span, &opts)?;
                debug!(index, jumps = system.jumps, "trajectory done");
                Ok(sol)
            },
            Prototype::Noise { H, coupling, fluctuators } => {
                let noise
                    = (0..coupling.len())
                    .map(|_| fluctuators.sample(&mut rng, self.tf))
                    .collect();
                let mut system = NoiseSystem::new(H, coupling, self.tf, pulses, noise);
                opts.tstops.extend(system.stops());
                let sol = ode::solve(&mut system, self.psi0.clone(), span, &opts)?;
                debug!(index, stops = opts.tstops.len(), "trajectory done");
                Ok(sol)
            },
        }
    }

    /// Solve trajectories `0..n`.
    pub fn run(&self, n: usize, strategy: Strategy) -> Result<TrajectoryEnsemble> {
        info!(n, ?strategy, tf = self.tf, "running trajectory ensemble");
        let trajectories: Vec<Solution<nd::Ix1>> = match strategy {
            Strategy::Serial
                => (0..n).map(|k| self.trajectory(k)).collect::<Result<Vec<_>>>()?,
            Strategy::Threads
                => (0..n).into_par_iter()
                .map(|k| self.trajectory(k))
                .collect::<Result<Vec<_>>>()?,
            Strategy::Pool(threads) => {
                let pool
                    = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(Error::external)?;
                pool.install(|| {
                    (0..n).into_par_iter()
                        .map(|k| self.trajectory(k))
                        .collect::<Result<Vec<_>>>()
                })?
            },
        };
        info!(n, "trajectory ensemble done");
        Ok(TrajectoryEnsemble { trajectories })
    }
}

/// Per-time mean and standard error of an observable over an ensemble.
#[derive(Clone, Debug, PartialEq)]
pub struct EnsembleStatistics {
    pub mean: Vec<f64>,
    /// `stddev / sqrt(N)`
    pub sem: Vec<f64>,
}

/// Solved trajectories.
#[derive(Clone, Debug)]
pub struct TrajectoryEnsemble {
    trajectories: Vec<Solution<nd::Ix1>>,
}

impl TrajectoryEnsemble {
    /// Number of trajectories.
    pub fn len(&self) -> usize { self.trajectories.len() }

    /// Return `true` if there are no trajectories.
    pub fn is_empty(&self) -> bool { self.trajectories.is_empty() }

    /// The individual solutions.
    pub fn trajectories(&self) -> &[Solution<nd::Ix1>] { &self.trajectories }

    fn normalized_states(&self, s: f64) -> Result<Vec<nd::Array1<C64>>> {
        self.trajectories.iter()
            .map(|sol| {
                let psi = sol.eval(s)?;
                let norm = psi.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt();
                Ok(psi / C64::from(norm))
            })
            .collect()
    }

    /// Mean and standard error of `f` over the normalized trajectory states at
    /// each of `ts`.
    pub fn statistics<F>(&self, ts: &[f64], f: F) -> Result<EnsembleStatistics>
    where F: Fn(&nd::Array1<C64>) -> f64
    {
        let n = self.len();
        if n == 0 {
            return Err(Error::InvalidParameter("empty trajectory ensemble".into()));
        }
        let mut mean: Vec<f64> = Vec::with_capacity(ts.len());
        let mut sem: Vec<f64> = Vec::with_capacity(ts.len());
        for &s in ts.iter() {
            let x: Vec<f64> = self.normalized_states(s)?.iter().map(&f).collect();
            let m = x.iter().sum::<f64>() / n as f64;
            let var
                = if n > 1 {
                    x.iter().map(|xk| (xk - m).powi(2)).sum::<f64>() / (n - 1) as f64
                } else {
                    0.0
                };
            mean.push(m);
            sem.push((var / n as f64).sqrt());
        }
        Ok(EnsembleStatistics { mean, sem })
    }

    /// Ensemble-averaged density matrix at each of `ts`.
    pub fn density(&self, ts: &[f64]) -> Result<Vec<nd::Array2<C64>>> {
        let n = self.len();
        if n == 0 {
            return Err(Error::InvalidParameter("empty trajectory ensemble".into()));
        }
        ts.iter()
            .map(|&s| {
                let states = self.normalized_states(s)?;
                let dim = states[0].len();
                let mut rho: nd::Array2<C64> = nd::Array2::zeros((dim, dim));
                states.iter().for_each(|psi| rho += &outer_prod(psi, psi));
                Ok(rho / C64::from(n as f64))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::{
        bath::OhmicBath,
        dynamics::Unit,
        hilbert::{ expectation_pure, ket, pauli_x, pauli_z, plus_state },
        solve::{ redfield::tests::thermalizing_qubit, solve_ame, trace },
    };

    fn telegraph_dephasing() -> Annealing {
        let H = Operator::constant(nd::Array2::zeros((2, 2)), Unit::Angular).unwrap();
        let fluct = FluctuatorEnsemble::new(vec![0.5], vec![2.0]).unwrap();
        Annealing::new(H, plus_state(1)).unwrap()
            .with_coupling(CouplingSet::constant([pauli_z()]).unwrap()).unwrap()
            .with_bath(fluct).unwrap()
    }

    /// `⟨σx⟩` under `H = n(t) σz` for a single fluctuator of amplitude `b` and
    /// switching rate `γ`, valid for `γ > 2b`.
    fn telegraph_coherence(b: f64, gamma: f64, t: f64) -> f64 {
        let omega = (gamma * gamma - 4.0 * b * b).sqrt();
        (-gamma * t).exp() * ((omega * t).cosh() + gamma / omega * (omega * t).sinh())
    }

    #[test]
    fn seeds_are_distinct_and_reproducible() {
        let seeds: Vec<u64> = (0..1000).map(|k| trajectory_seed(42, k)).collect();
        let mut sorted = seeds.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), seeds.len());
        assert_eq!(trajectory_seed(42, 17), seeds[17]);
        assert_ne!(trajectory_seed(43, 17), seeds[17]);
    }

    #[test]
    fn fluctuator_mean_matches_closed_form() {
        let annealing = telegraph_dephasing();
        let tf = 1.0;
        let builder = build_ensembles(
            &annealing, tf, EnsembleKind::Stochastic,
            EnsembleOptions::default().with_seed(1234),
        ).unwrap();
        let ensemble = builder.run(400, Strategy::Threads).unwrap();
        let ts = [0.25, 0.5, 1.0];
        let stats = ensemble.statistics(&ts, |psi| expectation_pure(&pauli_x(), psi).re)
            .unwrap();
        for ((&s, m), e) in ts.iter().zip(&stats.mean).zip(&stats.sem) {
            let exact = telegraph_coherence(0.5, 2.0, tf * s);
            assert!((m - exact).abs() < 4.0 * e + 1e-3, "s = {s}: {m} vs {exact} ± {e}");
        }
    }

    #[test]
    fn standard_error_shrinks_with_size() {
        let annealing = telegraph_dephasing();
        let builder = build_ensembles(
            &annealing, 1.0, EnsembleKind::Stochastic,
            EnsembleOptions::default().with_seed(99),
        ).unwrap();
        let obs = |psi: &nd::Array1<C64>| expectation_pure(&pauli_x(), psi).re;
        let small = builder.run(100, Strategy::Serial).unwrap().statistics(&[1.0], obs).unwrap();
        let large = builder.run(400, Strategy::Threads).unwrap().statistics(&[1.0], obs).unwrap();
        let ratio = small.sem[0] / large.sem[0];
        assert!(ratio > 1.5 && ratio < 2.6, "ratio {ratio}");
    }

    #[test]
    fn strategies_agree() {
        let annealing = telegraph_dephasing();
        let builder = build_ensembles(
            &annealing, 1.0, EnsembleKind::Stochastic,
            EnsembleOptions::default().with_seed(5),
        ).unwrap();
        let serial = builder.run(8, Strategy::Serial).unwrap();
        let threads = builder.run(8, Strategy::Threads).unwrap();
        let pool = builder.run(8, Strategy::Pool(2)).unwrap();
        for ((a, b), c) in serial.trajectories().iter()
            .zip(threads.trajectories())
            .zip(pool.trajectories())
        {
            assert_eq!(a.last(), b.last());
            assert_eq!(a.last(), c.last());
            assert_eq!(a.t(), b.t());
        }
    }

    #[test]
    fn jump_trajectories_average_to_ame() {
        let annealing = thermalizing_qubit();
        let tf = 20.0;
        let opts = AmeOptions::default();
        let config = SolverConfig::default();
        let density = solve_ame(&annealing, tf, &opts, &config).unwrap();
        let builder = build_ensembles(
            &annealing, tf, EnsembleKind::Ame(opts),
            EnsembleOptions::default().with_seed(2024).with_config(config),
        ).unwrap();
        let ensemble = builder.run(300, Strategy::Threads).unwrap();
        let ts = [0.5, 1.0];
        let ground = |psi: &nd::Array1<C64>| psi[1].norm_sqr();
        let stats = ensemble.statistics(&ts, ground).unwrap();
        for ((&s, m), e) in ts.iter().zip(&stats.mean).zip(&stats.sem) {
            let exact = density.eval(s).unwrap()[[1, 1]].re;
            assert!((m - exact).abs() < 4.0 * e + 1e-2, "s = {s}: {m} vs {exact} ± {e}");
        }
        for rho in ensemble.density(&ts).unwrap().iter() {
            assert_relative_eq!(trace(rho).re, 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn requirements_checked() {
        let annealing = thermalizing_qubit();
        assert!(matches!(
            build_ensembles(
                &annealing, 1.0, EnsembleKind::Stochastic, EnsembleOptions::default()),
            Err(Error::MissingCapability(_)),
        ));
        let rho = outer_prod(&ket(0, 2).unwrap(), &ket(0, 2).unwrap());
        let H = Operator::constant(pauli_z(), Unit::Angular).unwrap();
        let mixed = Annealing::new(H, rho).unwrap()
            .with_coupling(CouplingSet::constant([pauli_x()]).unwrap()).unwrap()
            .with_bath(OhmicBath::new(1e-3, 4.0, 1.0).unwrap()).unwrap();
        assert!(matches!(
            build_ensembles(
                &mixed, 1.0, EnsembleKind::Ame(AmeOptions::default()),
                EnsembleOptions::default()),
            Err(Error::InvalidState(_)),
        ));
    }
}
