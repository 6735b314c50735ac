//! Closed- and open-system solvers.
//!
//! Every solver integrates over the annealing parameter `s ∈ [0, 1]`, with
//! physical time `t = tf s` in ns, so generators carry an overall factor of
//! `tf`. Solutions are functions of `s`.
//!
//! Matrix-valued states can optionally be flattened (column-major) before
//! integration; solutions are always returned in their natural shape.

use ndarray::{ self as nd, ShapeBuilder };
use ndarray_linalg::{ EigValsh, UPLO };
use num_complex::Complex64 as C64;
use tracing::{ debug, warn };
use crate::{
    config::SolverConfig,
    error::{ Error, Result },
    ode::{ self, OdeSystem, State, Step, StepAction },
};

pub mod schrodinger;
pub mod liouville;
pub mod unitary;
pub mod redfield;
pub mod ame;
pub mod cgme;
pub mod ule;
pub mod polaron;

pub use crate::ode::{ Solution, Status };
pub use schrodinger::solve_schrodinger;
pub use liouville::{ solve_von_neumann, solve_density_with };
pub use unitary::{ det_magnitude, solve_unitary };
pub use redfield::solve_redfield;
pub use ame::{ solve_ame, AmeOptions, FrequencyHint };
pub use cgme::{ solve_cgme, CgmeOptions };
pub use ule::{ solve_ule, UleSolverOptions };
pub use polaron::{ polaron_annealing, polaron_bath, polaron_q, solve_ptre };

/// Instantaneous unitary kick applied at annealing parameter `s`.
///
/// State vectors and propagators are mapped as `ψ → Pψ` and `U → PU`, and
/// density matrices as `ρ → PρP†`. The integrator stops exactly at `s`; the
/// solution holds both the pre- and post-pulse states there and evaluates to
/// the latter.
#[derive(Clone, Debug, PartialEq)]
pub struct Pulse {
    pub s: f64,
    pub U: nd::Array2<C64>,
}

impl Pulse {
    /// Create a new `Pulse`.
    pub fn new(s: f64, U: nd::Array2<C64>) -> Self { Self { s, U } }
}

/// Compute the commutator `[A, B] = A B - B A`.
pub fn commutator<SA, SB>(
    A: &nd::ArrayBase<SA, nd::Ix2>,
    B: &nd::ArrayBase<SB, nd::Ix2>,
) -> nd::Array2<C64>
where
    SA: nd::Data<Elem = C64>,
    SB: nd::Data<Elem = C64>,
{
    A.dot(B) - B.dot(A)
}

/// Compute the anti-commutator `{A, B} = A B + B A`.
pub fn anti_commutator<SA, SB>(
    A: &nd::ArrayBase<SA, nd::Ix2>,
    B: &nd::ArrayBase<SB, nd::Ix2>,
) -> nd::Array2<C64>
where
    SA: nd::Data<Elem = C64>,
    SB: nd::Data<Elem = C64>,
{
    A.dot(B) + B.dot(A)
}

/// Trace of a square matrix.
pub fn trace(rho: &nd::Array2<C64>) -> C64 { rho.diag().sum() }

/// Purity `Tr(ρ²)`.
pub fn purity(rho: &nd::Array2<C64>) -> f64 {
    rho.iter().zip(rho.t().iter())
        .map(|(a, b)| (a * b).re)
        .sum()
}

/// Smallest eigenvalue of the Hermitian part of `rho`.
pub fn min_eigenvalue(rho: &nd::Array2<C64>) -> Result<f64> {
    let herm = (rho + &rho.t().mapv(|a| a.conj())) / C64::from(2.0);
    let w = herm.eigvalsh(UPLO::Lower)?;
    Ok(w.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Flatten a matrix in column-major order.
pub fn vectorize<S>(rho: &nd::ArrayBase<S, nd::Ix2>) -> nd::Array1<C64>
where S: nd::Data<Elem = C64>
{
    rho.t().iter().copied().collect()
}

/// Invert [`vectorize`] for an `n x n` matrix.
pub fn devectorize<S>(v: &nd::ArrayBase<S, nd::Ix1>, n: usize) -> Result<nd::Array2<C64>>
where S: nd::Data<Elem = C64>
{
    nd::Array2::from_shape_vec((n, n).f(), v.to_vec())
        .map(|a| a.as_standard_layout().into_owned())
        .map_err(|e| Error::Dimension(format!("cannot reshape {} elements to {n}x{n}: {e}", v.len())))
}

/// Generator `dρ/ds` of a density-matrix evolution.
///
/// Closures `FnMut(f64, &Array2<C64>) -> Result<Array2<C64>>` are generators;
/// their errors are passed through the integrator unchanged.
pub trait DensityGenerator {
    fn rhs(&mut self, s: f64, rho: &nd::Array2<C64>) -> Result<nd::Array2<C64>>;
}

impl<F> DensityGenerator for F
where F: FnMut(f64, &nd::Array2<C64>) -> Result<nd::Array2<C64>>
{
    fn rhs(&mut self, s: f64, rho: &nd::Array2<C64>) -> Result<nd::Array2<C64>> {
        self(s, rho)
    }
}

pub(crate) fn check_tf(tf: f64) -> Result<()> {
    if tf > 0.0 && tf.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!("total annealing time must be positive, got {tf}")))
    }
}

pub(crate) fn check_pulses(pulses: &[Pulse], dim: usize) -> Result<()> {
    for pulse in pulses.iter() {
        if !(0.0..=1.0).contains(&pulse.s) {
            return Err(Error::InvalidParameter(
                format!("pulse scheduled outside of [0, 1] at s = {}", pulse.s)));
        }
        if pulse.U.shape() != [dim, dim] {
            return Err(Error::Dimension(format!(
                "pulse at s = {} is {:?} but the system has dimension {dim}",
                pulse.s, pulse.U.shape(),
            )));
        }
    }
    Ok(())
}

/// How pulses act on a matrix-valued state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum PulseAction {
    /// `U → PU`
    Left,
    /// `ρ → PρP†`
    Conjugate,
}

/// Matrix-valued ODE system wrapping a generator, with pulses and an optional
/// positivity check.
pub(crate) struct MatrixSystem<'a, G> {
    gen: G,
    pulses: &'a [Pulse],
    action: PulseAction,
    positivity: Option<f64>,
}

impl<'a, G> OdeSystem<nd::Ix2> for MatrixSystem<'a, G>
where G: DensityGenerator
{
    fn rhs(&mut self, s: f64, u: &State<nd::Ix2>) -> Result<State<nd::Ix2>> {
        self.gen.rhs(s, u)
    }

    fn on_step(&mut self, step: &Step<nd::Ix2>) -> Result<StepAction<nd::Ix2>> {
        let Some(threshold) = self.positivity else {
            return Ok(StepAction::Continue);
        };
        let lmin = min_eigenvalue(step.u1)?;
        if lmin < -threshold {
            warn!(s = step.t1, min_eigenvalue = lmin, "density matrix lost positivity");
            Ok(StepAction::Halt(format!(
                "minimum eigenvalue {lmin:e} below -{threshold:e}")))
        } else {
            Ok(StepAction::Continue)
        }
    }

    fn on_tstop(&mut self, s: f64, u: &mut State<nd::Ix2>) -> Result<bool> {
        let mut applied = false;
        for pulse in self.pulses.iter().filter(|p| p.s == s) {
            debug!(s, "applying pulse");
            *u = match self.action {
                PulseAction::Left => pulse.U.dot(&*u),
                PulseAction::Conjugate
                    => pulse.U.dot(&*u).dot(&pulse.U.t().mapv(|a| a.conj())),
            };
            applied = true;
        }
        Ok(applied)
    }
}

/// Flattens a matrix-valued system for the integrator.
pub(crate) struct Vectorized<S> {
    inner: S,
    n: usize,
}

impl<S> OdeSystem<nd::Ix1> for Vectorized<S>
where S: OdeSystem<nd::Ix2>
{
    fn rhs(&mut self, t: f64, u: &State<nd::Ix1>) -> Result<State<nd::Ix1>> {
        let du = self.inner.rhs(t, &devectorize(u, self.n)?)?;
        Ok(vectorize(&du))
    }

    fn on_step(&mut self, step: &Step<nd::Ix1>) -> Result<StepAction<nd::Ix1>> {
        let u0 = devectorize(step.u0, self.n)?;
        let u1 = devectorize(step.u1, self.n)?;
        let f0 = devectorize(step.f0, self.n)?;
        let f1 = devectorize(step.f1, self.n)?;
        let mat_step = Step {
            t0: step.t0, t1: step.t1, u0: &u0, u1: &u1, f0: &f0, f1: &f1,
        };
        Ok(match self.inner.on_step(&mat_step)? {
            StepAction::Continue => StepAction::Continue,
            StepAction::Halt(reason) => StepAction::Halt(reason),
            StepAction::Reset { t, state }
                => StepAction::Reset { t, state: vectorize(&state) },
        })
    }

    fn on_tstop(&mut self, t: f64, u: &mut State<nd::Ix1>) -> Result<bool> {
        let mut m = devectorize(u, self.n)?;
        let changed = self.inner.on_tstop(t, &mut m)?;
        if changed { *u = vectorize(&m); }
        Ok(changed)
    }
}

/// Integrate a matrix-valued generator over `s ∈ [0, 1]`, honoring the
/// configuration's pulses, positivity check, and vectorization setting.
pub(crate) fn integrate_matrix<G>(
    gen: G,
    u0: nd::Array2<C64>,
    action: PulseAction,
    config: &SolverConfig,
) -> Result<Solution<nd::Ix2>>
where G: DensityGenerator
{
    let n = u0.nrows();
    check_pulses(&config.pulses, n)?;
    let positivity = match action {
        PulseAction::Conjugate => config.positivity_threshold,
        PulseAction::Left => None,
    };
    let system = MatrixSystem { gen, pulses: &config.pulses, action, positivity };
    let opts = config.ode_options();
    if config.vectorize {
        let mut flat = Vectorized { inner: system, n };
        ode::solve(&mut flat, vectorize(&u0), (0.0, 1.0), &opts)?
            .map_states(|v| devectorize(&v, n))
    } else {
        let mut system = system;
        ode::solve(&mut system, u0, (0.0, 1.0), &opts)
    }
}

/// Read-only view of a propagator solution `U(s)`, giving
/// `U(s, s') = U(s) U(s')†`.
pub(crate) struct Propagator<'a> {
    U: &'a Solution<nd::Ix2>,
}

impl<'a> Propagator<'a> {
    pub(crate) fn new(U: &'a Solution<nd::Ix2>, dim: usize) -> Result<Self> {
        let (lo, hi) = U.span();
        if lo > 0.0 || hi < 1.0 - 1e-12 || U.is_halted() {
            return Err(Error::InvalidParameter(format!(
                "propagator must cover s in [0, 1], got [{lo}, {hi}]")));
        }
        match U.last() {
            Some(u) if u.shape() == [dim, dim] => Ok(Self { U }),
            Some(u) => Err(Error::Dimension(format!(
                "propagator is {:?} but the system has dimension {dim}", u.shape()))),
            None => Err(Error::InvalidParameter("empty propagator".into())),
        }
    }

    pub(crate) fn at(&self, s: f64) -> Result<nd::Array2<C64>> {
        self.U.eval(s.clamp(0.0, 1.0))
    }

    /// Conjugate `X` by `U(s, s') = U_s U(s')†`, given `U_s = U(s)`.
    pub(crate) fn transport(&self, U_s: &nd::Array2<C64>, s_prime: f64, X: &nd::Array2<C64>)
        -> Result<nd::Array2<C64>>
    {
        let U_p = self.at(s_prime)?;
        let W = U_s.dot(&U_p.t().mapv(|a| a.conj()));
        Ok(W.dot(X).dot(&W.t().mapv(|a| a.conj())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn vectorization_is_column_major() {
        let rho = nd::array![
            [C64::from(1.0), C64::from(2.0)],
            [C64::from(3.0), C64::from(4.0)],
        ];
        let v = vectorize(&rho);
        assert_eq!(v.to_vec(), vec![1.0, 3.0, 2.0, 4.0].into_iter().map(C64::from).collect::<Vec<_>>());
        assert_eq!(devectorize(&v, 2).unwrap(), rho);
        assert!(devectorize(&v, 3).is_err());
    }

    #[test]
    fn state_functions() {
        let rho = nd::array![
            [C64::from(0.5), C64::from(0.5)],
            [C64::from(0.5), C64::from(0.5)],
        ];
        assert_relative_eq!(purity(&rho), 1.0, epsilon = 1e-14);
        assert_relative_eq!(trace(&rho).re, 1.0);
        assert_relative_eq!(min_eigenvalue(&rho).unwrap(), 0.0, epsilon = 1e-14);
        let mixed = nd::Array2::<C64>::eye(2) / C64::from(2.0);
        assert_relative_eq!(purity(&mixed), 0.5, epsilon = 1e-14);
    }

    mod strong_coupling {
        use std::{ f64::consts::PI, sync::Arc };
        use approx::assert_relative_eq;
        use super::*;
        use crate::{
            bath::{ Bath, OhmicBath, UleBath, UleOptions },
            config::SolverConfig,
            dynamics::{ Annealing, CouplingSet, Operator, Unit },
            hilbert::{ pauli_x, pauli_z, plus_state },
        };

        const eta: f64 = 0.1;
        const omega_c: f64 = 8.0 * PI;
        const beta: f64 = 4.0;
        const tf: f64 = 20.0;

        fn ohmic() -> OhmicBath { OhmicBath::new(eta, omega_c, beta).unwrap() }

        fn qubit<B: Into<Bath>>(bath: B) -> Annealing {
            let H = Operator::constant(pauli_z() / C64::from(2.0), Unit::Angular).unwrap();
            Annealing::new(H, plus_state(1)).unwrap()
                .with_coupling(CouplingSet::constant([pauli_x()]).unwrap()).unwrap()
                .with_bath(bath).unwrap()
        }

        fn lowest(sol: &Solution<nd::Ix2>) -> f64 {
            sol.u().iter()
                .map(|rho| min_eigenvalue(rho).unwrap())
                .fold(f64::INFINITY, f64::min)
        }

        #[test]
        fn redfield_loses_positivity() {
            let annealing = qubit(ohmic());
            let U = solve_unitary(&annealing, tf, &SolverConfig::default()).unwrap();

            let free = solve_redfield(&annealing, tf, &U, 2.0, &SolverConfig::default())
                .unwrap();
            assert!(!free.is_halted());
            assert!(lowest(&free) < 0.0);

            let config = SolverConfig::default().with_positivity_check(1e-6);
            let checked = solve_redfield(&annealing, tf, &U, 2.0, &config).unwrap();
            match checked.status() {
                Status::Halted { t, reason } => {
                    assert!(*t > 0.0 && *t < 1.0);
                    assert!(reason.contains("minimum eigenvalue"));
                },
                Status::Solved => panic!("positivity check did not halt"),
            }
            assert!(checked.t().len() < free.t().len());
        }

        #[test]
        fn cgme_stays_positive() {
            let annealing = qubit(ohmic());
            let U = solve_unitary(&annealing, tf, &SolverConfig::default()).unwrap();
            let opts = CgmeOptions::default().with_window(2.0);
            let sol = solve_cgme(&annealing, tf, &U, &opts, &SolverConfig::cgme()).unwrap();
            assert!(!sol.is_halted());
            assert!(lowest(&sol) >= -1e-10);
            assert_relative_eq!(trace(sol.last().unwrap()).re, 1.0, epsilon = 1e-5);
        }

        #[test]
        fn ule_stays_positive() {
            let bath = UleBath::new(
                Arc::new(ohmic()), UleOptions::new(6.0, 40.0 * omega_c)).unwrap();
            let annealing = qubit(bath);
            let U = solve_unitary(&annealing, tf, &SolverConfig::default()).unwrap();
            let sol = solve_ule(
                &annealing, tf, &U, &UleSolverOptions::default(), &SolverConfig::default(),
            ).unwrap();
            assert!(!sol.is_halted());
            assert!(lowest(&sol) >= -1e-10);
            assert_relative_eq!(trace(sol.last().unwrap()).re, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn commutators() {
        let x = crate::hilbert::pauli_x();
        let y = crate::hilbert::pauli_y();
        let z = crate::hilbert::pauli_z();
        assert_eq!(commutator(&x, &y), z.mapv(|a| a * C64::new(0.0, 2.0)));
        assert_eq!(anti_commutator(&x, &y), nd::Array2::<C64>::zeros((2, 2)));
    }
}
