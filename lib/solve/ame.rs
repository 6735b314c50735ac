//! Adiabatic master equation (AME).
//!
//! A Lindblad equation in the instantaneous eigenbasis `{|v_a(s)⟩}` of the
//! Hamiltonian, with one jump `|v_a⟩⟨v_b|` per Bohr frequency `ω = w_b - w_a`
//! and channel `α`, at rate `γ(ω) |A^α_ab|²` where `A^α = V† S_α V`. Diagonal
//! elements of `A^α` give pure dephasing at rate `γ(0)`, and the Lamb shift
//! `H_LS = Σ_α Σ_ab S(w_b - w_a) |A^α_ab|² |v_b⟩⟨v_b|` renormalizes the
//! energies.
//!
//! Jumps are taken per pair of levels, which assumes the Bohr frequencies are
//! non-degenerate.

use std::sync::Arc;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rustc_hash::FxHashMap;
use tracing::{ debug, info };
use crate::{
    bath::{ Bath, BathModel },
    config::SolverConfig,
    dynamics::{ Annealing, CouplingSet, Operator },
    error::{ Error, Result },
    interp::{ Extrapolation, GridInterpolant },
};
use super::{
    anti_commutator, check_tf, commutator, integrate_matrix, DensityGenerator,
    PulseAction, Solution,
};

/// Frequency range (rad/ns) over which the Lamb shift is pre-tabulated.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrequencyHint {
    pub lo: f64,
    pub hi: f64,
    pub points: usize,
}

impl FrequencyHint {
    /// Create a new `FrequencyHint`.
    pub fn new(lo: f64, hi: f64, points: usize) -> Self { Self { lo, hi, points } }
}

/// Options for the AME and its quantum-trajectory unraveling.
#[derive(Clone, Debug, PartialEq)]
pub struct AmeOptions {
    /// Number of instantaneous eigenstates kept; all of them by default.
    pub levels: Option<usize>,
    /// Pre-tabulate the Lamb shift over this range, and interpolate. Bohr
    /// frequencies outside of it are evaluated directly.
    pub frequency_hint: Option<FrequencyHint>,
    /// Include the Lamb shift Hamiltonian.
    pub lamb_shift: bool,
}

impl Default for AmeOptions {
    fn default() -> Self {
        Self { levels: None, frequency_hint: None, lamb_shift: true }
    }
}

impl AmeOptions {
    /// Keep only the lowest `levels` eigenstates.
    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = Some(levels);
        self
    }

    /// Pre-tabulate the Lamb shift over `[lo, hi]`.
    pub fn with_frequency_hint(mut self, lo: f64, hi: f64, points: usize) -> Self {
        self.frequency_hint = Some(FrequencyHint::new(lo, hi, points));
        self
    }

    /// Drop the Lamb shift Hamiltonian.
    pub fn without_lamb_shift(mut self) -> Self {
        self.lamb_shift = false;
        self
    }
}

#[derive(Clone, Debug)]
struct LambShift {
    enabled: bool,
    table: Option<Arc<GridInterpolant<f64>>>,
    /// Gap frequencies seen so far, flushed once `cap` entries accumulate.
    memo: FxHashMap<u64, f64>,
    cap: usize,
}

impl LambShift {
    fn new(model: &dyn BathModel, opts: &AmeOptions, lvl: usize) -> Result<Self> {
        let table = match (opts.lamb_shift, opts.frequency_hint) {
            (true, Some(hint)) => {
                debug!(lo = hint.lo, hi = hint.hi, points = hint.points, "tabulating Lamb shift");
                let table = GridInterpolant::tabulate(
                    hint.lo, hint.hi, hint.points, Extrapolation::Error,
                    |w| model.lamb_shift(w),
                )?;
                Some(Arc::new(table))
            },
            _ => None,
        };
        // room for every gap of a constant Hamiltonian, and then some
        let cap = (4 * lvl * lvl).max(64);
        Ok(Self {
            enabled: opts.lamb_shift,
            table,
            memo: FxHashMap::default(),
            cap,
        })
    }

    fn eval(&mut self, model: &dyn BathModel, omega: f64) -> f64 {
        if !self.enabled { return 0.0; }
        if let Some(value) = self.table.as_ref().and_then(|t| t.eval(omega).ok()) {
            return value;
        }
        let key = omega.to_bits();
        if let Some(&value) = self.memo.get(&key) { return value; }
        if self.memo.len() >= self.cap { self.memo.clear(); }
        let value = model.lamb_shift(omega);
        self.memo.insert(key, value);
        value
    }
}

/// Rates of one coupling channel in the instantaneous eigenbasis.
#[derive(Clone, Debug)]
pub(crate) struct ChannelRates {
    /// `V† S V`
    pub(crate) A: nd::Array2<C64>,
    /// `G[[a, b]]`: rate of the jump `b → a`
    pub(crate) G: nd::Array2<f64>,
    /// `diag(A)`
    pub(crate) d: nd::Array1<f64>,
}

/// Everything the AME needs at a single value of `s`.
#[derive(Clone, Debug)]
pub(crate) struct AmeFrame {
    pub(crate) V: nd::Array2<C64>,
    pub(crate) channels: Vec<ChannelRates>,
    pub(crate) gamma0: f64,
    /// Diagonal of the Lamb shift in the eigenbasis.
    pub(crate) lamb: nd::Array1<f64>,
}

impl AmeFrame {
    /// Total outgoing rate of each level, including dephasing: the diagonal
    /// of `Σ L†L` in the eigenbasis.
    pub(crate) fn decay(&self) -> nd::Array1<f64> {
        let mut k: nd::Array1<f64> = nd::Array1::zeros(self.lamb.len());
        for ch in self.channels.iter() {
            k += &ch.G.sum_axis(nd::Axis(0));
            k += &ch.d.mapv(|x| self.gamma0 * x * x);
        }
        k
    }

    /// Lift a diagonal in the eigenbasis to an operator on the full space.
    pub(crate) fn lift<I>(&self, diag: I) -> nd::Array2<C64>
    where I: IntoIterator<Item = C64>
    {
        let diag: nd::Array1<C64> = diag.into_iter().collect();
        (&self.V * &diag).dot(&self.V.t().mapv(|a| a.conj()))
    }
}

/// Owned AME model; cloning it deep-copies the eigen- and Lamb-shift caches.
#[derive(Clone, Debug)]
pub(crate) struct AmeModel {
    pub(crate) H: Operator,
    coupling: CouplingSet,
    bath: Bath,
    lvl: usize,
    lamb: LambShift,
}

impl AmeModel {
    pub(crate) fn new(annealing: &Annealing, opts: &AmeOptions) -> Result<Self> {
        let (coupling, bath) = annealing.open_system("adiabatic master equation")?;
        let model = bath.require_model("spectral density")?;
        let dim = annealing.dim();
        let lvl = opts.levels.unwrap_or(dim);
        if lvl == 0 || lvl > dim {
            return Err(Error::InvalidParameter(
                format!("cannot keep {lvl} level(s) of a {dim}-dimensional system")));
        }
        Ok(Self {
            H: annealing.hamiltonian().clone(),
            coupling: coupling.clone(),
            bath: bath.clone(),
            lvl,
            lamb: LambShift::new(model, opts, lvl)?,
        })
    }

    pub(crate) fn dim(&self) -> usize { self.H.dim() }

    pub(crate) fn frame(&mut self, s: f64) -> Result<AmeFrame> {
        let (w, V) = self.H.eigen_decompose(s, self.lvl)?;
        let model = self.bath.require_model("spectral density")?;
        let Vd = V.t().mapv(|a| a.conj());
        let gamma0 = model.spectral_density(0.0);
        let s0 = self.lamb.eval(model, 0.0);
        let mut lamb: nd::Array1<f64> = nd::Array1::zeros(self.lvl);
        let mut channels: Vec<ChannelRates> = Vec::with_capacity(self.coupling.len());
        for op in self.coupling.iter() {
            let A = Vd.dot(&op.evaluate(s)).dot(&V);
            let d: nd::Array1<f64> = A.diag().mapv(|a| a.re);
            let mut G: nd::Array2<f64> = nd::Array2::zeros((self.lvl, self.lvl));
            for ((a, b), g) in G.indexed_iter_mut() {
                if a == b { continue; }
                let omega = w[b] - w[a];
                let strength = A[[a, b]].norm_sqr();
                *g = model.spectral_density(omega) * strength;
                lamb[b] += self.lamb.eval(model, omega) * strength;
            }
            lamb.iter_mut().zip(d.iter()).for_each(|(l, x)| *l += s0 * x * x);
            channels.push(ChannelRates { A, G, d });
        }
        Ok(AmeFrame { V, channels, gamma0, lamb })
    }
}

struct AmeGenerator {
    model: AmeModel,
    tf: f64,
}

impl DensityGenerator for AmeGenerator {
    fn rhs(&mut self, s: f64, rho: &nd::Array2<C64>) -> Result<nd::Array2<C64>> {
        let frame = self.model.frame(s)?;
        let V = &frame.V;
        let Vd = V.t().mapv(|a| a.conj());
        let rho_eig = Vd.dot(rho).dot(V);
        let populations: nd::Array1<f64> = rho_eig.diag().mapv(|p| p.re);

        let H = self.model.H.evaluate(s) + frame.lift(frame.lamb.iter().map(|&l| C64::from(l)));
        let mut drho = commutator(&H, rho) * C64::new(0.0, -1.0);

        let mut gain: nd::Array1<f64> = nd::Array1::zeros(populations.len());
        let mut loss: nd::Array1<f64> = nd::Array1::zeros(populations.len());
        for ch in frame.channels.iter() {
            gain += &ch.G.dot(&populations);
            loss += &ch.G.sum_axis(nd::Axis(0));
            if frame.gamma0 != 0.0 {
                let L0 = frame.lift(ch.d.iter().map(|&x| C64::from(x)));
                let L0sq = L0.dot(&L0);
                drho = drho
                    + (L0.dot(rho).dot(&L0) - anti_commutator(&L0sq, rho) / C64::from(2.0))
                    * C64::from(frame.gamma0);
            }
        }
        let K = frame.lift(loss.iter().map(|&k| C64::from(k)));
        drho = drho + frame.lift(gain.iter().map(|&g| C64::from(g)))
            - anti_commutator(&K, rho) / C64::from(2.0);
        Ok(drho * C64::from(self.tf))
    }
}

/// Solve the adiabatic master equation over `s ∈ [0, 1]`.
///
/// Requires coupling operators and a single-model bath; cross-correlated baths
/// have no spectral density and are rejected.
pub fn solve_ame(
    annealing: &Annealing,
    tf: f64,
    opts: &AmeOptions,
    config: &SolverConfig,
) -> Result<Solution<nd::Ix2>>
{
    check_tf(tf)?;
    let model = AmeModel::new(annealing, opts)?;
    info!(
        tf,
        dim = annealing.dim(),
        levels = model.lvl,
        lamb_shift = opts.lamb_shift,
        tabulated = opts.frequency_hint.is_some(),
        "solving adiabatic master equation",
    );
    let gen = AmeGenerator { model, tf };
    let sol = integrate_matrix(
        gen, annealing.initial_state().to_density(), PulseAction::Conjugate, config)?;
    info!(steps = sol.t().len(), "adiabatic master equation done");
    Ok(sol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::{
        bath::{ CorrelatedBath, CorrelationFn, OhmicBath },
        dynamics::Unit,
        hilbert::{ pauli_x, pauli_z, plus_state },
        solve::{
            min_eigenvalue, redfield::tests::{ gibbs_ground, thermalizing_qubit },
            solve_von_neumann, trace,
        },
    };

    fn weak_coupling_anneal() -> Annealing {
        let H = Operator::annealing(
            |s| 1.0 - s, |s| s,
            pauli_x().mapv(|a| -a), pauli_z().mapv(|a| -a),
            Unit::Linear,
        ).unwrap();
        let bath = OhmicBath::from_physical(1e-4, 4.0, 16.0).unwrap();
        Annealing::new(H, plus_state(1)).unwrap()
            .with_coupling(CouplingSet::constant([pauli_z()]).unwrap()).unwrap()
            .with_bath(bath).unwrap()
    }

    #[test]
    fn detailed_balance_steady_state() {
        let annealing = thermalizing_qubit();
        let config = SolverConfig::default();
        let sol = solve_ame(&annealing, 60.0, &AmeOptions::default(), &config).unwrap();
        let rho = sol.last().unwrap();
        assert_relative_eq!(trace(rho).re, 1.0, epsilon = 1e-6);
        assert_relative_eq!(rho[[1, 1]].re, gibbs_ground(), epsilon = 1e-3);
    }

    #[test]
    fn weak_coupling_close_to_closed_system() {
        let annealing = weak_coupling_anneal();
        let tf = 10.0 * 2.0_f64.sqrt();
        let config = SolverConfig::default();
        let open = solve_ame(&annealing, tf, &AmeOptions::default(), &config).unwrap();
        let closed = solve_von_neumann(&annealing, tf, &config).unwrap();
        let p_open = open.last().unwrap()[[0, 0]].re;
        let p_closed = closed.last().unwrap()[[0, 0]].re;
        assert!((0.0..=1.0).contains(&p_open));
        assert_relative_eq!(p_open, p_closed, epsilon = 1e-2);
        for rho in open.u().iter() {
            assert!(min_eigenvalue(rho).unwrap() > -1e-6);
        }
    }

    #[test]
    fn frequency_hint_only_changes_speed() {
        let annealing = weak_coupling_anneal();
        let tf = 10.0 * 2.0_f64.sqrt();
        let config = SolverConfig::default();
        let direct = solve_ame(&annealing, tf, &AmeOptions::default(), &config).unwrap();
        let hinted = solve_ame(
            &annealing, tf,
            &AmeOptions::default().with_frequency_hint(-15.0, 15.0, 401),
            &config,
        ).unwrap();
        let a = direct.last().unwrap();
        let b = hinted.last().unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_relative_eq!(x.re, y.re, epsilon = 1e-5);
            assert_relative_eq!(x.im, y.im, epsilon = 1e-5);
        }
    }

    #[test]
    fn correlated_bath_rejected() {
        let c: CorrelationFn = Arc::new(|tau: f64| C64::from((-tau.abs()).exp()));
        let bath = CorrelatedBath::new(1, vec![((0, 0), c)]).unwrap();
        let annealing = thermalizing_qubit().with_bath(bath).unwrap();
        assert!(matches!(
            solve_ame(&annealing, 1.0, &AmeOptions::default(), &SolverConfig::default()),
            Err(Error::MissingCapability(_)),
        ));
    }

    #[test]
    fn level_count_validated() {
        let annealing = thermalizing_qubit();
        let opts = AmeOptions::default().with_levels(3);
        assert!(matches!(
            solve_ame(&annealing, 1.0, &opts, &SolverConfig::default()),
            Err(Error::InvalidParameter(_)),
        ));
    }

    #[test]
    fn frame_rates_follow_detailed_balance() {
        let annealing = thermalizing_qubit();
        let mut model = AmeModel::new(&annealing, &AmeOptions::default()).unwrap();
        let frame = model.frame(0.3).unwrap();
        let G = &frame.channels[0].G;
        // levels ascending: 0 = ground, 1 = excited; ω = 1, β = 1
        assert_relative_eq!(G[[1, 0]] / G[[0, 1]], (-1.0_f64).exp(), epsilon = 1e-10);
        assert_eq!(frame.decay().len(), 2);
    }

    #[test]
    fn lamb_shift_memo_stays_bounded() {
        let annealing = weak_coupling_anneal();
        let mut model = AmeModel::new(&annealing, &AmeOptions::default()).unwrap();
        let cap = model.lamb.cap;
        for k in 0..=400 {
            model.frame(k as f64 / 400.0).unwrap();
            assert!(model.lamb.memo.len() <= cap);
        }
        assert!(model.lamb.memo.len() > 0);

        let mut fresh = AmeModel::new(&annealing, &AmeOptions::default()).unwrap();
        let churned = model.frame(0.37).unwrap();
        let expected = fresh.frame(0.37).unwrap();
        for (a, b) in churned.lamb.iter().zip(expected.lamb.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12, epsilon = 1e-14);
        }
    }
}
