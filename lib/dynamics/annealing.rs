//! Initial states and the [`Annealing`] aggregate.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    bath::Bath,
    dynamics::{ coupling::CouplingSet, operator::Operator },
    error::{ Error, Result },
    hilbert::outer_prod,
};

/// Initial state of an evolution.
#[derive(Clone, Debug, PartialEq)]
pub enum InitialState {
    /// Normalized state vector.
    Pure(nd::Array1<C64>),
    /// Unit-trace density matrix.
    Density(nd::Array2<C64>),
}

impl From<nd::Array1<C64>> for InitialState {
    fn from(psi: nd::Array1<C64>) -> Self { Self::Pure(psi) }
}

impl From<nd::Array2<C64>> for InitialState {
    fn from(rho: nd::Array2<C64>) -> Self { Self::Density(rho) }
}

impl InitialState {
    /// Validate and renormalize.
    ///
    /// State vectors must be non-zero. Density matrices must be square and
    /// Hermitian, with real non-negative diagonal and non-zero trace.
    pub fn normalized(self) -> Result<Self> {
        match self {
            Self::Pure(psi) => {
                let norm = psi.iter().map(|a| a.norm_sqr()).sum::<f64>().sqrt();
                if !(norm > 0.0 && norm.is_finite()) {
                    return Err(Error::InvalidState(
                        "state vector has zero or non-finite norm".into()));
                }
                Ok(Self::Pure(psi / C64::from(norm)))
            },
            Self::Density(rho) => {
                if !rho.is_square() {
                    return Err(Error::InvalidState(
                        format!("density matrix is not square: {:?}", rho.shape())));
                }
                let scale = rho.iter().map(|a| a.norm()).fold(0.0, f64::max);
                let tol = 1e-12 * scale.max(1.0);
                let hermitian
                    = rho.indexed_iter()
                    .all(|((i, j), a)| (a - rho[[j, i]].conj()).norm() <= tol);
                if !hermitian {
                    return Err(Error::InvalidState("density matrix is not Hermitian".into()));
                }
                if rho.diag().iter().any(|p| p.re < -tol) {
                    return Err(Error::InvalidState(
                        "density matrix has negative diagonal entries".into()));
                }
                let tr: f64 = rho.diag().iter().map(|p| p.re).sum();
                if !(tr > 0.0) {
                    return Err(Error::InvalidState("density matrix has zero trace".into()));
                }
                Ok(Self::Density(rho / C64::from(tr)))
            },
        }
    }

    /// Hilbert space dimension.
    pub fn dim(&self) -> usize {
        match self {
            Self::Pure(psi) => psi.len(),
            Self::Density(rho) => rho.nrows(),
        }
    }

    /// Return `true` for state vectors.
    pub fn is_pure(&self) -> bool { matches!(self, Self::Pure(_)) }

    /// The state vector, if pure.
    pub fn as_pure(&self) -> Option<&nd::Array1<C64>> {
        match self {
            Self::Pure(psi) => Some(psi),
            Self::Density(_) => None,
        }
    }

    /// The density matrix `ρ`, computing `|ψ⟩⟨ψ|` for state vectors.
    pub fn to_density(&self) -> nd::Array2<C64> {
        match self {
            Self::Pure(psi) => outer_prod(psi, psi),
            Self::Density(rho) => rho.clone(),
        }
    }
}

/// A Hamiltonian with its initial state and, optionally, a bath and the
/// operators coupling the system to it.
///
/// All consistency checks happen here, so solvers can assume the parts fit
/// together. An `Annealing` is never mutated by the solvers; each solve works
/// on its own copy of the Hamiltonian (and hence of its eigen-cache).
#[derive(Clone, Debug)]
pub struct Annealing {
    H: Operator,
    u0: InitialState,
    coupling: Option<CouplingSet>,
    bath: Option<Bath>,
}

impl Annealing {
    /// Create a new closed-system `Annealing`.
    pub fn new<S>(H: Operator, u0: S) -> Result<Self>
    where S: Into<InitialState>
    {
        let u0 = u0.into().normalized()?;
        if u0.dim() != H.dim() {
            return Err(Error::Dimension(format!(
                "initial state has dimension {} but the Hamiltonian has dimension {}",
                u0.dim(), H.dim(),
            )));
        }
        Ok(Self { H, u0, coupling: None, bath: None })
    }

    /// Attach coupling operators.
    pub fn with_coupling(mut self, coupling: CouplingSet) -> Result<Self> {
        if coupling.dim() != self.H.dim() {
            return Err(Error::Dimension(format!(
                "coupling operators have dimension {} but the Hamiltonian has dimension {}",
                coupling.dim(), self.H.dim(),
            )));
        }
        check_channels(Some(&coupling), self.bath.as_ref())?;
        self.coupling = Some(coupling);
        Ok(self)
    }

    /// Attach a bath.
    pub fn with_bath<B>(mut self, bath: B) -> Result<Self>
    where B: Into<Bath>
    {
        let bath = bath.into();
        check_channels(self.coupling.as_ref(), Some(&bath))?;
        self.bath = Some(bath);
        Ok(self)
    }

    /// The Hamiltonian.
    pub fn hamiltonian(&self) -> &Operator { &self.H }

    /// The initial state.
    pub fn initial_state(&self) -> &InitialState { &self.u0 }

    /// Hilbert space dimension.
    pub fn dim(&self) -> usize { self.H.dim() }

    /// The coupling operators, if any.
    pub fn coupling(&self) -> Option<&CouplingSet> { self.coupling.as_ref() }

    /// The bath, if any.
    pub fn bath(&self) -> Option<&Bath> { self.bath.as_ref() }

    /// Coupling operators and bath, which open-system solvers require.
    pub(crate) fn open_system(&self, solver: &str) -> Result<(&CouplingSet, &Bath)> {
        let coupling
            = self.coupling.as_ref()
            .ok_or_else(|| Error::MissingCapability(
                format!("{solver} needs coupling operators")))?;
        let bath
            = self.bath.as_ref()
            .ok_or_else(|| Error::MissingCapability(format!("{solver} needs a bath")))?;
        Ok((coupling, bath))
    }
}

fn check_channels(coupling: Option<&CouplingSet>, bath: Option<&Bath>) -> Result<()> {
    match (coupling, bath.and_then(|b| b.num_channels())) {
        (Some(c), Some(n)) if c.len() != n
            => Err(Error::ChannelCount { bath: n, coupling: c.len() }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use approx::assert_relative_eq;
    use crate::{
        bath::{ CorrelatedBath, CorrelationFn, OhmicBath },
        dynamics::Unit,
        hilbert::{ pauli_x, pauli_z },
    };

    fn H() -> Operator { Operator::constant(pauli_x(), Unit::Angular).unwrap() }

    #[test]
    fn pure_states_renormalized() {
        let a = Annealing::new(H(), nd::array![C64::from(3.0), C64::from(4.0)]).unwrap();
        let psi = a.initial_state().as_pure().unwrap();
        assert_relative_eq!(psi[0].re, 0.6);
        assert_relative_eq!(psi[1].re, 0.8);
        assert!(Annealing::new(H(), nd::Array1::<C64>::zeros(2)).is_err());
    }

    #[test]
    fn density_validation() {
        let bad = nd::array![
            [C64::from(1.0), C64::new(0.0, 0.5)],
            [C64::new(0.0, 0.5), C64::from(1.0)],
        ];
        assert!(matches!(
            Annealing::new(H(), bad),
            Err(Error::InvalidState(_)),
        ));
        let good = nd::array![
            [C64::from(2.0), C64::new(0.0, 0.5)],
            [C64::new(0.0, -0.5), C64::from(2.0)],
        ];
        let a = Annealing::new(H(), good).unwrap();
        assert_relative_eq!(a.initial_state().to_density()[[0, 0]].re, 0.5);
    }

    #[test]
    fn dimension_checks() {
        let psi3 = nd::Array1::from_elem(3, C64::from(1.0));
        assert!(matches!(Annealing::new(H(), psi3), Err(Error::Dimension(_))));
        let a = Annealing::new(H(), nd::array![C64::from(1.0), C64::from(0.0)]).unwrap();
        let c4 = CouplingSet::constant([nd::Array2::eye(4)]).unwrap();
        assert!(matches!(a.with_coupling(c4), Err(Error::Dimension(_))));
    }

    #[test]
    fn channel_count_checked() {
        let c: CorrelationFn = Arc::new(|_| C64::from(1.0));
        let bath
            = CorrelatedBath::new(2, vec![((0, 0), c.clone()), ((1, 1), c)])
            .unwrap();
        let a = Annealing::new(H(), nd::array![C64::from(1.0), C64::from(0.0)]).unwrap()
            .with_coupling(CouplingSet::constant([pauli_z()]).unwrap()).unwrap();
        assert!(matches!(
            a.clone().with_bath(bath),
            Err(Error::ChannelCount { bath: 2, coupling: 1 }),
        ));
        let ohmic = OhmicBath::new(1e-4, 1.0, 1.0).unwrap();
        assert!(a.with_bath(ohmic).is_ok());
    }

    #[test]
    fn open_system_requires_parts() {
        let a = Annealing::new(H(), nd::array![C64::from(1.0), C64::from(0.0)]).unwrap();
        assert!(matches!(a.open_system("redfield"), Err(Error::MissingCapability(_))));
    }
}
