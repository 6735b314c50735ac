#![allow(dead_code, non_snake_case, non_upper_case_globals)]

//! Open-system dynamics of time-dependent (annealing) Hamiltonians.
//!
//! Problems are assembled as an [`Annealing`] from an [`Operator`]
//! Hamiltonian `H(s)`, an initial state, and optionally a [`CouplingSet`] with
//! a [`Bath`]. Solvers in [`solve`] integrate over the dimensionless annealing
//! parameter `s ∈ [0, 1]` for a total time `tf` (ns), and [`ensemble`] runs
//! stochastic trajectories in parallel.

pub mod error;
pub mod config;
pub mod quad;
pub mod interp;
pub mod special;
pub mod ode;
pub mod hilbert;
pub mod dynamics;
pub mod bath;
pub mod solve;
pub mod ensemble;

pub use error::{ Error, Result };
pub use config::{ SolverConfig, Tolerances };
pub use dynamics::{ Annealing, CouplingSet, InitialState, Operator, Unit };
pub use bath::{ Bath, BathModel };
pub use solve::{ Pulse, Solution, Status };
pub use ensemble::{ build_ensembles, EnsembleKind, EnsembleOptions, Strategy };
