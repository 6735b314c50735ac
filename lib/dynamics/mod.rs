//! Time-dependent operators, system-bath couplings, and the [`Annealing`]
//! aggregate that the solvers consume.
//!
//! Throughout, `s ∈ [0, 1]` is the annealing parameter and all operators are
//! in units of angular frequency (rad/ns) once constructed.

pub mod operator;
pub mod coupling;
pub mod annealing;

pub use operator::{ coef, CoefFn, DenseEigen, EigenSolver, Operator, Unit };
pub use coupling::CouplingSet;
pub use annealing::{ Annealing, InitialState };
