//! System operators coupling to bath channels.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    dynamics::operator::{ Operator, Unit },
    error::{ Error, Result },
    hilbert,
};

/// Ordered list of system-bath coupling operators; operator `i` couples to
/// bath channel `i`.
#[derive(Clone, Debug)]
pub struct CouplingSet {
    ops: Vec<Operator>,
}

impl CouplingSet {
    /// Create a new `CouplingSet` from possibly time-dependent operators.
    pub fn new(ops: Vec<Operator>) -> Result<Self> {
        let dim
            = ops.first()
            .map(|op| op.dim())
            .ok_or_else(|| Error::InvalidParameter(
                "a coupling set needs at least one operator".into()))?;
        if let Some(op) = ops.iter().find(|op| op.dim() != dim) {
            return Err(Error::Dimension(format!(
                "coupling operators must all have dimension {dim}, found {}",
                op.dim(),
            )));
        }
        Ok(Self { ops })
    }

    /// Create a new `CouplingSet` from time-independent matrices.
    ///
    /// Coupling operators are dimensionless; no unit conversion is applied.
    pub fn constant<I>(mats: I) -> Result<Self>
    where I: IntoIterator<Item = nd::Array2<C64>>
    {
        let ops: Vec<Operator>
            = mats.into_iter()
            .map(|M| Operator::constant(M, Unit::Angular))
            .collect::<Result<_>>()?;
        Self::new(ops)
    }

    /// Couple each of `n` qubits individually through the single-qubit
    /// operator `op`, e.g. σ<sub>*z*</sub> for independent dephasing baths.
    pub fn local(op: &nd::Array2<C64>, n: usize) -> Result<Self> {
        Self::constant(
            (0..n).map(|k| hilbert::local_op(op, k, n))
                .collect::<Result<Vec<_>>>()?
        )
    }

    /// Couple all `n` qubits collectively through `Σ_k op_k`.
    pub fn collective(op: &nd::Array2<C64>, n: usize) -> Result<Self> {
        Self::constant([hilbert::collective_op(op, n)?])
    }

    /// Number of channels.
    pub fn len(&self) -> usize { self.ops.len() }

    /// Always `false`; a coupling set holds at least one operator.
    pub fn is_empty(&self) -> bool { self.ops.is_empty() }

    /// Hilbert space dimension.
    pub fn dim(&self) -> usize { self.ops.first().map(|op| op.dim()).unwrap_or(0) }

    /// Iterate over the operators.
    pub fn iter(&self) -> std::slice::Iter<'_, Operator> { self.ops.iter() }

    /// Evaluate every operator at `s`.
    pub fn evaluate(&self, s: f64) -> Vec<nd::Array2<C64>> {
        self.ops.iter().map(|op| op.evaluate(s)).collect()
    }

    /// Evaluate operator `i` at `s`.
    pub fn evaluate_one(&self, i: usize, s: f64) -> Option<nd::Array2<C64>> {
        self.ops.get(i).map(|op| op.evaluate(s))
    }
}

impl<'a> IntoIterator for &'a CouplingSet {
    type Item = &'a Operator;
    type IntoIter = std::slice::Iter<'a, Operator>;

    fn into_iter(self) -> Self::IntoIter { self.ops.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hilbert::{ pauli_x, pauli_z };

    #[test]
    fn local_couplings() {
        let c = CouplingSet::local(&pauli_z(), 2).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c.dim(), 4);
        let ops = c.evaluate(0.5);
        assert_eq!(ops[0], hilbert::local_op(&pauli_z(), 0, 2).unwrap());
        assert!(c.evaluate_one(2, 0.0).is_none());
    }

    #[test]
    fn mixed_dimensions_rejected() {
        let res = CouplingSet::constant([pauli_x(), nd::Array2::eye(4)]);
        assert!(matches!(res, Err(Error::Dimension(_))));
    }
}
