//! Single-qubit operators, multi-qubit registers, and common states.
//!
//! Qubits are ordered so that site 0 is the leftmost factor of every tensor
//! product, and the computational basis is ordered such that `|0⟩` is the +1
//! eigenstate of σ<sub>*z*</sub>.

use itertools::Itertools;
use ndarray::{ self as nd, linalg::kron };
use num_complex::Complex64 as C64;
use num_traits::{ One, Zero };
use crate::error::{ Error, Result };

/// Pauli σ<sub>*x*</sub>.
pub fn pauli_x() -> nd::Array2<C64> {
    nd::array![
        [C64::zero(), C64::one()],
        [C64::one(),  C64::zero()],
    ]
}

/// Pauli σ<sub>*y*</sub>.
pub fn pauli_y() -> nd::Array2<C64> {
    nd::array![
        [C64::zero(), -C64::i()],
        [C64::i(),    C64::zero()],
    ]
}

/// Pauli σ<sub>*z*</sub>.
pub fn pauli_z() -> nd::Array2<C64> {
    nd::array![
        [C64::one(),  C64::zero()],
        [C64::zero(), -C64::one()],
    ]
}

/// Raising operator σ<sub>+</sub> = |0⟩⟨1|.
pub fn sigma_plus() -> nd::Array2<C64> {
    nd::array![
        [C64::zero(), C64::one()],
        [C64::zero(), C64::zero()],
    ]
}

/// Lowering operator σ<sub>−</sub> = |1⟩⟨0|.
pub fn sigma_minus() -> nd::Array2<C64> {
    nd::array![
        [C64::zero(), C64::zero()],
        [C64::one(),  C64::zero()],
    ]
}

/// Identity on an `n`-dimensional space.
pub fn identity(n: usize) -> nd::Array2<C64> { nd::Array2::eye(n) }

/// Conjugate transpose.
pub fn dagger<S>(A: &nd::ArrayBase<S, nd::Ix2>) -> nd::Array2<C64>
where S: nd::Data<Elem = C64>
{
    A.t().mapv(|a| a.conj())
}

/// Compute the outer product `|a⟩⟨b|` of two state vectors.
pub fn outer_prod(a: &nd::Array1<C64>, b: &nd::Array1<C64>)
    -> nd::Array2<C64>
{
    nd::Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j].conj())
}

/// Tensor product of a sequence of square matrices, leftmost first.
pub fn kron_all<'a, I>(ops: I) -> nd::Array2<C64>
where I: IntoIterator<Item = nd::ArrayView2<'a, C64>>
{
    ops.into_iter()
        .fold(nd::Array2::eye(1), |acc, op| kron(&acc, &op))
}

/// Embed a single-qubit operator acting on `site` into an `n`-qubit register.
pub fn local_op(op: &nd::Array2<C64>, site: usize, n: usize)
    -> Result<nd::Array2<C64>>
{
    if site >= n {
        return Err(Error::InvalidParameter(
            format!("site {site} does not exist in a {n}-qubit register")));
    }
    if op.shape() != [2, 2] {
        return Err(Error::Dimension(
            format!("expected a 2x2 single-qubit operator, got {:?}", op.shape())));
    }
    let eye = identity(2);
    Ok(kron_all((0..n).map(|k| if k == site { op.view() } else { eye.view() })))
}

/// Sum of a single-qubit operator over every site of an `n`-qubit register.
pub fn collective_op(op: &nd::Array2<C64>, n: usize) -> Result<nd::Array2<C64>> {
    let dim = 1_usize << n;
    (0..n).try_fold(nd::Array2::zeros((dim, dim)), |acc, k| {
        Ok(acc + local_op(op, k, n)?)
    })
}

/// Transverse-field driver Σ<sub>*k*</sub> σ<sub>*k*</sub><sup>*x*</sup> on `n`
/// qubits.
pub fn transverse_field(n: usize) -> Result<nd::Array2<C64>> {
    collective_op(&pauli_x(), n)
}

/// Classical Ising problem Hamiltonian
/// ```text
/// Σ_k h_k σ_k^z + Σ_(i, j) J_ij σ_i^z σ_j^z
/// ```
/// on `h.len()` qubits, with `couplings` given as `(i, j, J_ij)`.
pub fn ising_problem(h: &[f64], couplings: &[(usize, usize, f64)])
    -> Result<nd::Array2<C64>>
{
    let n = h.len();
    let z = pauli_z();
    let dim = 1_usize << n;
    let mut H: nd::Array2<C64> = nd::Array2::zeros((dim, dim));
    for (k, &hk) in h.iter().enumerate() {
        H.scaled_add(C64::from(hk), &local_op(&z, k, n)?);
    }
    for &(i, j, Jij) in couplings.iter() {
        if i == j {
            return Err(Error::InvalidParameter(
                format!("self-coupling on site {i}")));
        }
        let zz = local_op(&z, i, n)?.dot(&local_op(&z, j, n)?);
        H.scaled_add(C64::from(Jij), &zz);
    }
    Ok(H)
}

/// Computational basis state `|index⟩` in a `dim`-dimensional space.
pub fn ket(index: usize, dim: usize) -> Result<nd::Array1<C64>> {
    if index >= dim {
        return Err(Error::InvalidParameter(
            format!("basis index {index} out of range for dimension {dim}")));
    }
    let mut psi: nd::Array1<C64> = nd::Array1::zeros(dim);
    psi[index] = C64::one();
    Ok(psi)
}

/// Computational basis state labeled by a bit string, site 0 first.
pub fn ket_bits(bits: &[bool]) -> nd::Array1<C64> {
    let index
        = bits.iter()
        .fold(0_usize, |acc, &b| (acc << 1) | usize::from(b));
    let dim = 1_usize << bits.len();
    nd::Array1::from_shape_fn(dim, |k| if k == index { C64::one() } else { C64::zero() })
}

/// Uniform superposition `|+⟩^⊗n`, the ground state of the driver
/// `-Σ σ^x`.
pub fn plus_state(n: usize) -> nd::Array1<C64> {
    let dim = 1_usize << n;
    nd::Array1::from_elem(dim, C64::from((dim as f64).sqrt().recip()))
}

/// Expectation value `⟨ψ|A|ψ⟩`.
pub fn expectation_pure(A: &nd::Array2<C64>, psi: &nd::Array1<C64>) -> C64 {
    psi.iter().zip(A.dot(psi).iter())
        .map(|(a, b)| a.conj() * b)
        .sum()
}

/// Expectation value `Tr(A ρ)`.
pub fn expectation(A: &nd::Array2<C64>, rho: &nd::Array2<C64>) -> C64 {
    (0..A.nrows()).cartesian_product(0..A.ncols())
        .map(|(i, j)| A[[i, j]] * rho[[j, i]])
        .sum()
}
