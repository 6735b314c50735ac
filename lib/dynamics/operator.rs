//! Time-dependent operators built as weighted sums of fixed matrices, with a
//! cached spectral decomposition.

use std::{ f64::consts::TAU, fmt, sync::Arc };
use ndarray::{ self as nd, s };
use ndarray_linalg::{ Eigh, UPLO };
use num_complex::Complex64 as C64;
use tracing::trace;
use crate::error::{ Error, Result };

/// Heap-allocated scalar coefficient of the annealing parameter `s`.
pub type CoefFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Wrap a closure as a [`CoefFn`].
pub fn coef<F>(f: F) -> CoefFn
where F: Fn(f64) -> f64 + Send + Sync + 'static
{
    Arc::new(f)
}

/// Frequency convention for the matrices handed to an [`Operator`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Unit {
    /// Matrices are already in angular frequency (rad/ns).
    #[default]
    Angular,
    /// Matrices are in linear frequency (GHz) and are multiplied by 2π once,
    /// at construction.
    Linear,
}

impl Unit {
    /// Scale factor to angular frequency.
    pub fn factor(self) -> f64 {
        match self {
            Self::Angular => 1.0,
            Self::Linear => TAU,
        }
    }
}

/// Strategy for computing the lowest `lvl` eigenpairs of a Hermitian matrix
/// evaluated at annealing parameter `s`.
///
/// Eigenvalues must be returned in ascending order, with eigenvectors as the
/// corresponding columns. Any closure with the matching signature is an
/// `EigenSolver`; its errors are returned to the caller untouched.
pub trait EigenSolver: Send + Sync {
    fn decompose(&self, H: &nd::Array2<C64>, s: f64, lvl: usize)
        -> Result<(nd::Array1<f64>, nd::Array2<C64>)>;
}

/// Full dense diagonalization through LAPACK.
#[derive(Copy, Clone, Debug, Default)]
pub struct DenseEigen;

impl EigenSolver for DenseEigen {
    fn decompose(&self, H: &nd::Array2<C64>, _s: f64, lvl: usize)
        -> Result<(nd::Array1<f64>, nd::Array2<C64>)>
    {
        let (w, V) = H.eigh(UPLO::Lower)?;
        Ok((w.slice(s![..lvl]).to_owned(), V.slice(s![.., ..lvl]).to_owned()))
    }
}

impl<F> EigenSolver for F
where F: Fn(&nd::Array2<C64>, f64, usize)
        -> Result<(nd::Array1<f64>, nd::Array2<C64>)> + Send + Sync
{
    fn decompose(&self, H: &nd::Array2<C64>, s: f64, lvl: usize)
        -> Result<(nd::Array1<f64>, nd::Array2<C64>)>
    {
        self(H, s, lvl)
    }
}

#[derive(Clone, Debug, Default)]
struct EigenCache {
    s: Option<f64>,
    lvl: usize,
    w: nd::Array1<f64>,
    V: nd::Array2<C64>,
}

/// A linear operator `Σ_k f_k(s) M_k`, where the `M_k` are fixed square
/// matrices.
///
/// Each `Operator` owns its eigen-cache; cloning an `Operator` deep-copies the
/// cache, so clones can be handed to independent threads.
#[derive(Clone)]
pub struct Operator {
    terms: Vec<(nd::Array2<C64>, CoefFn)>,
    unit: Unit,
    dim: usize,
    solver: Arc<dyn EigenSolver>,
    cache: EigenCache,
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("dim", &self.dim)
            .field("terms", &self.terms.len())
            .field("unit", &self.unit)
            .field("cached_s", &self.cache.s)
            .finish()
    }
}

impl Operator {
    /// Create a new `Operator` from (matrix, coefficient) pairs.
    ///
    /// All matrices must be square and of equal size. Under [`Unit::Linear`],
    /// every matrix is multiplied by 2π here and nowhere else.
    pub fn new<I>(terms: I, unit: Unit) -> Result<Self>
    where I: IntoIterator<Item = (nd::Array2<C64>, CoefFn)>
    {
        let terms: Vec<(nd::Array2<C64>, CoefFn)>
            = terms.into_iter()
            .map(|(M, f)| (M * C64::from(unit.factor()), f))
            .collect();
        let dim
            = terms.first()
            .map(|(M, _)| M.nrows())
            .ok_or_else(|| Error::InvalidParameter(
                "an operator needs at least one term".into()))?;
        if let Some((M, _)) = terms.iter().find(|(M, _)| M.shape() != [dim, dim]) {
            return Err(Error::Dimension(format!(
                "operator terms must all be {dim}x{dim}, found {:?}", M.shape())));
        }
        Ok(Self {
            terms,
            unit,
            dim,
            solver: Arc::new(DenseEigen),
            cache: EigenCache::default(),
        })
    }

    /// Create a time-independent `Operator`.
    pub fn constant(M: nd::Array2<C64>, unit: Unit) -> Result<Self> {
        Self::new([(M, coef(|_| 1.0))], unit)
    }

    /// Standard two-schedule annealing Hamiltonian
    /// `A(s) driver + B(s) problem`.
    pub fn annealing<FA, FB>(
        A: FA,
        B: FB,
        driver: nd::Array2<C64>,
        problem: nd::Array2<C64>,
        unit: Unit,
    ) -> Result<Self>
    where
        FA: Fn(f64) -> f64 + Send + Sync + 'static,
        FB: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::new([(driver, coef(A)), (problem, coef(B))], unit)
    }

    /// Replace the eigensolver.
    pub fn with_eigensolver<E>(mut self, solver: E) -> Self
    where E: EigenSolver + 'static
    {
        self.solver = Arc::new(solver);
        self.cache = EigenCache::default();
        self
    }

    /// Hermitian conjugate `Σ_k f_k(s) M_k†`, sharing the eigensolver.
    pub fn adjoint(&self) -> Self {
        let terms: Vec<(nd::Array2<C64>, CoefFn)>
            = self.terms.iter()
            .map(|(M, f)| (M.t().mapv(|a| a.conj()), f.clone()))
            .collect();
        Self {
            terms,
            unit: self.unit,
            dim: self.dim,
            solver: self.solver.clone(),
            cache: EigenCache::default(),
        }
    }

    /// Hilbert space dimension.
    pub fn dim(&self) -> usize { self.dim }

    /// Unit convention the operator was built with.
    pub fn unit(&self) -> Unit { self.unit }

    /// Number of terms.
    pub fn num_terms(&self) -> usize { self.terms.len() }

    /// Evaluate the operator at `s`.
    pub fn evaluate(&self, s: f64) -> nd::Array2<C64> {
        let mut acc: nd::Array2<C64> = nd::Array2::zeros((self.dim, self.dim));
        for (M, f) in self.terms.iter() {
            acc.scaled_add(C64::from(f(s)), M);
        }
        acc
    }

    /// Compute the lowest `lvl` eigenpairs at `s`, bypassing the cache.
    pub fn eigen_direct(&self, s: f64, lvl: usize)
        -> Result<(nd::Array1<f64>, nd::Array2<C64>)>
    {
        if lvl == 0 || lvl > self.dim {
            return Err(Error::InvalidParameter(format!(
                "cannot compute {lvl} level(s) of a {0}x{0} operator", self.dim)));
        }
        let (w, V) = self.solver.decompose(&self.evaluate(s), s, lvl)?;
        if w.len() != lvl || V.shape() != [self.dim, lvl] {
            return Err(Error::Dimension(format!(
                "eigensolver returned {} value(s) and a {:?} vector array for {lvl} level(s)",
                w.len(), V.shape(),
            )));
        }
        Ok((w, V))
    }

    /// Compute the lowest `lvl` eigenpairs at `s`, using the cached result if
    /// it was computed at exactly the same `s` and `lvl`.
    pub fn eigen_decompose(&mut self, s: f64, lvl: usize)
        -> Result<(nd::Array1<f64>, nd::Array2<C64>)>
    {
        if self.cache.s != Some(s) || self.cache.lvl != lvl {
            trace!(s, lvl, "refreshing eigen-cache");
            let (w, V) = self.eigen_direct(s, lvl)?;
            self.cache = EigenCache { s: Some(s), lvl, w, V };
        }
        Ok((self.cache.w.clone(), self.cache.V.clone()))
    }

    /// Time of the last cached decomposition, if any.
    pub fn cached_time(&self) -> Option<f64> { self.cache.s }

    /// Drop the cached decomposition.
    pub fn clear_cache(&mut self) { self.cache = EigenCache::default(); }
}
