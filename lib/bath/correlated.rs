//! Baths with explicitly cross-correlated channels.

use std::{ fmt, sync::Arc };
use num_complex::Complex64 as C64;
use rustc_hash::FxHashMap as HashMap;
use crate::{
    bath::half_sided_transform,
    error::{ Error, Result },
    quad::QuadOptions,
};

/// Heap-allocated correlation function of the time lag `τ`.
pub type CorrelationFn = Arc<dyn Fn(f64) -> C64 + Send + Sync>;

/// Matrix of pairwise correlation functions `C_ab(τ)` over `n` channels.
///
/// `C_ab` and `C_ba` are independent entries; both must be given for every
/// off-diagonal pair. Unlisted pairs are uncorrelated.
#[derive(Clone)]
pub struct CorrelatedBath {
    n: usize,
    entries: Vec<((usize, usize), CorrelationFn)>,
    index: HashMap<(usize, usize), usize>,
}

impl fmt::Debug for CorrelatedBath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelatedBath")
            .field("n", &self.n)
            .field("pairs", &self.entries.iter().map(|(ab, _)| *ab).collect::<Vec<_>>())
            .finish()
    }
}

impl CorrelatedBath {
    /// Create a new `CorrelatedBath` over `n` channels.
    pub fn new(n: usize, entries: Vec<((usize, usize), CorrelationFn)>)
        -> Result<Self>
    {
        let mut index: HashMap<(usize, usize), usize> = HashMap::default();
        for (k, ((a, b), _)) in entries.iter().enumerate() {
            if *a >= n || *b >= n {
                return Err(Error::InvalidParameter(format!(
                    "correlation entry ({a}, {b}) out of range for {n} channel(s)")));
            }
            if index.insert((*a, *b), k).is_some() {
                return Err(Error::InvalidParameter(
                    format!("duplicate correlation entry ({a}, {b})")));
            }
        }
        if let Some((a, b))
            = index.keys().find(|(a, b)| !index.contains_key(&(*b, *a)))
        {
            return Err(Error::MissingCapability(format!(
                "correlation entry ({a}, {b}) is given without its partner ({b}, {a})")));
        }
        Ok(Self { n, entries, index })
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize { self.n }

    /// Iterate over all listed channel pairs, in the order given.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.entries.iter().map(|(ab, _)| *ab)
    }

    /// Correlation between channels `a` and `b`.
    pub fn correlation(&self, a: usize, b: usize, tau: f64) -> C64 {
        self.index.get(&(a, b))
            .map(|&k| (self.entries[k].1)(tau))
            .unwrap_or(C64::new(0.0, 0.0))
    }

    /// Half-sided transform `∫_0^T C_ab(τ) e^{iωτ} dτ` of one entry.
    pub fn half_sided(&self, a: usize, b: usize, omega: f64, T: f64, opts: &QuadOptions)
        -> C64
    {
        half_sided_transform(|tau| self.correlation(a, b, tau), omega, T, opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn expc(rate: f64) -> CorrelationFn {
        Arc::new(move |tau: f64| C64::from((-rate * tau.abs()).exp()))
    }

    #[test]
    fn partner_entries_required() {
        let res = CorrelatedBath::new(2, vec![((0, 1), expc(1.0))]);
        assert!(matches!(res, Err(Error::MissingCapability(_))));
        let res = CorrelatedBath::new(2, vec![((0, 1), expc(1.0)), ((1, 0), expc(2.0))]);
        assert!(res.is_ok());
    }

    #[test]
    fn asymmetric_entries() {
        let bath
            = CorrelatedBath::new(2, vec![((0, 1), expc(1.0)), ((1, 0), expc(2.0))])
            .unwrap();
        assert_relative_eq!(bath.correlation(0, 1, 1.0).re, (-1.0_f64).exp());
        assert_relative_eq!(bath.correlation(1, 0, 1.0).re, (-2.0_f64).exp());
        assert_eq!(bath.correlation(0, 0, 1.0), C64::new(0.0, 0.0));
        let G = bath.half_sided(0, 1, 0.0, 30.0, &QuadOptions::default());
        assert_relative_eq!(G.re, 1.0, max_relative = 1e-8);
    }

    #[test]
    fn out_of_range_rejected() {
        assert!(CorrelatedBath::new(1, vec![((0, 1), expc(1.0))]).is_err());
    }
}
