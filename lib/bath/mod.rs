//! Bath models.
//!
//! A bath is characterized statistically by its two-point correlation function
//! `C(τ)`, its spectral density `γ(ω) = ∫ C(τ) e^{iωτ} dτ`, and its Lamb shift
//! `S(ω) = (1/2π) P∫ γ(x) / (ω - x) dx`. Single-model baths implement
//! [`BathModel`] and couple identically and independently to every channel of
//! a [`CouplingSet`][crate::dynamics::CouplingSet]; [`CorrelatedBath`]
//! describes cross-correlated channels by an explicit matrix of correlation
//! functions.

use std::{ fmt, sync::Arc };
use num_complex::Complex64 as C64;
use crate::{
    error::{ Error, Result },
    quad::{ self, QuadOptions },
};

pub mod ohmic;
pub mod correlated;
pub mod fluctuator;
pub mod ule;

pub use ohmic::{ OhmicBath, temperature_to_beta };
pub use correlated::{ CorrelatedBath, CorrelationFn };
pub use fluctuator::{ FluctuatorEnsemble, TelegraphNoise };
pub use ule::{ UleBath, UleOptions };

/// Capability set of a single-channel bath.
pub trait BathModel: Send + Sync + fmt::Debug {
    /// Two-point correlation function `C(τ)`, with `τ` in ns.
    fn correlation(&self, tau: f64) -> C64;

    /// Spectral density `γ(ω)`, with `ω` in rad/ns.
    fn spectral_density(&self, omega: f64) -> f64;

    /// Lamb shift `S(ω)`, with `ω` in rad/ns.
    fn lamb_shift(&self, omega: f64) -> f64;
}

/// Bath attached to an [`Annealing`][crate::dynamics::Annealing].
#[derive(Clone, Debug)]
pub enum Bath {
    Ohmic(OhmicBath),
    Correlated(CorrelatedBath),
    Fluctuator(FluctuatorEnsemble),
    Ule(UleBath),
    /// Any caller-provided model.
    Custom(Arc<dyn BathModel>),
}

impl From<OhmicBath> for Bath {
    fn from(bath: OhmicBath) -> Self { Self::Ohmic(bath) }
}

impl From<CorrelatedBath> for Bath {
    fn from(bath: CorrelatedBath) -> Self { Self::Correlated(bath) }
}

impl From<FluctuatorEnsemble> for Bath {
    fn from(bath: FluctuatorEnsemble) -> Self { Self::Fluctuator(bath) }
}

impl From<UleBath> for Bath {
    fn from(bath: UleBath) -> Self { Self::Ule(bath) }
}

impl Bath {
    /// Wrap a caller-provided model.
    pub fn custom<B>(model: B) -> Self
    where B: BathModel + 'static
    {
        Self::Custom(Arc::new(model))
    }

    /// Short name of the variant, for messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ohmic(_) => "ohmic",
            Self::Correlated(_) => "correlated",
            Self::Fluctuator(_) => "fluctuator",
            Self::Ule(_) => "ule",
            Self::Custom(_) => "custom",
        }
    }

    /// The single-channel model, if the bath is not cross-correlated.
    pub fn model(&self) -> Option<&dyn BathModel> {
        match self {
            Self::Ohmic(b) => Some(b),
            Self::Correlated(_) => None,
            Self::Fluctuator(b) => Some(b),
            Self::Ule(b) => Some(b),
            Self::Custom(b) => Some(b.as_ref()),
        }
    }

    /// Number of channels fixed by the bath, if any. Single-model baths
    /// attach to any number of channels.
    pub fn num_channels(&self) -> Option<usize> {
        match self {
            Self::Correlated(b) => Some(b.num_channels()),
            _ => None,
        }
    }

    /// Channel pairs `(a, b)` with a non-zero correlation, for `n` coupling
    /// operators.
    pub fn channel_pairs(&self, n: usize) -> Vec<(usize, usize)> {
        match self {
            Self::Correlated(b) => b.pairs().collect(),
            _ => (0..n).map(|a| (a, a)).collect(),
        }
    }

    /// Correlation `C_ab(τ)` between channels `a` and `b`.
    pub fn correlation(&self, a: usize, b: usize, tau: f64) -> C64 {
        match (self, self.model()) {
            (Self::Correlated(bath), _) => bath.correlation(a, b, tau),
            (_, Some(model)) if a == b => model.correlation(tau),
            _ => C64::new(0.0, 0.0),
        }
    }

    /// Spectral density `γ(ω)`.
    pub fn spectral_density(&self, omega: f64) -> Result<f64> {
        self.require_model("spectral density")
            .map(|model| model.spectral_density(omega))
    }

    /// Lamb shift `S(ω)`.
    pub fn lamb_shift(&self, omega: f64) -> Result<f64> {
        self.require_model("Lamb shift")
            .map(|model| model.lamb_shift(omega))
    }

    pub(crate) fn require_model(&self, what: &str) -> Result<&dyn BathModel> {
        self.model()
            .ok_or_else(|| Error::MissingCapability(format!(
                "{} bath does not provide a {what}; use a single-channel bath \
                or its half-sided transform",
                self.kind(),
            )))
    }
}

/// Half-sided Fourier transform `Γ(ω) = ∫_0^T C(τ) e^{iωτ} dτ`.
///
/// For `T` past the decay of `C`, `Γ(ω) ≈ γ(ω)/2 + i S(ω)`.
pub fn half_sided_transform<F>(c: F, omega: f64, T: f64, opts: &QuadOptions)
    -> C64
where F: Fn(f64) -> C64
{
    quad::integrate(|tau| c(tau) * C64::cis(omega * tau), 0.0, T, opts).value
}

/// Bath timescales `(τ_SB, τ_B)` from the first two absolute moments of the
/// correlation function over `[0, lim]`:
/// ```text
/// 1 / τ_SB = ∫ |C(τ)| dτ
/// τ_B = ∫ τ |C(τ)| dτ / ∫ |C(τ)| dτ
/// ```
pub fn bath_timescales(model: &dyn BathModel, lim: f64, opts: &QuadOptions)
    -> Result<(f64, f64)>
{
    if !(lim > 0.0) {
        return Err(Error::InvalidParameter(
            format!("timescale integration limit must be positive, got {lim}")));
    }
    let m0 = quad::integrate(|tau| model.correlation(tau).norm(), 0.0, lim, opts).value;
    let m1
        = quad::integrate(|tau| tau * model.correlation(tau).norm(), 0.0, lim, opts)
        .value;
    if m0 <= 0.0 {
        return Err(Error::InvalidParameter(
            "bath correlation function vanishes identically".into()));
    }
    Ok((m0.recip(), m1 / m0))
}

/// Default coarse-graining window `sqrt(τ_B τ_SB / 5)`.
pub fn coarse_grain_timescale(model: &dyn BathModel, lim: f64) -> Result<f64> {
    let (tau_sb, tau_b) = bath_timescales(model, lim, &QuadOptions::default())?;
    Ok((tau_b * tau_sb / 5.0).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn correlated_bath_has_no_spectral_density() {
        let c: CorrelationFn = Arc::new(|tau: f64| C64::from((-tau.abs()).exp()));
        let bath: Bath = CorrelatedBath::new(1, vec![((0, 0), c)]).unwrap().into();
        assert!(matches!(bath.spectral_density(1.0), Err(Error::MissingCapability(_))));
        assert_eq!(bath.num_channels(), Some(1));
        assert_eq!(bath.channel_pairs(1), vec![(0, 0)]);
    }

    #[test]
    fn single_model_is_diagonal() {
        let bath: Bath = FluctuatorEnsemble::new(vec![1.0], vec![0.5]).unwrap().into();
        assert_eq!(bath.channel_pairs(3), vec![(0, 0), (1, 1), (2, 2)]);
        assert_eq!(bath.correlation(0, 1, 0.0), C64::new(0.0, 0.0));
        assert_relative_eq!(bath.correlation(1, 1, 0.0).re, 1.0);
    }

    #[test]
    fn half_sided_fluctuator() {
        let bath = FluctuatorEnsemble::new(vec![0.3], vec![2.0]).unwrap();
        let omega = 1.3;
        let G = half_sided_transform(
            |tau| bath.correlation(tau), omega, 20.0, &QuadOptions::default());
        assert_relative_eq!(G.re, bath.spectral_density(omega) / 2.0, max_relative = 1e-6);
        assert_relative_eq!(G.im, bath.lamb_shift(omega), max_relative = 1e-6);
    }

    #[test]
    fn exponential_timescales() {
        // C = b² e^{-2γτ}: 1/τ_SB = b²/2γ, τ_B = 1/2γ
        let bath = FluctuatorEnsemble::new(vec![0.5], vec![1.0]).unwrap();
        let (tau_sb, tau_b)
            = bath_timescales(&bath, 40.0, &QuadOptions::default()).unwrap();
        assert_relative_eq!(tau_sb, 8.0, max_relative = 1e-8);
        assert_relative_eq!(tau_b, 0.5, max_relative = 1e-8);
        let ta = coarse_grain_timescale(&bath, 40.0).unwrap();
        assert_relative_eq!(ta, (0.8_f64).sqrt(), max_relative = 1e-8);
    }
}
