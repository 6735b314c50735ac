//! Ohmic bosonic bath with exponential cutoff.

use std::f64::consts::{ PI, TAU };
use num_complex::Complex64 as C64;
use crate::{
    bath::BathModel,
    error::{ Error, Result },
    quad::{ self, QuadOptions },
    special::trigamma,
};

/// ħ / k<sub>B</sub> in ns·mK.
const HBAR_OVER_KB: f64 = 7.638_232_577;

/// Inverse temperature β = ħ / k<sub>B</sub>T in ns, for `T` in mK.
pub fn temperature_to_beta(T: f64) -> f64 { HBAR_OVER_KB / T }

/// Ohmic bath with spectral density
/// ```text
/// γ(ω) = 2π η ω e^{-|ω|/ωc} / (1 - e^{-βω})
/// ```
/// where `η` is the dimensionless coupling strength, `ωc` the (angular) cutoff
/// frequency, and `β` the inverse temperature.
#[derive(Clone, Debug, PartialEq)]
pub struct OhmicBath {
    pub eta: f64,
    pub omega_c: f64,
    pub beta: f64,
    /// Settings for the Lamb shift and inverse-transform quadratures.
    pub quad: QuadOptions,
}

impl OhmicBath {
    /// Create a new `OhmicBath` from the coupling strength, angular cutoff
    /// frequency (rad/ns), and inverse temperature (ns).
    pub fn new(eta: f64, omega_c: f64, beta: f64) -> Result<Self> {
        if !(eta >= 0.0) {
            return Err(Error::InvalidParameter(
                format!("ohmic coupling strength must be non-negative, got {eta}")));
        }
        if !(omega_c > 0.0) || !(beta > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "ohmic cutoff and inverse temperature must be positive, \
                got ωc = {omega_c}, β = {beta}",
            )));
        }
        Ok(Self { eta, omega_c, beta, quad: QuadOptions::default() })
    }

    /// Create a new `OhmicBath` from the coupling strength, linear cutoff
    /// frequency `fc` in GHz, and temperature `T` in mK.
    pub fn from_physical(eta: f64, fc: f64, T: f64) -> Result<Self> {
        if !(T > 0.0) {
            return Err(Error::InvalidParameter(
                format!("temperature must be positive, got {T}")));
        }
        Self::new(eta, TAU * fc, temperature_to_beta(T))
    }

    /// Replace the quadrature settings.
    pub fn with_quadrature(mut self, quad: QuadOptions) -> Self {
        self.quad = quad;
        self
    }

    /// Evaluate the correlation function by direct numerical inversion of the
    /// spectral density,
    /// ```text
    /// C(τ) = (1/2π) ∫ γ(ω) e^{-iωτ} dω
    /// ```
    /// instead of the closed form used by [`BathModel::correlation`].
    pub fn correlation_quadrature(&self, tau: f64) -> C64 {
        let lim = 60.0 * self.omega_c;
        let lo = -lim.min(60.0 / self.beta + self.omega_c);
        let opts = QuadOptions {
            max_subdivisions: self.quad.max_subdivisions.max(2000),
            ..self.quad
        };
        quad::integrate_points(
            |w| self.spectral_density(w) * C64::cis(-w * tau),
            &[lo, 0.0, lim],
            &opts,
        ).value / TAU
    }
}

impl BathModel for OhmicBath {
    /// Closed form
    /// ```text
    /// C(τ) = η/β² [ψ'(1 + 1/βωc − iτ/β) + ψ'(1/βωc + iτ/β)]
    /// ```
    /// where `ψ'` is the trigamma function.
    fn correlation(&self, tau: f64) -> C64 {
        let x2 = (self.beta * self.omega_c).recip();
        let y = C64::new(0.0, tau / self.beta);
        self.eta / self.beta.powi(2)
            * (trigamma(1.0 + x2 - y) + trigamma(x2 + y))
    }

    fn spectral_density(&self, omega: f64) -> f64 {
        if omega == 0.0 {
            TAU * self.eta / self.beta
        } else {
            TAU * self.eta * omega * (-omega.abs() / self.omega_c).exp()
                / -(-self.beta * omega).exp_m1()
        }
    }

    /// Principal value integral evaluated by subtracting the pole:
    /// ```text
    /// P∫_a^b γ(x)/(ω - x) dx
    ///     = ∫_a^b (γ(x) - γ(ω))/(ω - x) dx + γ(ω) ln((ω - a)/(b - ω))
    /// ```
    /// over a range extending 20 cutoffs beyond both `0` and `ω`.
    fn lamb_shift(&self, omega: f64) -> f64 {
        let L = 20.0 * self.omega_c;
        let a = omega.min(0.0) - L;
        let b = omega.max(0.0) + L;
        let g0 = self.spectral_density(omega);
        let mut points = vec![a, omega.min(0.0), omega.max(0.0), b];
        points.dedup();
        let integrand = |x: f64| {
            let d = omega - x;
            if d == 0.0 { 0.0 } else { (self.spectral_density(x) - g0) / d }
        };
        let pv = quad::integrate_points(integrand, &points, &self.quad).value;
        (pv + g0 * ((omega - a) / (b - omega)).ln()) / (2.0 * PI)
    }
}
