//! Classical telegraph-noise ("fluctuator") baths.

use num_complex::Complex64 as C64;
use rand::Rng;
use rand_distr::{ Distribution, Exp };
use crate::{
    bath::BathModel,
    error::{ Error, Result },
};

/// Sum of independent symmetric telegraph processes, the `k`-th switching
/// between `±b_k` at Poisson rate `γ_k`.
///
/// The [`BathModel`] capabilities give the ensemble-averaged quantities
/// ```text
/// C(τ) = Σ_k b_k² e^{-2γ_k |τ|}
/// γ(ω) = Σ_k 4γ_k b_k² / (ω² + 4γ_k²)
/// S(ω) = Σ_k b_k² ω / (ω² + 4γ_k²)
/// ```
/// while [`Self::sample`] draws explicit noise realizations.
#[derive(Clone, Debug, PartialEq)]
pub struct FluctuatorEnsemble {
    b: Vec<f64>,
    gamma: Vec<f64>,
}

impl FluctuatorEnsemble {
    /// Create a new `FluctuatorEnsemble` from amplitudes and switching rates.
    pub fn new(b: Vec<f64>, gamma: Vec<f64>) -> Result<Self> {
        if b.len() != gamma.len() || b.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "fluctuator amplitudes ({}) and rates ({}) must be non-empty and of \
                equal length",
                b.len(), gamma.len(),
            )));
        }
        if let Some(g) = gamma.iter().find(|g| !(**g > 0.0 && g.is_finite())) {
            return Err(Error::InvalidParameter(
                format!("switching rates must be positive, got {g}")));
        }
        Ok(Self { b, gamma })
    }

    /// `n` fluctuators of equal amplitude `b` with switching rates spaced
    /// log-uniformly over `[γ_min, γ_max]`, giving an approximately `1/f`
    /// noise spectrum between those rates.
    pub fn one_over_f(n: usize, b: f64, gamma_min: f64, gamma_max: f64)
        -> Result<Self>
    {
        if n == 0 || !(gamma_min > 0.0) || !(gamma_max >= gamma_min) {
            return Err(Error::InvalidParameter(format!(
                "cannot build {n} fluctuator(s) over [{gamma_min}, {gamma_max}]")));
        }
        let (lmin, lmax) = (gamma_min.ln(), gamma_max.ln());
        let gamma: Vec<f64>
            = (0..n)
            .map(|k| {
                let x = if n == 1 { 0.5 } else { k as f64 / (n - 1) as f64 };
                (lmin + x * (lmax - lmin)).exp()
            })
            .collect();
        Self::new(vec![b; n], gamma)
    }

    /// Number of fluctuators.
    pub fn len(&self) -> usize { self.b.len() }

    /// Always `false`.
    pub fn is_empty(&self) -> bool { self.b.is_empty() }

    /// Amplitudes.
    pub fn amplitudes(&self) -> &[f64] { &self.b }

    /// Switching rates.
    pub fn rates(&self) -> &[f64] { &self.gamma }

    /// Draw one realization of the total noise `n(t) = Σ_k b_k σ_k(t)` over
    /// `[0, t_end]`, with each `σ_k(0) = ±1` uniformly at random.
    pub fn sample<R>(&self, rng: &mut R, t_end: f64) -> TelegraphNoise
    where R: Rng
    {
        let mut events: Vec<(f64, usize)> = Vec::new();
        let mut signs: Vec<f64> = Vec::with_capacity(self.len());
        for (k, &g) in self.gamma.iter().enumerate() {
            signs.push(if rng.gen::<bool>() { 1.0 } else { -1.0 });
            // rates are validated positive at construction
            let Ok(wait) = Exp::new(g) else { continue; };
            let mut t = 0.0;
            loop {
                t += wait.sample(rng);
                if t >= t_end { break; }
                events.push((t, k));
            }
        }
        events.sort_by(|l, r| l.0.total_cmp(&r.0));
        let mut value: f64 = self.b.iter().zip(&signs).map(|(b, s)| b * s).sum();
        let mut times: Vec<f64> = Vec::with_capacity(events.len() + 1);
        let mut values: Vec<f64> = Vec::with_capacity(events.len() + 1);
        times.push(0.0);
        values.push(value);
        for (t, k) in events.into_iter() {
            value -= 2.0 * self.b[k] * signs[k];
            signs[k] = -signs[k];
            times.push(t);
            values.push(value);
        }
        TelegraphNoise { times, values }
    }
}

impl BathModel for FluctuatorEnsemble {
    fn correlation(&self, tau: f64) -> C64 {
        self.b.iter().zip(&self.gamma)
            .map(|(b, g)| b * b * (-2.0 * g * tau.abs()).exp())
            .sum::<f64>()
            .into()
    }

    fn spectral_density(&self, omega: f64) -> f64 {
        self.b.iter().zip(&self.gamma)
            .map(|(b, g)| 4.0 * g * b * b / (omega * omega + 4.0 * g * g))
            .sum()
    }

    fn lamb_shift(&self, omega: f64) -> f64 {
        self.b.iter().zip(&self.gamma)
            .map(|(b, g)| b * b * omega / (omega * omega + 4.0 * g * g))
            .sum()
    }
}

/// Piecewise-constant noise realization: `values[i]` holds on
/// `[times[i], times[i + 1])`.
#[derive(Clone, Debug, PartialEq)]
pub struct TelegraphNoise {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl TelegraphNoise {
    /// Noise value at `t`; right-continuous at switching times.
    pub fn value_at(&self, t: f64) -> f64 {
        let k = self.times.partition_point(|&tk| tk <= t);
        self.values[k.saturating_sub(1)]
    }

    /// Value on each constant segment, starting from `t = 0`.
    pub fn values(&self) -> &[f64] { &self.values }

    /// Switching times, excluding `t = 0`.
    pub fn switch_times(&self) -> &[f64] { &self.times[1..] }

    /// Number of switching events.
    pub fn num_switches(&self) -> usize { self.times.len() - 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{ rngs::StdRng, SeedableRng };

    #[test]
    fn one_over_f_rates() {
        let f = FluctuatorEnsemble::one_over_f(5, 0.1, 0.01, 100.0).unwrap();
        assert_relative_eq!(f.rates()[0], 0.01, max_relative = 1e-12);
        assert_relative_eq!(f.rates()[2], 1.0, max_relative = 1e-12);
        assert_relative_eq!(f.rates()[4], 100.0, max_relative = 1e-12);
        assert!(f.amplitudes().iter().all(|&b| b == 0.1));
    }

    #[test]
    fn noise_takes_allowed_values() {
        let f = FluctuatorEnsemble::new(vec![0.5, 0.25], vec![3.0, 1.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(10546);
        let noise = f.sample(&mut rng, 5.0);
        assert!(noise.num_switches() > 0);
        for t in [0.0, 0.7, 1.9, 4.99] {
            let v = noise.value_at(t);
            assert!([0.75, 0.25, -0.25, -0.75].iter().any(|x| (v - x).abs() < 1e-12));
        }
        assert!(noise.switch_times().windows(2).all(|w| w[0] <= w[1]));
        assert!(noise.switch_times().iter().all(|&t| t > 0.0 && t < 5.0));
    }

    #[test]
    fn sampled_autocorrelation() {
        // time-averaged σ(0)σ(τ) over many realizations approaches e^{-2γτ}
        let f = FluctuatorEnsemble::new(vec![1.0], vec![1.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let tau = 0.4;
        let n = 20000;
        let acc: f64
            = (0..n)
            .map(|_| {
                let noise = f.sample(&mut rng, 1.0);
                noise.value_at(0.0) * noise.value_at(tau)
            })
            .sum();
        assert_relative_eq!(acc / n as f64, (-2.0 * tau).exp(), epsilon = 0.03);
        assert_relative_eq!(f.correlation(tau).re, (-2.0 * tau).exp());
    }
}
