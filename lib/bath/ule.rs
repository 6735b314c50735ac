//! Jump-correlator bath for the universal Lindblad equation.

use std::{ f64::consts::{ PI, TAU }, sync::{ Arc, OnceLock } };
use num_complex::Complex64 as C64;
use tracing::debug;
use crate::{
    bath::{ BathModel, OhmicBath },
    error::{ Error, Result },
    interp::{ Extrapolation, GridInterpolant },
    quad::{ self, QuadOptions },
};

/// Settings for tabulating the jump correlator.
///
/// Each grid point at time `t` costs one adaptive Gauss-Kronrod integration
/// over `[-omega_max, omega_max]`, split into `⌈omega_max |t| / π⌉` panels per
/// half-range so that every panel holds at most half an oscillation. Building
/// the table therefore takes on the order of `points · omega_max · window / π`
/// panels of 15 evaluations of `γ(ω)` each, about 4·10⁶ panels for the
/// 2001-point default with `window = 6` and `omega_max = 40 · 8π`. Requests needing more than `max_panels` panels for a
/// single point fail with [`Error::Convergence`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct UleOptions {
    /// Half-width `W` of the table `[-W, W]`, in ns; also the cutoff of the
    /// convolution defining the jump operator.
    pub window: f64,
    /// Frequency beyond which `γ(ω)` is taken to vanish, in rad/ns.
    pub omega_max: f64,
    /// Number of grid points.
    pub points: usize,
    /// Upper bound on the quadrature panels spent on a single `g(t)`.
    pub max_panels: usize,
}

impl UleOptions {
    /// Create a new `UleOptions` with 2001 grid points and at most 8192
    /// panels per point.
    pub fn new(window: f64, omega_max: f64) -> Self {
        Self { window, omega_max, points: 2001, max_panels: 8192 }
    }

    /// Number of panels needed to evaluate `g(t)`.
    pub fn panels_at(&self, t: f64) -> usize {
        // one panel per half-oscillation of e^{-iωt} on each side of zero
        2 * ((self.omega_max * t.abs() / PI).ceil() as usize).max(1)
    }
}

/// Bath carrying the jump correlator
/// ```text
/// g(t) = (1/2π) ∫ sqrt(γ(ω)) e^{-iωt} dω
/// ```
/// of an underlying [`BathModel`], tabulated once on first use and
/// interpolated with flat extrapolation thereafter.
///
/// The remaining capabilities are those of the underlying model.
#[derive(Clone, Debug)]
pub struct UleBath {
    base: Arc<dyn BathModel>,
    opts: UleOptions,
    quad: QuadOptions,
    table: OnceLock<GridInterpolant<C64>>,
}

impl UleBath {
    /// Create a new `UleBath`.
    pub fn new(base: Arc<dyn BathModel>, opts: UleOptions) -> Result<Self> {
        if !(opts.window > 0.0) || !(opts.omega_max > 0.0) || opts.points < 2 {
            return Err(Error::InvalidParameter(format!(
                "invalid jump correlator table: window {}, ω_max {}, {} point(s)",
                opts.window, opts.omega_max, opts.points,
            )));
        }
        Ok(Self { base, opts, quad: QuadOptions::default(), table: OnceLock::new() })
    }

    /// Jump-correlator bath over an Ohmic bath, with the frequency cutoff
    /// placed at 40 `ωc`.
    pub fn ohmic(bath: OhmicBath, window: f64) -> Result<Self> {
        let omega_max = 40.0 * bath.omega_c;
        Self::new(Arc::new(bath), UleOptions::new(window, omega_max))
    }

    /// Replace the quadrature settings used to build the table.
    pub fn with_quadrature(mut self, quad: QuadOptions) -> Self {
        self.quad = quad;
        self.table = OnceLock::new();
        self
    }

    /// Tabulation settings.
    pub fn options(&self) -> &UleOptions { &self.opts }

    /// Half-width of the tabulated range.
    pub fn window(&self) -> f64 { self.opts.window }

    /// Underlying bath model.
    pub fn base(&self) -> &dyn BathModel { self.base.as_ref() }

    /// Return `true` if the table has been built.
    pub fn is_tabulated(&self) -> bool { self.table.get().is_some() }

    /// Evaluate `g(t)` by quadrature, without the table.
    pub fn jump_correlator_direct(&self, t: f64) -> Result<C64> {
        let W = self.opts.omega_max;
        let panels = self.opts.panels_at(t);
        if panels > self.opts.max_panels {
            return Err(Error::Convergence {
                t,
                reason: format!(
                    "jump correlator needs {panels} quadrature panels, limit is {}",
                    self.opts.max_panels,
                ),
            });
        }
        let half = panels / 2;
        let points: Vec<f64>
            = (0..=panels)
            .map(|k| -W + W * k as f64 / half as f64)
            .collect();
        let sqrt_gamma = |w: f64| self.base.spectral_density(w).max(0.0).sqrt();
        let res = quad::try_integrate_points(
            |w| Ok::<_, Error>(C64::cis(-w * t) * sqrt_gamma(w)), &points, &self.quad,
        )?;
        Ok(res.value / TAU)
    }

    /// Interpolation table for `g(t)`, built on the first call.
    pub fn table(&self) -> Result<&GridInterpolant<C64>> {
        if let Some(table) = self.table.get() {
            return Ok(table);
        }
        debug!(
            window = self.opts.window,
            points = self.opts.points,
            panels = self.opts.panels_at(self.opts.window),
            "tabulating jump correlator",
        );
        let W = self.opts.window;
        let table
            = GridInterpolant::try_tabulate(
                -W, W, self.opts.points, Extrapolation::Flat,
                |t| self.jump_correlator_direct(t),
            )?;
        Ok(self.table.get_or_init(move || table))
    }

    /// Evaluate `g(t)` from the table.
    pub fn jump_correlator(&self, t: f64) -> Result<C64> {
        self.table()?.eval(t)
    }
}

impl BathModel for UleBath {
    fn correlation(&self, tau: f64) -> C64 { self.base.correlation(tau) }

    fn spectral_density(&self, omega: f64) -> f64 {
        self.base.spectral_density(omega)
    }

    fn lamb_shift(&self, omega: f64) -> f64 { self.base.lamb_shift(omega) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ule() -> UleBath {
        let ohmic = OhmicBath::new(0.1, TAU, 1.0).unwrap();
        UleBath::ohmic(ohmic, 5.0).unwrap()
    }

    #[test]
    fn table_is_lazy_and_matches_quadrature() {
        let bath = ule();
        assert!(!bath.is_tabulated());
        let g = bath.jump_correlator(0.123).unwrap();
        assert!(bath.is_tabulated());
        let direct = bath.jump_correlator_direct(0.123).unwrap();
        let scale = bath.jump_correlator_direct(0.0).unwrap().norm();
        assert!((g - direct).norm() < 1e-3 * scale);
        // flat beyond the grid
        assert_eq!(bath.jump_correlator(50.0).unwrap(), bath.jump_correlator(5.0).unwrap());
    }

    #[test]
    fn parseval() {
        // ∫ |g(t)|² dt = (1/2π) ∫ γ(ω) dω = C(0)
        let bath = ule();
        let table = bath.table().unwrap();
        let opts = QuadOptions { abstol: 1e-10, reltol: 1e-8, max_subdivisions: 2000, strict: false };
        let norm2 = quad::integrate_points(
            |t| table.eval(t).map(|g| g.norm_sqr()).unwrap_or(f64::NAN),
            &[-5.0, -0.5, 0.0, 0.5, 5.0],
            &opts,
        ).value;
        assert_relative_eq!(norm2, bath.correlation(0.0).re, max_relative = 1e-2);
    }

    #[test]
    fn invalid_options() {
        let ohmic = OhmicBath::new(0.1, TAU, 1.0).unwrap();
        assert!(UleBath::new(Arc::new(ohmic), UleOptions::new(0.0, 1.0)).is_err());
    }

    #[test]
    fn panel_count_is_capped() {
        let ohmic = OhmicBath::new(0.1, TAU, 1.0).unwrap();
        let opts = UleOptions { max_panels: 64, ..UleOptions::new(5.0, 40.0 * TAU) };
        assert_eq!(opts.panels_at(0.0), 2);
        assert_eq!(opts.panels_at(4.99), 800);
        let bath = UleBath::new(Arc::new(ohmic), opts).unwrap();
        assert!(bath.jump_correlator_direct(0.05).is_ok());
        match bath.jump_correlator_direct(0.99) {
            Err(Error::Convergence { t, reason }) => {
                assert_eq!(t, 0.99);
                assert!(reason.contains("160 quadrature panels"));
            },
            other => panic!("expected a convergence error, got {other:?}"),
        }
        assert!(matches!(bath.table(), Err(Error::Convergence { .. })));
        assert!(!bath.is_tabulated());
    }
}
