//! Solver configuration.
//!
//! All numerical knobs live in [`SolverConfig`], which can be built in code or
//! deserialized from a TOML document:
//! ```toml
//! max_steps = 50000
//! vectorize = false
//! positivity_threshold = 1e-6
//!
//! [tolerances]
//! abstol = 1e-8
//! reltol = 1e-6
//!
//! strict_quadrature = true
//!
//! [quadrature]
//! abstol = 1e-8
//! reltol = 1e-6
//! ```
//! Scheduled pulses are runtime-only and never read from TOML.

use serde::{ Deserialize, Serialize };
use crate::{
    error::Result,
    ode::OdeOptions,
    quad::QuadOptions,
    solve::Pulse,
};

/// Absolute/relative error tolerance pair.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub abstol: f64,
    pub reltol: f64,
}

impl Tolerances {
    /// Create a new `Tolerances`.
    pub const fn new(abstol: f64, reltol: f64) -> Self { Self { abstol, reltol } }
}

impl Default for Tolerances {
    fn default() -> Self { Self::new(1e-8, 1e-6) }
}

/// Numerical settings shared by every solver entry point.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Integrator tolerances.
    pub tolerances: Tolerances,
    /// Tolerances for the quadratures embedded in the generators.
    pub quadrature: Tolerances,
    /// Maximum number of interval bisections per embedded quadrature.
    pub quad_subdivisions: usize,
    /// Turn unmet quadrature tolerances (including the coarse-grained
    /// kernel's panel refinement) into [`Error::Convergence`] instead of a
    /// logged warning.
    ///
    /// [`Error::Convergence`]: crate::error::Error::Convergence
    pub strict_quadrature: bool,
    /// Maximum number of integrator steps (accepted or rejected).
    pub max_steps: usize,
    /// Optional upper bound on the integrator step, in units of `s`.
    pub dt_max: Option<f64>,
    /// Flatten matrix-valued states before integration.
    pub vectorize: bool,
    /// Halt density-matrix integration once the minimum eigenvalue drops below
    /// `-positivity_threshold`.
    pub positivity_threshold: Option<f64>,
    /// Instantaneous unitary kicks applied at fixed values of `s`.
    #[serde(skip)]
    pub pulses: Vec<Pulse>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerances: Tolerances::default(),
            quadrature: Tolerances::default(),
            quad_subdivisions: 200,
            strict_quadrature: false,
            max_steps: 100_000,
            dt_max: None,
            vectorize: false,
            positivity_threshold: None,
            pulses: Vec::new(),
        }
    }
}

impl SolverConfig {
    /// Looser preset for the coarse-grained master equation, whose generator
    /// embeds a double quadrature.
    pub fn cgme() -> Self {
        Self {
            tolerances: Tolerances::new(1e-6, 1e-4),
            quadrature: Tolerances::new(1e-6, 1e-4),
            ..Self::default()
        }
    }

    /// Parse a configuration from a TOML document; missing keys take their
    /// default values.
    pub fn from_toml_str(src: &str) -> Result<Self> {
        Ok(toml::from_str(src)?)
    }

    /// Set the integrator tolerances.
    pub fn with_tolerances(mut self, abstol: f64, reltol: f64) -> Self {
        self.tolerances = Tolerances::new(abstol, reltol);
        self
    }

    /// Set the embedded quadrature tolerances.
    pub fn with_quadrature(mut self, abstol: f64, reltol: f64) -> Self {
        self.quadrature = Tolerances::new(abstol, reltol);
        self
    }

    /// Fail on unmet quadrature tolerances instead of warning.
    pub fn with_strict_quadrature(mut self, strict: bool) -> Self {
        self.strict_quadrature = strict;
        self
    }

    /// Enable or disable state vectorization.
    pub fn with_vectorize(mut self, vectorize: bool) -> Self {
        self.vectorize = vectorize;
        self
    }

    /// Enable the positivity check with the given threshold.
    pub fn with_positivity_check(mut self, threshold: f64) -> Self {
        self.positivity_threshold = Some(threshold.abs());
        self
    }

    /// Append a scheduled pulse.
    pub fn with_pulse(mut self, pulse: Pulse) -> Self {
        self.pulses.push(pulse);
        self
    }

    pub(crate) fn ode_options(&self) -> OdeOptions {
        let mut opts = OdeOptions::new(self.tolerances.abstol, self.tolerances.reltol);
        opts.max_steps = self.max_steps;
        if let Some(dt_max) = self.dt_max { opts.dt_max = dt_max; }
        opts.tstops = self.pulses.iter().map(|p| p.s).collect();
        opts
    }

    pub(crate) fn quad_options(&self) -> QuadOptions {
        QuadOptions {
            abstol: self.quadrature.abstol,
            reltol: self.quadrature.reltol,
            max_subdivisions: self.quad_subdivisions,
            strict: self.strict_quadrature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_defaults() {
        let src = r#"
            max_steps = 500
            positivity_threshold = 1e-5

            [tolerances]
            abstol = 1e-10
            reltol = 1e-9
        "#;
        let config = SolverConfig::from_toml_str(src).unwrap();
        assert_eq!(config.max_steps, 500);
        assert_eq!(config.positivity_threshold, Some(1e-5));
        assert_eq!(config.tolerances, Tolerances::new(1e-10, 1e-9));
        assert_eq!(config.quadrature, Tolerances::default());
        assert!(!config.vectorize);
        assert!(!config.strict_quadrature);
        assert!(config.pulses.is_empty());
    }

    #[test]
    fn strict_quadrature_reaches_quad_options() {
        let config = SolverConfig::from_toml_str("strict_quadrature = true").unwrap();
        assert!(config.quad_options().strict);
        assert!(!SolverConfig::default().quad_options().strict);
        assert!(SolverConfig::cgme().with_strict_quadrature(true).quad_options().strict);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = SolverConfig::from_toml_str("max_steps = \"many\"").unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }

    #[test]
    fn cgme_preset_is_looser() {
        let base = SolverConfig::default();
        let cgme = SolverConfig::cgme();
        assert!(cgme.tolerances.reltol > base.tolerances.reltol);
        assert!(cgme.quadrature.abstol > base.quadrature.abstol);
    }
}
