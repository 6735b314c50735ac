//! Crate-level error type.
//!
//! Errors fall into four groups: configuration problems caught while assembling
//! an [`Annealing`][crate::dynamics::Annealing] or calling a solver, numerical
//! non-convergence of the integrator, reads outside of a solution's range, and
//! failures of caller-supplied routines, which are passed through untouched.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by caller-supplied routines.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    /// Two objects that must act on the same Hilbert space do not.
    #[error("dimension mismatch: {0}")]
    Dimension(String),

    /// The bath and the coupling set disagree on the number of channels.
    #[error("bath describes {bath} channel(s) but {coupling} coupling operator(s) were given")]
    ChannelCount { bath: usize, coupling: usize },

    /// The chosen solver needs something the annealing does not provide.
    #[error("missing capability: {0}")]
    MissingCapability(String),

    /// An initial state could not be interpreted as a valid quantum state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A numerical parameter is outside of its allowed domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The adaptive integrator could not meet its tolerance.
    #[error("integration failed at t = {t}: {reason}")]
    Convergence { t: f64, reason: String },

    /// A solution or interpolant was read outside of its support.
    #[error("time {t} outside of solution range [{lo}, {hi}]")]
    OutOfRange { t: f64, lo: f64, hi: f64 },

    /// LAPACK-level failure in the built-in eigensolver.
    #[error("linear algebra error: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),

    /// Malformed TOML configuration.
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Failure of a caller-supplied routine (eigensolver, generator, ...).
    #[error(transparent)]
    External(BoxedError),
}

impl Error {
    /// Wrap a caller-side error so that it passes through the solvers as-is.
    pub fn external<E>(err: E) -> Self
    where E: Into<BoxedError>
    {
        Self::External(err.into())
    }

    /// Return `true` for errors that originate in a caller-supplied routine.
    pub fn is_external(&self) -> bool { matches!(self, Self::External(_)) }
}
