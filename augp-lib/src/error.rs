//! Error taxonomy for model construction and training.

use faer_cholesky::llt::CholeskyError;
use thiserror::Error;

/// Error in building or training a GP model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpError {
    /// malformed inputs detected at construction: mismatched lengths,
    /// batch or inducing-point counts outside (0, n), bad target encoding
    #[error("configuration error: {0}")]
    Configuration(String),
    /// the requested (likelihood, inference) combination is not implemented
    #[error("no implementation for likelihood {likelihood} with inference {inference}")]
    Compatibility {
        /// name of the offending likelihood
        likelihood: &'static str,
        /// name of the offending inference
        inference: &'static str,
    },
    /// a covariance matrix stayed non positive definite after the bounded
    /// jitter-repair loop
    #[error("numerical degeneracy: matrix not positive definite after {attempts} jitter attempts")]
    NumericalDegeneracy {
        /// repair attempts made before giving up
        attempts: usize,
    },
}

impl From<CholeskyError> for GpError {
    fn from(_e: CholeskyError) -> GpError {
        GpError::NumericalDegeneracy { attempts: 0 }
    }
}
