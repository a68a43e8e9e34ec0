//! Inference strategies and the shared mini-batch bookkeeping.
//!
//! The strategy requested at construction is replaced by a fully initialised
//! [`VariationalEngine`] sized to the data: the engine owns the convergence
//! tolerance, the iteration counter, the mini-batch index set and its
//! unbiased scale correction $\rho = n / |\mathcal{B}|$, and one
//! [`InverseDecay`] schedule per latent process for the stochastic
//! natural-gradient steps.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::GpError;
use crate::optim::InverseDecay;

/// Inference strategy requested at model construction
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InferenceSpec {
    /// closed-form conjugate regression, Gaussian likelihood only
    Analytic,
    /// full-batch coordinate ascent on the natural parameters
    AnalyticVI {
        /// convergence tolerance on the variational parameter change
        epsilon: f64,
    },
    /// stochastic natural-gradient ascent on mini-batches
    AnalyticSVI {
        /// mini-batch size, must lie in (0, n]
        batch: usize,
        /// convergence tolerance on the variational parameter change
        epsilon: f64,
    },
    /// blocked Gibbs sampling over the augmented model — not implemented
    GibbsSampling,
    /// Gauss-Hermite quadrature VI for non-conjugate paths — not implemented
    QuadratureVI,
}

impl InferenceSpec {
    /// name used in compatibility errors
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            InferenceSpec::Analytic => "Analytic",
            InferenceSpec::AnalyticVI { .. } => "AnalyticVI",
            InferenceSpec::AnalyticSVI { .. } => "AnalyticSVI",
            InferenceSpec::GibbsSampling => "GibbsSampling",
            InferenceSpec::QuadratureVI => "QuadratureVI",
        }
    }

    /// variational coordinate-ascent family (the only strategies the VGP and
    /// SVGP containers implement)
    #[must_use]
    pub fn is_variational(&self) -> bool {
        matches!(
            self,
            InferenceSpec::AnalyticVI { .. } | InferenceSpec::AnalyticSVI { .. }
        )
    }
}

/// Initialised state of the analytic (S)VI strategies
#[derive(Clone, Debug)]
pub struct VariationalEngine {
    epsilon: f64,
    iter: usize,
    stochastic: bool,
    batch: usize,
    nsamples: usize,
    indices: Vec<usize>,
    schedules: Vec<InverseDecay>,
    rng: ChaCha8Rng,
}

impl VariationalEngine {
    /// build the engine from a spec, sized to the data
    ///
    /// # Errors
    ///
    /// [`GpError::Configuration`] for a mini-batch size outside (0, n]
    pub(crate) fn from_spec(
        spec: &InferenceSpec,
        nsamples: usize,
        nlatent: usize,
        seed: u64,
    ) -> Result<Self, GpError> {
        let (stochastic, batch, epsilon) = match *spec {
            InferenceSpec::AnalyticVI { epsilon } => (false, nsamples, epsilon),
            InferenceSpec::AnalyticSVI { batch, epsilon } => {
                if batch == 0 || batch > nsamples {
                    return Err(GpError::Configuration(format!(
                        "mini-batch size {batch} outside (0, {nsamples}]"
                    )));
                }
                (true, batch, epsilon)
            }
            // Analytic is handled by the exact GP container, the rest are
            // rejected earlier by the compatibility check
            _ => {
                return Err(GpError::Configuration(format!(
                    "{} is not a variational strategy",
                    spec.name()
                )))
            }
        };
        Ok(VariationalEngine {
            epsilon,
            iter: 0,
            stochastic,
            batch,
            nsamples,
            indices: (0..batch).collect(),
            schedules: vec![InverseDecay::default(); nlatent],
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub(crate) fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub(crate) fn iteration(&self) -> usize {
        self.iter
    }

    pub(crate) fn is_stochastic(&self) -> bool {
        self.stochastic
    }

    /// unbiased stochastic-gradient scale $\rho = n / |\mathcal{B}|$
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn rho(&self) -> f64 {
        self.nsamples as f64 / self.batch as f64
    }

    /// the index set of the last drawn sweep
    pub(crate) fn current_batch(&self) -> &[usize] {
        &self.indices
    }

    /// draw the index set for this sweep (identity when full batch) and
    /// advance the iteration counter
    pub(crate) fn next_batch(&mut self) -> &[usize] {
        self.iter += 1;
        if self.stochastic {
            self.indices =
                rand::seq::index::sample(&mut self.rng, self.nsamples, self.batch).into_vec();
        }
        &self.indices
    }

    /// step sizes for the pending global update, one per latent: the
    /// Robbins-Monro schedule when stochastic, the exact full step otherwise
    pub(crate) fn step_sizes(&mut self) -> Vec<f64> {
        if self.stochastic {
            self.schedules.iter_mut().map(InverseDecay::next_step).collect()
        } else {
            vec![1.; self.schedules.len()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_bounds_checked() {
        let spec = InferenceSpec::AnalyticSVI {
            batch: 0,
            epsilon: 1e-5,
        };
        assert!(VariationalEngine::from_spec(&spec, 10, 1, 0).is_err());
        let spec = InferenceSpec::AnalyticSVI {
            batch: 11,
            epsilon: 1e-5,
        };
        assert!(VariationalEngine::from_spec(&spec, 10, 1, 0).is_err());
        let spec = InferenceSpec::AnalyticSVI {
            batch: 10,
            epsilon: 1e-5,
        };
        assert!(VariationalEngine::from_spec(&spec, 10, 1, 0).is_ok());
    }

    #[test]
    fn full_batch_rho_is_one() {
        let spec = InferenceSpec::AnalyticVI { epsilon: 1e-5 };
        let mut eng = VariationalEngine::from_spec(&spec, 7, 2, 0).unwrap();
        assert!((eng.rho() - 1.).abs() < 1e-15);
        assert_eq!(eng.next_batch(), &[0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(eng.step_sizes(), vec![1., 1.]);
        assert_eq!(eng.iteration(), 1);
    }

    #[test]
    fn stochastic_batches_are_reproducible() {
        let spec = InferenceSpec::AnalyticSVI {
            batch: 3,
            epsilon: 1e-5,
        };
        let mut a = VariationalEngine::from_spec(&spec, 20, 1, 42).unwrap();
        let mut b = VariationalEngine::from_spec(&spec, 20, 1, 42).unwrap();
        assert_eq!(a.next_batch(), b.next_batch());
        assert!((a.rho() - 20. / 3.).abs() < 1e-15);
        let steps = a.step_sizes();
        assert_eq!(steps.len(), 1);
        assert!(steps[0] < 1.);
    }
}
