//! Likelihood seam for the variational models.
//!
//! Each variant makes its likelihood conditionally conjugate through a data
//! augmentation (Polya-Gamma, Generalized Inverse Gaussian, Inverse Gamma)
//! and exposes the two per-sample quantities the shared natural-gradient loop
//! consumes: the linear contribution $r_i$ and the precision contribution
//! $\theta_i$, such that the coordinate-ascent target is
//!
//! $\eta_1^* = \kappa^{\intercal}(\rho r) + \bm{K}^{-1}\mu_0, \quad
//! \eta_2^* = -\tfrac{1}{2}(\kappa^{\intercal}\text{Diag}(\rho\theta)\kappa + \bm{K}^{-1})$
//!
//! Augmentation buffers live inside the variant and are rewritten in place by
//! [`AugLikelihood::local_updates`]; the natural-gradient step must only run
//! after a completed local update.

pub mod bayesian_svm;
pub mod gaussian;
pub mod logistic;
pub mod logistic_softmax;
pub mod neg_binomial;
pub mod poisson;
pub mod soft_max;
pub mod student_t;

use crate::error::GpError;
use crate::inference::InferenceSpec;

pub use bayesian_svm::BayesianSvm;
pub use gaussian::Gaussian;
pub use logistic::Logistic;
pub use logistic_softmax::LogisticSoftMax;
pub use neg_binomial::NegBinomial;
pub use poisson::Poisson;
pub use soft_max::SoftMax;
pub use student_t::StudentT;

/// Operations every likelihood variant provides to the inference loop
pub trait AugLikelihood: Send + Sync {
    /// variant name used in compatibility errors
    fn name(&self) -> &'static str;

    /// whether the coordinate-ascent formulas exist for this inference
    fn supports(&self, inference: &InferenceSpec) -> bool;

    /// validate raw targets, fix the latent-process count, size the
    /// augmentation buffers to `batch`, and return the per-latent encoding
    /// (identity for regression, $\pm 1$ checks for binary, one-hot for
    /// multiclass)
    ///
    /// # Errors
    ///
    /// [`GpError::Configuration`] when the targets do not fit the variant
    fn init(&mut self, y: &[f64], batch: usize) -> Result<Vec<Vec<f64>>, GpError>;

    /// latent processes required (1, or the class count); valid after `init`
    fn num_latent(&self) -> usize {
        1
    }

    /// resize the augmentation buffers when the mini-batch size changes
    fn resize(&mut self, batch: usize);

    /// closed-form update of the augmentation variables for the active batch,
    /// from the current posterior marginals at the batch points
    ///
    /// `rho` is the stochastic scale factor (1 for full batch); only variants
    /// that re-estimate their own hyperparameters (Gaussian noise) use it
    fn local_updates(&mut self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>], rho: f64);

    /// linear natural-parameter contribution $r$ for latent k
    fn grad_mean(&self, y: &[Vec<f64>], k: usize) -> Vec<f64>;

    /// precision contribution $\theta$ for latent k, from the last local update
    fn precision(&self, k: usize) -> &[f64];

    /// expected log likelihood under the augmented bound (exact at the local
    /// fixed point), the data term of the ELBO
    fn expected_log_lik(&self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>]) -> f64;

    /// point prediction of y from the latent posterior marginals
    fn predict_mean(&self, fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<f64>;

    /// event / class probabilities for classification and count variants,
    /// predictive variances for the regression variants
    fn proba(&self, fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<Vec<f64>>;
}

/// numerically safe $\sigma(x) = (1 + e^{-x})^{-1}$
pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0. {
        1. / (1. + (-x).exp())
    } else {
        let e = x.exp();
        e / (1. + e)
    }
}

/// Polya-Gamma posterior mean $\mathbb{E}[\omega] = \frac{b}{2c}\tanh(c/2)$,
/// continuous limit $b/4$ at $c = 0$
pub(crate) fn pg_mean(b: f64, c: f64) -> f64 {
    if c.abs() < 1e-10 {
        0.25 * b
    } else {
        b * (0.5 * c).tanh() / (2. * c)
    }
}

/// $\ln(2\cosh(x)) = |x| + \ln(1 + e^{-2|x|})$, overflow safe
pub(crate) fn log2cosh(x: f64) -> f64 {
    let a = x.abs();
    a + (-2. * a).exp().ln_1p()
}

/// $\mathbb{E}[\sigma(f)]$ under $f \sim \mathcal{N}(\mu, \sigma^2)$ via the
/// probit approximation $\sigma(\mu / \sqrt{1 + \pi\sigma^2/8})$
pub(crate) fn expected_sigmoid(mu: f64, var: f64) -> f64 {
    sigmoid(mu / (1. + std::f64::consts::PI * var / 8.).sqrt())
}

/// check every target is one of the allowed binary labels
pub(crate) fn encode_signs(y: &[f64], name: &'static str) -> Result<Vec<Vec<f64>>, GpError> {
    if y.iter().all(|&v| v == 1. || v == -1.) {
        Ok(vec![y.to_vec()])
    } else {
        Err(GpError::Configuration(format!(
            "{name} expects labels in {{-1, 1}}"
        )))
    }
}

/// check every target is a non-negative integer count
pub(crate) fn encode_counts(y: &[f64], name: &'static str) -> Result<Vec<Vec<f64>>, GpError> {
    if y.iter().all(|&v| v >= 0. && v.fract() == 0.) {
        Ok(vec![y.to_vec()])
    } else {
        Err(GpError::Configuration(format!(
            "{name} expects non-negative integer counts"
        )))
    }
}

/// map class labels 0..K-1 to one-hot rows, discovering K from the data
pub(crate) fn encode_one_hot(y: &[f64], name: &'static str) -> Result<Vec<Vec<f64>>, GpError> {
    if !y.iter().all(|&v| v >= 0. && v.fract() == 0.) {
        return Err(GpError::Configuration(format!(
            "{name} expects integer class labels 0..K-1"
        )));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let k = y.iter().fold(0_usize, |acc, &v| acc.max(v as usize)) + 1;
    if k < 2 {
        return Err(GpError::Configuration(format!(
            "{name} needs at least two classes"
        )));
    }
    let mut hot = vec![vec![0.; y.len()]; k];
    for (i, &v) in y.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let c = v as usize;
        hot[c][i] = 1.;
    }
    Ok(hot)
}
