//! Model containers and the state they share.
//!
//! Every model instance owns its full state (data, per-latent variational
//! factors, kernel caches); nothing is process-global. One training iteration
//! is orchestrated here by delegating the local updates to the likelihood and
//! the step bookkeeping to the inference engine.

pub mod gp;
pub mod svgp;
pub mod vgp;

use faer::Mat;
use log::warn;

use crate::error::GpError;
use crate::kernel::{deriv_mats, kernel_mat, Kernel};
use crate::linalg::{inv_from_l, jittered_cholesky_l, logdet_from_l, VariationalGaussian};
use crate::mean::PriorMean;

/// Construction options shared by every model container
#[derive(Clone, Copy, Debug)]
pub struct ModelConfig {
    /// print volume: 0 silent, 1 coarse progress, 2 per-iteration ELBO,
    /// 3 full diagnostics
    pub verbose: u8,
    /// re-optimise kernel hyperparameters during training
    pub autotuning: bool,
    /// iterations between hyperparameter steps
    pub atfrequency: usize,
    /// one kernel parameterisation per latent process instead of a shared one
    pub independent_priors: bool,
    /// seed for mini-batch sampling and inducing-point initialisation
    pub seed: u64,
    /// prior mean of the latent processes
    pub mean: PriorMean,
    /// log-space learning rate of the hyperparameter steps
    pub hyper_rate: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            verbose: 0,
            autotuning: false,
            atfrequency: 10,
            independent_priors: false,
            seed: 42,
            mean: PriorMean::Zero,
            hyper_rate: 0.01,
        }
    }
}

/// Covariance output of `predict_f`
#[derive(Clone, Debug)]
pub enum PosteriorCov {
    /// marginal variances only
    Diagonal(Vec<f64>),
    /// dense posterior covariance over the test points
    Full(Mat<f64>),
}

/// Prior-side cache of one kernel parameterisation: the covariance over its
/// support points (training inputs for the full model, inducing points for
/// the sparse one), its Cholesky factor, inverse and log-determinant.
///
/// Rebuilt only when `hyper_updated` is raised on the owning model; left
/// untouched otherwise.
#[derive(Clone, Debug)]
pub(crate) struct PriorState<const N: usize> {
    pub params: [f64; N],
    pub l: Mat<f64>,
    pub inv: Mat<f64>,
    pub logdet: f64,
}

impl<const N: usize> PriorState<N> {
    pub fn new(params: [f64; N]) -> Self {
        PriorState {
            params,
            l: Mat::zeros(0, 0),
            inv: Mat::zeros(0, 0),
            logdet: 0.,
        }
    }

    /// recompute the covariance caches over the given support points
    pub fn rebuild<T: Kernel<N>>(&mut self, support: &[T]) -> Result<(), GpError> {
        let k = kernel_mat(support, &self.params);
        self.l = jittered_cholesky_l(&k)?;
        self.inv = inv_from_l(&self.l);
        self.logdet = logdet_from_l(&self.l);
        Ok(())
    }

    /// ELBO gradient with respect to the kernel hyperparameters through this
    /// prior, in the trace form
    ///
    /// $\nabla_{\theta_m} = \frac{1}{2}\text{Tr}\big((\bm{K}^{-1}\bm{S}\bm{K}^{-1} - c\,\bm{K}^{-1})\frac{\partial \bm{K}}{\partial \theta_m}\big)$
    ///
    /// where $\bm{S}$ accumulates $\Sigma_k + (\mu_k - \mu_0)(\mu_k - \mu_0)^{\intercal}$
    /// over the $c$ latent processes sharing the prior.
    pub fn param_grads<T: Kernel<N>>(&self, support: &[T], s: &Mat<f64>, count: f64) -> [f64; N] {
        let n = support.len();
        let a = &self.inv * s * &self.inv
            - Mat::from_fn(n, n, |i, j| count * self.inv[(i, j)]);
        let dks = deriv_mats(support, &self.params);
        dks.map(|dk| {
            let mut tr = 0.;
            for i in 0..n {
                for j in 0..n {
                    tr += a[(i, j)] * dk[(j, i)];
                }
            }
            0.5 * tr
        })
    }
}

/// pick per-latent parameter lists, broadcasting the first entry with a
/// warning when the list length does not match the latent count
pub(crate) fn latent_params<const N: usize>(
    params: Vec<[f64; N]>,
    nprior: usize,
) -> Vec<[f64; N]> {
    if params.is_empty() {
        warn!("empty per-latent parameter list ignored");
        Vec::new()
    } else if params.len() == nprior {
        params
    } else {
        warn!(
            "got {} per-latent parameter sets for {} priors, broadcasting the first",
            params.len(),
            nprior
        );
        vec![params[0]; nprior]
    }
}

/// $\text{KL}(q \| p)$ between the variational factor and its Gaussian prior
///
/// $\frac{1}{2}\big(\text{Tr}(\bm{K}^{-1}\Sigma) + (\mu - \mu_0)^{\intercal}\bm{K}^{-1}(\mu - \mu_0) - n + \ln|\bm{K}| - \ln|\Sigma|\big)$
pub(crate) fn kl_to_prior<const N: usize>(
    factor: &VariationalGaussian,
    prior: &PriorState<N>,
    mean: PriorMean,
) -> f64 {
    let n = factor.dim();
    let mut trace = 0.;
    for i in 0..n {
        for j in 0..n {
            trace += prior.inv[(i, j)] * factor.sigma[(j, i)];
        }
    }
    let c = mean.value();
    let centered = Mat::from_fn(n, 1, |i, _| factor.mu[(i, 0)] - c);
    let quad = (centered.transpose() * &prior.inv * &centered)[(0, 0)];
    #[allow(clippy::cast_precision_loss)]
    let nf = n as f64;
    0.5 * (trace + quad - nf + prior.logdet - factor.logdet_sigma())
}

/// gradient of the ELBO with respect to a constant prior mean,
/// $\bm{1}^{\intercal}\bm{K}^{-1}(\mu - c\bm{1})$
pub(crate) fn mean_grad<const N: usize>(
    factor: &VariationalGaussian,
    prior: &PriorState<N>,
    mean: PriorMean,
) -> f64 {
    let n = factor.dim();
    let c = mean.value();
    let centered = Mat::from_fn(n, 1, |i, _| factor.mu[(i, 0)] - c);
    let solved = &prior.inv * &centered;
    (0..n).map(|i| solved[(i, 0)]).sum()
}
