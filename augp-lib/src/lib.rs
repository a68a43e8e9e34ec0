//! This library implements sparse and full variational inference for
//! Gaussian process (GP) models under non-conjugate likelihoods, using data
//! augmentation to recover conditional conjugacy and closed-form
//! natural-gradient coordinate ascent.
//!
//! A latent process $f \sim \mathcal{GP}(\mu_0, \phi)$ is observed through a
//! likelihood $p(y | f)$ (Gaussian, Student-T, logistic, Bayesian SVM,
//! logistic-softmax, Poisson, negative binomial). Each non-conjugate
//! likelihood is augmented with latent variables (Polya-Gamma, Generalized
//! Inverse Gaussian, Inverse Gamma) so that, conditionally, the model is
//! Gaussian in $f$ and the optimal variational update of the Gaussian factor
//! $q(f) = \mathcal{N}(\mu, \Sigma)$ is one natural-gradient step of size 1:
//!
//! $\eta_1 = \Sigma^{-1}\mu, \quad \eta_2 = -\tfrac{1}{2}\Sigma^{-1}$
//!
//! The sparse variant keeps the factor on $m \ll n$ inducing points and
//! projects to the data through $\kappa = \bm{K}_{nm}\bm{K}_{mm}^{-1}$, with
//! mini-batching corrected by the scale $\rho = n/|\mathcal{B}|$
//! (Robbins-Monro stochastic natural gradient).
//!
//! # Implementation
//!
//! * Based of [Faer](https://github.com/sarah-ek/faer-rs) to provide linear algebra subroutine
//! * Covariance functions are arbitrary, defined on the point type, with parameterisation
//! * Full model scales as $O(n^{3})$ per hyperparameter update, sparse as $O(m^{2}n)$ per sweep
//! * Per-latent updates run in parallel and commit at a sweep barrier
//!
//! # Reference
//!
//! Gaussian Processes for Machine Learning, C. E. Rasmussen & C. K. I. Williams, 2006
//!
//! Polson, N. G., Scott, J. G., Windle, J.,
//! Bayesian inference for logistic models using Polya-Gamma latent variables,
//! JASA 108.504, 2013
//!
//! Hensman, J., Matthews, A., Ghahramani, Z.,
//! Scalable variational Gaussian process classification, AISTATS 2015
//!
//! Wenzel, F., Galy-Fajou, T., Donner, C., Kloft, M., Opper, M.,
//! Efficient Gaussian process classification using Polya-Gamma data augmentation,
//! AAAI 2019
//!
//! Galy-Fajou, T., Wenzel, F., Donner, C., Opper, M.,
//! Multi-class Gaussian process classification made conjugate, UAI 2019
//!
//! Hoffman, M., Blei, D., Wang, C., Paisley, J.,
//! Stochastic variational inference, JMLR 14, 2013

#![warn(
    clippy::pedantic,
    clippy::suspicious,
    clippy::perf,
    clippy::complexity,
    clippy::style
)]
#![forbid(unsafe_code)]
#![allow(clippy::doc_markdown)]

mod error;
mod inducing;
pub mod inference;
pub mod kernel;
pub mod likelihood;
mod linalg;
pub mod mean;
pub mod model;
pub mod optim;
pub mod train;

pub use error::GpError;
pub use inference::InferenceSpec;
pub use kernel::Kernel;
pub use likelihood::{
    AugLikelihood, BayesianSvm, Gaussian, Logistic, LogisticSoftMax, NegBinomial, Poisson,
    SoftMax, StudentT,
};
pub use linalg::VariationalGaussian;
pub use mean::PriorMean;
pub use model::gp::ExactGp;
pub use model::svgp::Svgp;
pub use model::vgp::Vgp;
pub use model::{ModelConfig, PosteriorCov};
pub use optim::{InverseDecay, LogScaleStep};
pub use train::{train, TrainState, TrainableModel};
