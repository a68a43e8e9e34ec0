//! Bayesian SVM: hinge-loss pseudo-likelihood with a Generalized Inverse
//! Gaussian augmentation.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::GpError;
use crate::inference::InferenceSpec;
use crate::likelihood::{encode_signs, AugLikelihood};

/// $p(y | f) \propto e^{-2\max(1 - yf, 0)}$, $y \in \{-1, 1\}$
///
/// The hinge surrogate admits the augmented form
/// $p(y|f,\lambda) = (2\pi\lambda)^{-1/2} e^{-\frac{(1 + \lambda - yf)^2}{2\lambda}}$.
/// The local update is the per-sample second moment of the margin,
/// $\omega_i = (1 - y_i\mu_i)^2 + \Sigma_{ii}$, and the GIG posterior mean of
/// the inverse augmentation variable gives
/// $\theta_i = \mathbb{E}[\lambda_i^{-1}] = \omega_i^{-1/2}$; the linear
/// contribution is $r_i = y_i(1 + \theta_i)$.
#[derive(Clone, Debug, Default)]
pub struct BayesianSvm {
    omega: Vec<f64>,
    theta: Vec<f64>,
}

impl BayesianSvm {
    /// parameter-free Bayesian SVM likelihood
    #[must_use]
    pub fn new() -> Self {
        BayesianSvm::default()
    }
}

impl AugLikelihood for BayesianSvm {
    fn name(&self) -> &'static str {
        "BayesianSVM"
    }

    fn supports(&self, inference: &InferenceSpec) -> bool {
        inference.is_variational()
    }

    fn init(&mut self, y: &[f64], batch: usize) -> Result<Vec<Vec<f64>>, GpError> {
        self.resize(batch);
        encode_signs(y, self.name())
    }

    fn resize(&mut self, batch: usize) {
        self.omega = vec![1.; batch];
        self.theta = vec![1.; batch];
    }

    fn local_updates(&mut self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>], _rho: f64) {
        for i in 0..y[0].len() {
            let margin = 1. - y[0][i] * mu[0][i];
            self.omega[i] = (margin.powi(2) + var[0][i]).max(1e-12);
            self.theta[i] = 1. / self.omega[i].sqrt();
        }
    }

    fn grad_mean(&self, y: &[Vec<f64>], _k: usize) -> Vec<f64> {
        y[0].iter()
            .zip(&self.theta)
            .map(|(yi, t)| yi * (1. + t))
            .collect()
    }

    fn precision(&self, _k: usize) -> &[f64] {
        &self.theta
    }

    fn expected_log_lik(&self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>]) -> f64 {
        // E over q(f) q(lambda) of the augmented log density, with
        // E[lambda] = sqrt(omega) + 1 for the GIG(1/2, 1, omega) factor;
        // the E[ln lambda] entropy piece belongs to the augmentation KL
        let half_ln2pi = 0.5 * (2. * std::f64::consts::PI).ln();
        (0..y[0].len())
            .map(|i| {
                let margin = 1. - y[0][i] * mu[0][i];
                let second = margin.powi(2) + var[0][i];
                -half_ln2pi
                    - 0.5
                        * (self.theta[i] * second + 2. * margin + self.omega[i].sqrt() + 1.)
            })
            .sum()
    }

    fn predict_mean(&self, fmu: &[Vec<f64>], _fvar: &[Vec<f64>]) -> Vec<f64> {
        fmu[0]
            .iter()
            .map(|m| if *m >= 0. { 1. } else { -1. })
            .collect()
    }

    /// $p(y = 1) = \Phi(\mu / \sqrt{1 + \sigma^2})$
    fn proba(&self, fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let unit = Normal::new(0., 1.).expect("unit normal");
        vec![fmu[0]
            .iter()
            .zip(&fvar[0])
            .map(|(m, v)| unit.cdf(m / (1. + v).sqrt()))
            .collect()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omega_is_margin_second_moment() {
        let mut lik = BayesianSvm::new();
        lik.init(&[1.], 1).unwrap();
        lik.local_updates(&[vec![1.]], &[vec![0.5]], &[vec![0.11]], 1.);
        // (1 - 0.5)^2 + 0.11 = 0.36
        assert!((lik.omega[0] - 0.36).abs() < 1e-12);
        assert!((lik.theta[0] - 1. / 0.6).abs() < 1e-12);
        let r = lik.grad_mean(&[vec![1.]], 0);
        assert!((r[0] - (1. + 1. / 0.6)).abs() < 1e-12);
    }

    #[test]
    fn proba_is_monotone_in_mean() {
        let lik = BayesianSvm::new();
        let p = lik.proba(&[vec![-2., 0., 2.]], &[vec![1., 1., 1.]]);
        assert!(p[0][0] < p[0][1] && p[0][1] < p[0][2]);
        assert!((p[0][1] - 0.5).abs() < 1e-12);
    }
}
