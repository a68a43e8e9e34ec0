//! Negative binomial counts with a logit link.

use statrs::function::factorial::ln_factorial;
use statrs::function::gamma::ln_gamma;

use crate::error::GpError;
use crate::inference::InferenceSpec;
use crate::likelihood::{
    encode_counts, expected_sigmoid, log2cosh, pg_mean, AugLikelihood,
};

/// $p(y | f) = \binom{y + r - 1}{y} \sigma(f)^y \sigma(-f)^r$
///
/// With a fixed failure count $r$ the density is a product of sigmoids, so a
/// single Polya-Gamma variable with shape $y_i + r$ makes it conjugate:
/// $\theta_i = \frac{(y_i + r)\tanh(c_i/2)}{2c_i}$, $r_i = (y_i - r)/2$.
#[derive(Clone, Debug)]
pub struct NegBinomial {
    failures: f64,
    c: Vec<f64>,
    theta: Vec<f64>,
}

impl NegBinomial {
    /// fixed failure count $r$
    #[must_use]
    pub fn new(failures: f64) -> Self {
        NegBinomial {
            failures,
            c: Vec::new(),
            theta: Vec::new(),
        }
    }
}

impl AugLikelihood for NegBinomial {
    fn name(&self) -> &'static str {
        "NegBinomial"
    }

    fn supports(&self, inference: &InferenceSpec) -> bool {
        inference.is_variational()
    }

    fn init(&mut self, y: &[f64], batch: usize) -> Result<Vec<Vec<f64>>, GpError> {
        if self.failures <= 0. {
            return Err(GpError::Configuration(
                "NegBinomial failure count must be positive".to_string(),
            ));
        }
        self.resize(batch);
        encode_counts(y, self.name())
    }

    fn resize(&mut self, batch: usize) {
        self.c = vec![1.; batch];
        self.theta = vec![0.; batch];
    }

    fn local_updates(&mut self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>], _rho: f64) {
        for i in 0..y[0].len() {
            self.c[i] = (mu[0][i].powi(2) + var[0][i]).sqrt();
            self.theta[i] = pg_mean(y[0][i] + self.failures, self.c[i]);
        }
    }

    fn grad_mean(&self, y: &[Vec<f64>], _k: usize) -> Vec<f64> {
        y[0].iter().map(|yi| 0.5 * (yi - self.failures)).collect()
    }

    fn precision(&self, _k: usize) -> &[f64] {
        &self.theta
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn expected_log_lik(&self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>]) -> f64 {
        let r = self.failures;
        (0..y[0].len())
            .map(|i| {
                let second = mu[0][i].powi(2) + var[0][i];
                ln_gamma(y[0][i] + r) - ln_gamma(r) - ln_factorial(y[0][i] as u64)
                    + 0.5 * (y[0][i] - r) * mu[0][i]
                    - (y[0][i] + r) * log2cosh(0.5 * self.c[i])
                    - 0.5 * self.theta[i] * (second - self.c[i].powi(2))
            })
            .sum()
    }

    /// predictive mean $r\,p/(1 - p)$ with $p = \mathbb{E}[\sigma(f)]$
    fn predict_mean(&self, fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<f64> {
        fmu[0]
            .iter()
            .zip(&fvar[0])
            .map(|(m, v)| {
                let p = expected_sigmoid(*m, *v).min(1. - 1e-10);
                self.failures * p / (1. - p)
            })
            .collect()
    }

    fn proba(&self, fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<Vec<f64>> {
        vec![self.predict_mean(fmu, fvar)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theta_uses_total_count() {
        let mut lik = NegBinomial::new(3.);
        lik.init(&[2.], 1).unwrap();
        lik.local_updates(&[vec![2.]], &[vec![0.]], &[vec![0.]], 1.);
        // c = 0, continuous limit: (y + r)/4
        assert!((lik.theta[0] - 1.25).abs() < 1e-12);
        let g = lik.grad_mean(&[vec![2.]], 0);
        assert!((g[0] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn predictive_mean_grows_with_latent() {
        let lik = NegBinomial::new(2.);
        let m = lik.predict_mean(&[vec![-1., 1.]], &[vec![0.2, 0.2]]);
        assert!(m[0] < m[1]);
    }
}
