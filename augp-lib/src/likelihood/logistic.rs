//! Logistic (Bernoulli) classification via Polya-Gamma augmentation.

use crate::error::GpError;
use crate::inference::InferenceSpec;
use crate::likelihood::{
    encode_signs, expected_sigmoid, log2cosh, pg_mean, AugLikelihood,
};

/// $p(y | f) = \sigma(y f)$, $y \in \{-1, 1\}$
///
/// Polson & Scott's identity turns the logistic into a Gaussian in $f$ given
/// a Polya-Gamma variable $\omega_i$. At the coordinate-ascent fixed point
/// the tilt is $c_i = \sqrt{\mu_i^2 + \Sigma_{ii}}$ and
/// $\theta_i = \mathbb{E}[\omega_i] = \frac{\tanh(c_i/2)}{2 c_i}$, while the
/// linear contribution is label-only, $r_i = y_i / 2$.
#[derive(Clone, Debug, Default)]
pub struct Logistic {
    c: Vec<f64>,
    theta: Vec<f64>,
}

impl Logistic {
    /// parameter-free logistic likelihood
    #[must_use]
    pub fn new() -> Self {
        Logistic::default()
    }
}

impl AugLikelihood for Logistic {
    fn name(&self) -> &'static str {
        "Logistic"
    }

    fn supports(&self, inference: &InferenceSpec) -> bool {
        inference.is_variational()
    }

    fn init(&mut self, y: &[f64], batch: usize) -> Result<Vec<Vec<f64>>, GpError> {
        self.resize(batch);
        encode_signs(y, self.name())
    }

    fn resize(&mut self, batch: usize) {
        self.c = vec![1.; batch];
        self.theta = vec![0.25; batch];
    }

    fn local_updates(&mut self, _y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>], _rho: f64) {
        for i in 0..mu[0].len() {
            self.c[i] = (mu[0][i].powi(2) + var[0][i]).sqrt();
            self.theta[i] = pg_mean(1., self.c[i]);
        }
    }

    fn grad_mean(&self, y: &[Vec<f64>], _k: usize) -> Vec<f64> {
        y[0].iter().map(|yi| 0.5 * yi).collect()
    }

    fn precision(&self, _k: usize) -> &[f64] {
        &self.theta
    }

    fn expected_log_lik(&self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>]) -> f64 {
        // tight PG bound on E[ln sigma(y f)]; the quadratic correction
        // vanishes once c has been updated to match (mu, var)
        (0..y[0].len())
            .map(|i| {
                let second = mu[0][i].powi(2) + var[0][i];
                0.5 * y[0][i] * mu[0][i]
                    - log2cosh(0.5 * self.c[i])
                    - 0.5 * self.theta[i] * (second - self.c[i].powi(2))
            })
            .sum()
    }

    fn predict_mean(&self, fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<f64> {
        self.proba(fmu, fvar)[0]
            .iter()
            .map(|p| if *p >= 0.5 { 1. } else { -1. })
            .collect()
    }

    fn proba(&self, fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<Vec<f64>> {
        vec![fmu[0]
            .iter()
            .zip(&fvar[0])
            .map(|(m, v)| expected_sigmoid(*m, *v))
            .collect()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn theta_matches_pg_mean() {
        let mut lik = Logistic::new();
        lik.init(&[1., -1.], 2).unwrap();
        lik.local_updates(&[vec![1., -1.]], &[vec![0.6, -0.8]], &[vec![0.28, 0.36]], 1.);
        // c = sqrt(mu^2 + var) = 0.8 and 1.0
        assert_approx_eq!(lik.c[0], 0.8);
        assert_approx_eq!(lik.c[1], 1.0);
        assert_approx_eq!(lik.theta[1], 0.5_f64.tanh() / 2.);
    }

    #[test]
    fn confident_mean_gives_confident_proba() {
        let lik = Logistic::new();
        let p = lik.proba(&[vec![4., -4.]], &[vec![0.1, 0.1]]);
        assert!(p[0][0] > 0.9);
        assert!(p[0][1] < 0.1);
        let yhat = lik.predict_mean(&[vec![4., -4.]], &[vec![0.1, 0.1]]);
        assert_eq!(yhat, vec![1., -1.]);
    }
}
