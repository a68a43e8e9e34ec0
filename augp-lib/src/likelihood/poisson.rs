//! Poisson counts with a sigmoid-bounded rate.

use statrs::function::factorial::ln_factorial;

use crate::error::GpError;
use crate::inference::InferenceSpec;
use crate::likelihood::{
    encode_counts, expected_sigmoid, log2cosh, pg_mean, AugLikelihood,
};

/// $p(y | f) = \text{Poisson}(y; \lambda\,\sigma(f))$
///
/// The sigmoid link caps the rate at $\lambda$, which is what makes the
/// Polya-Gamma route available: $\sigma(f)^y$ contributes a PG($y$) variable
/// and the $e^{-\lambda\sigma(f)}$ factor is expanded as a Poisson
/// superposition with latent intensity
/// $\gamma_i = \lambda\,e^{-\mu_i/2} / (2\cosh(c_i/2))$, giving
/// $\theta_i = \frac{(y_i + \gamma_i)\tanh(c_i/2)}{2 c_i}$ and
/// $r_i = (y_i - \gamma_i)/2$.
#[derive(Clone, Debug)]
pub struct Poisson {
    lambda: f64,
    c: Vec<f64>,
    gamma: Vec<f64>,
    theta: Vec<f64>,
}

impl Poisson {
    /// maximum rate $\lambda$
    #[must_use]
    pub fn new(lambda: f64) -> Self {
        Poisson {
            lambda,
            c: Vec::new(),
            gamma: Vec::new(),
            theta: Vec::new(),
        }
    }
}

impl AugLikelihood for Poisson {
    fn name(&self) -> &'static str {
        "Poisson"
    }

    fn supports(&self, inference: &InferenceSpec) -> bool {
        inference.is_variational()
    }

    fn init(&mut self, y: &[f64], batch: usize) -> Result<Vec<Vec<f64>>, GpError> {
        if self.lambda <= 0. {
            return Err(GpError::Configuration(
                "Poisson rate bound lambda must be positive".to_string(),
            ));
        }
        self.resize(batch);
        encode_counts(y, self.name())
    }

    fn resize(&mut self, batch: usize) {
        self.c = vec![1.; batch];
        self.gamma = vec![0.; batch];
        self.theta = vec![0.; batch];
    }

    fn local_updates(&mut self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>], _rho: f64) {
        for i in 0..y[0].len() {
            self.c[i] = (mu[0][i].powi(2) + var[0][i]).sqrt();
            self.gamma[i] =
                self.lambda * (-0.5 * mu[0][i] - log2cosh(0.5 * self.c[i])).exp();
            self.theta[i] = pg_mean(y[0][i] + self.gamma[i], self.c[i]);
        }
    }

    fn grad_mean(&self, y: &[Vec<f64>], _k: usize) -> Vec<f64> {
        y[0].iter()
            .zip(&self.gamma)
            .map(|(yi, g)| 0.5 * (yi - g))
            .collect()
    }

    fn precision(&self, _k: usize) -> &[f64] {
        &self.theta
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn expected_log_lik(&self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>]) -> f64 {
        (0..y[0].len())
            .map(|i| {
                let second = mu[0][i].powi(2) + var[0][i];
                y[0][i] * self.lambda.ln() - ln_factorial(y[0][i] as u64)
                    + 0.5 * (y[0][i] - self.gamma[i]) * mu[0][i]
                    - (y[0][i] + self.gamma[i]) * log2cosh(0.5 * self.c[i])
                    - 0.5 * self.theta[i] * (second - self.c[i].powi(2))
            })
            .sum()
    }

    /// predictive rate $\lambda\,\mathbb{E}[\sigma(f)]$
    fn predict_mean(&self, fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<f64> {
        fmu[0]
            .iter()
            .zip(&fvar[0])
            .map(|(m, v)| self.lambda * expected_sigmoid(*m, *v))
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
    fn rejects_fractional_counts() {
        let mut lik = Poisson::new(5.);
        assert!(lik.init(&[1.5], 1).is_err());
        assert!(lik.init(&[0., 3., 7.], 3).is_ok());
    }

    #[test]
    fn gamma_shrinks_with_large_mean() {
        let mut lik = Poisson::new(5.);
        lik.init(&[1., 1.], 2).unwrap();
        lik.local_updates(&[vec![1., 1.]], &[vec![-2., 2.]], &[vec![0.1, 0.1]], 1.);
        // the superposition intensity tracks sigma(-f)
        assert!(lik.gamma[0] > lik.gamma[1]);
        assert!(lik.theta.iter().all(|t| *t > 0.));
    }
}
