//! Student-T noise via Inverse-Gamma augmentation.

use statrs::function::gamma::digamma;

use crate::error::GpError;
use crate::inference::InferenceSpec;
use crate::likelihood::AugLikelihood;

/// Heavy-tailed regression, $y = f + t_\nu \cdot s$
///
/// Writing the T density as a scale mixture
/// $p(y|f) = \int \mathcal{N}(y; f, \omega)\,\text{IG}(\omega; \frac{\nu}{2}, \frac{\nu s^2}{2})\,d\omega$
/// gives a conditionally conjugate model. The variational factor over the
/// augmentation is $q(\omega_i) = \text{IG}(\alpha, \beta_i)$ with fixed
/// $\alpha = \frac{\nu + 1}{2}$ and
/// $\beta_i = \frac{1}{2}((y_i - \mu_i)^2 + \Sigma_{ii} + \nu s^2)$,
/// so $\theta_i = \mathbb{E}[\omega_i^{-1}] = \alpha / \beta_i$.
#[derive(Clone, Debug)]
pub struct StudentT {
    nu: f64,
    scale: f64,
    beta: Vec<f64>,
    theta: Vec<f64>,
}

impl StudentT {
    /// degrees of freedom $\nu$ and scale $s$
    #[must_use]
    pub fn new(nu: f64, scale: f64) -> Self {
        StudentT {
            nu,
            scale,
            beta: Vec::new(),
            theta: Vec::new(),
        }
    }

    fn alpha(&self) -> f64 {
        0.5 * (self.nu + 1.)
    }
}

impl AugLikelihood for StudentT {
    fn name(&self) -> &'static str {
        "StudentT"
    }

    fn supports(&self, inference: &InferenceSpec) -> bool {
        inference.is_variational()
    }

    fn init(&mut self, y: &[f64], batch: usize) -> Result<Vec<Vec<f64>>, GpError> {
        if self.nu <= 1. || self.scale <= 0. {
            return Err(GpError::Configuration(
                "StudentT needs nu > 1 and a positive scale".to_string(),
            ));
        }
        self.resize(batch);
        Ok(vec![y.to_vec()])
    }

    fn resize(&mut self, batch: usize) {
        self.beta = vec![1.; batch];
        self.theta = vec![1.; batch];
    }

    fn local_updates(&mut self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>], _rho: f64) {
        let alpha = self.alpha();
        let nus2 = self.nu * self.scale.powi(2);
        for i in 0..y[0].len() {
            self.beta[i] = 0.5 * ((y[0][i] - mu[0][i]).powi(2) + var[0][i] + nus2);
            self.theta[i] = alpha / self.beta[i];
        }
    }

    fn grad_mean(&self, y: &[Vec<f64>], _k: usize) -> Vec<f64> {
        y[0].iter().zip(&self.theta).map(|(yi, t)| yi * t).collect()
    }

    fn precision(&self, _k: usize) -> &[f64] {
        &self.theta
    }

    fn expected_log_lik(&self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>]) -> f64 {
        // E[log N(y; f, omega)] with E[ln omega] = ln beta - psi(alpha)
        let alpha = self.alpha();
        let half_ln2pi = 0.5 * (2. * std::f64::consts::PI).ln();
        (0..y[0].len())
            .map(|i| {
                let quad = (y[0][i] - mu[0][i]).powi(2) + var[0][i];
                -half_ln2pi - 0.5 * (self.beta[i].ln() - digamma(alpha))
                    - 0.5 * self.theta[i] * quad
            })
            .sum()
    }

    fn predict_mean(&self, fmu: &[Vec<f64>], _fvar: &[Vec<f64>]) -> Vec<f64> {
        fmu[0].clone()
    }

    /// predictive variances; the T noise has variance $\frac{\nu s^2}{\nu - 2}$
    /// for $\nu > 2$ and is left out otherwise
    fn proba(&self, _fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let noise = if self.nu > 2. {
            self.nu * self.scale.powi(2) / (self.nu - 2.)
        } else {
            0.
        };
        vec![fvar[0].iter().map(|v| v + noise).collect()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outliers_are_downweighted() {
        let mut lik = StudentT::new(4., 1.);
        lik.init(&[0., 10.], 2).unwrap();
        lik.local_updates(
            &[vec![0., 10.]],
            &[vec![0., 0.]],
            &[vec![0.1, 0.1]],
            1.,
        );
        // the far sample gets a much smaller precision than the close one
        assert!(lik.precision(0)[1] < 0.1 * lik.precision(0)[0]);
    }

    #[test]
    fn rejects_degenerate_dof() {
        let mut lik = StudentT::new(0.5, 1.);
        assert!(lik.init(&[0.], 1).is_err());
    }
}
