//! Gaussian noise, the conjugate case.

use crate::error::GpError;
use crate::inference::InferenceSpec;
use crate::likelihood::AugLikelihood;

/// $p(y | f) = \mathcal{N}(y; f, \epsilon)$
///
/// Needs no augmentation: the precision contribution is the constant
/// $\theta_i = 1/\epsilon$. The noise $\epsilon$ is re-estimated from the
/// residual sum of squares plus the trace correction,
/// $\epsilon = \frac{1}{n}\sum_i ((y_i - \mu_i)^2 + \Sigma_{ii})$,
/// directly in full-batch mode and through an inverse-decay moving average on
/// mini-batches.
#[derive(Clone, Debug)]
pub struct Gaussian {
    noise: f64,
    learn_noise: bool,
    theta: Vec<f64>,
    updates: usize,
}

impl Gaussian {
    /// fixed initial noise variance $\epsilon$
    ///
    /// # Examples
    ///
    /// ```
    /// use augp_lib::Gaussian;
    /// let lik = Gaussian::new(0.1, true);
    /// assert!((lik.noise() - 0.1).abs() < 1e-15);
    /// ```
    #[must_use]
    pub fn new(noise: f64, learn_noise: bool) -> Self {
        Gaussian {
            noise,
            learn_noise,
            theta: Vec::new(),
            updates: 0,
        }
    }

    /// current noise variance
    #[must_use]
    pub fn noise(&self) -> f64 {
        self.noise
    }
}

impl AugLikelihood for Gaussian {
    fn name(&self) -> &'static str {
        "Gaussian"
    }

    fn supports(&self, inference: &InferenceSpec) -> bool {
        matches!(inference, InferenceSpec::Analytic) || inference.is_variational()
    }

    fn init(&mut self, y: &[f64], batch: usize) -> Result<Vec<Vec<f64>>, GpError> {
        if self.noise <= 0. {
            return Err(GpError::Configuration(
                "Gaussian noise variance must be positive".to_string(),
            ));
        }
        self.resize(batch);
        Ok(vec![y.to_vec()])
    }

    fn resize(&mut self, batch: usize) {
        self.theta = vec![1. / self.noise; batch];
    }

    #[allow(clippy::cast_precision_loss)]
    fn local_updates(&mut self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>], rho: f64) {
        if self.learn_noise {
            let n = y[0].len() as f64;
            let rss: f64 = y[0]
                .iter()
                .zip(&mu[0])
                .zip(&var[0])
                .map(|((yi, mi), vi)| (yi - mi).powi(2) + vi)
                .sum();
            let estimate = (rss / n).max(1e-8);
            if rho > 1. {
                // stochastic path: the full-batch closed form is unavailable,
                // blend mini-batch estimates under a Robbins-Monro weight
                self.updates += 1;
                let w = (1. + self.updates as f64).powf(-0.6);
                self.noise = (1. - w) * self.noise + w * estimate;
            } else {
                self.noise = estimate;
            }
        }
        for t in &mut self.theta {
            *t = 1. / self.noise;
        }
    }

    fn grad_mean(&self, y: &[Vec<f64>], _k: usize) -> Vec<f64> {
        y[0].iter().map(|yi| yi / self.noise).collect()
    }

    fn precision(&self, _k: usize) -> &[f64] {
        &self.theta
    }

    #[allow(clippy::cast_precision_loss)]
    fn expected_log_lik(&self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>]) -> f64 {
        let n = y[0].len() as f64;
        let quad: f64 = y[0]
            .iter()
            .zip(&mu[0])
            .zip(&var[0])
            .map(|((yi, mi), vi)| (yi - mi).powi(2) + vi)
            .sum();
        -0.5 * (n * (2. * std::f64::consts::PI * self.noise).ln() + quad / self.noise)
    }

    fn predict_mean(&self, fmu: &[Vec<f64>], _fvar: &[Vec<f64>]) -> Vec<f64> {
        fmu[0].clone()
    }

    /// predictive variances of y, latent variance plus noise
    fn proba(&self, _fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<Vec<f64>> {
        vec![fvar[0].iter().map(|v| v + self.noise).collect()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_is_inverse_noise() {
        let mut lik = Gaussian::new(0.25, false);
        lik.init(&[1., 2.], 2).unwrap();
        lik.local_updates(
            &[vec![1., 2.]],
            &[vec![0.9, 2.1]],
            &[vec![0.01, 0.01]],
            1.,
        );
        assert!((lik.precision(0)[0] - 4.).abs() < 1e-12);
        let r = lik.grad_mean(&[vec![1., 2.]], 0);
        assert!((r[1] - 8.).abs() < 1e-12);
    }

    #[test]
    fn full_batch_noise_estimate() {
        let mut lik = Gaussian::new(1., true);
        lik.init(&[0., 0.], 2).unwrap();
        // residuals 1 and 1, variances 0.5 -> epsilon = 1.5
        lik.local_updates(&[vec![1., -1.]], &[vec![0., 0.]], &[vec![0.5, 0.5]], 1.);
        assert!((lik.noise() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn stochastic_noise_update_blends() {
        let mut lik = Gaussian::new(1., true);
        lik.init(&[0.; 4], 2).unwrap();
        lik.local_updates(&[vec![2., 2.]], &[vec![0., 0.]], &[vec![0., 0.]], 2.);
        // moved towards 4 but not all the way
        assert!(lik.noise() > 1. && lik.noise() < 4.);
    }
}
