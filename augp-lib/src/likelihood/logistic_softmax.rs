//! Multiclass classification through the logistic-softmax link.

use rand::distributions::Distribution;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use statrs::distribution::Normal;

use crate::error::GpError;
use crate::inference::InferenceSpec;
use crate::likelihood::{encode_one_hot, log2cosh, pg_mean, sigmoid, AugLikelihood};

/// number of fixed-point sweeps over the coupled $(\gamma, \alpha)$ system
const FIXED_POINT_ROUNDS: usize = 3;
/// Monte Carlo draws for predictive class probabilities
const MC_SAMPLES: usize = 200;

/// $p(y = k | f) = \sigma(f_k) / \sum_j \sigma(f_j)$, one latent per class
///
/// Replacing the softmax by a normalised product of sigmoids keeps every
/// factor Polya-Gamma augmentable; the normaliser is absorbed by a Gamma
/// variable $\lambda_i$ and a field of Poisson counts with intensities
/// $\gamma_{ik}$. The local fixed point couples the classes only through
/// $\alpha_i = 1 + \sum_k \gamma_{ik}$:
///
/// $\gamma_{ik} = \frac{\alpha_i}{2}\,\frac{e^{-\mu_{ik}/2}}{\cosh(c_{ik}/2)},
/// \quad \theta_{ik} = \frac{(y_{ik} + \gamma_{ik})\tanh(c_{ik}/2)}{2c_{ik}}$
#[derive(Clone, Debug, Default)]
pub struct LogisticSoftMax {
    classes: usize,
    c: Vec<Vec<f64>>,
    gamma: Vec<Vec<f64>>,
    alpha: Vec<f64>,
    theta: Vec<Vec<f64>>,
}

impl LogisticSoftMax {
    /// multiclass likelihood; the class count is discovered from the targets
    #[must_use]
    pub fn new() -> Self {
        LogisticSoftMax::default()
    }
}

impl AugLikelihood for LogisticSoftMax {
    fn name(&self) -> &'static str {
        "LogisticSoftMax"
    }

    fn supports(&self, inference: &InferenceSpec) -> bool {
        inference.is_variational()
    }

    fn init(&mut self, y: &[f64], batch: usize) -> Result<Vec<Vec<f64>>, GpError> {
        let hot = encode_one_hot(y, self.name())?;
        self.classes = hot.len();
        self.resize(batch);
        Ok(hot)
    }

    fn num_latent(&self) -> usize {
        self.classes
    }

    fn resize(&mut self, batch: usize) {
        self.c = vec![vec![1.; batch]; self.classes];
        self.gamma = vec![vec![0.5; batch]; self.classes];
        self.alpha = vec![1.; batch];
        self.theta = vec![vec![0.; batch]; self.classes];
    }

    fn local_updates(&mut self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>], _rho: f64) {
        let b = y[0].len();
        for k in 0..self.classes {
            for i in 0..b {
                self.c[k][i] = (mu[k][i].powi(2) + var[k][i]).sqrt();
            }
        }
        for _ in 0..FIXED_POINT_ROUNDS {
            for k in 0..self.classes {
                for i in 0..b {
                    self.gamma[k][i] = self.alpha[i]
                        * (-0.5 * mu[k][i] - log2cosh(0.5 * self.c[k][i])).exp();
                }
            }
            for i in 0..b {
                self.alpha[i] = 1. + (0..self.classes).map(|k| self.gamma[k][i]).sum::<f64>();
            }
        }
        for k in 0..self.classes {
            for i in 0..b {
                self.theta[k][i] = pg_mean(y[k][i] + self.gamma[k][i], self.c[k][i]);
            }
        }
    }

    fn grad_mean(&self, y: &[Vec<f64>], k: usize) -> Vec<f64> {
        y[k].iter()
            .zip(&self.gamma[k])
            .map(|(yi, g)| 0.5 * (yi - g))
            .collect()
    }

    fn precision(&self, k: usize) -> &[f64] {
        &self.theta[k]
    }

    fn expected_log_lik(&self, y: &[Vec<f64>], mu: &[Vec<f64>], var: &[Vec<f64>]) -> f64 {
        (0..self.classes)
            .map(|k| {
                (0..y[k].len())
                    .map(|i| {
                        let second = mu[k][i].powi(2) + var[k][i];
                        0.5 * (y[k][i] - self.gamma[k][i]) * mu[k][i]
                            - (y[k][i] + self.gamma[k][i]) * log2cosh(0.5 * self.c[k][i])
                            - 0.5 * self.theta[k][i] * (second - self.c[k][i].powi(2))
                    })
                    .sum::<f64>()
            })
            .sum()
    }

    #[allow(clippy::cast_precision_loss)]
    fn predict_mean(&self, fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<f64> {
        let proba = self.proba(fmu, fvar);
        (0..fmu[0].len())
            .map(|i| {
                let mut best = 0;
                for k in 1..self.classes {
                    if proba[k][i] > proba[best][i] {
                        best = k;
                    }
                }
                best as f64
            })
            .collect()
    }

    /// class probabilities by Monte Carlo over the latent marginals,
    /// deterministic under a fixed internal seed
    #[allow(clippy::cast_precision_loss)]
    fn proba(&self, fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let npoints = fmu[0].len();
        let mut rng = ChaCha8Rng::seed_from_u64(1234);
        let unit = Normal::new(0., 1.).expect("unit normal");
        let mut proba = vec![vec![0.; npoints]; self.classes];
        let mut sig = vec![0.; self.classes];
        for i in 0..npoints {
            for _ in 0..MC_SAMPLES {
                let mut total = 0.;
                for (k, s) in sig.iter_mut().enumerate() {
                    let f = fmu[k][i] + fvar[k][i].sqrt() * unit.sample(&mut rng);
                    *s = sigmoid(f);
                    total += *s;
                }
                for k in 0..self.classes {
                    proba[k][i] += sig[k] / total;
                }
            }
            for p in proba.iter_mut() {
                p[i] /= MC_SAMPLES as f64;
            }
        }
        proba
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_class() -> (LogisticSoftMax, Vec<Vec<f64>>) {
        let mut lik = LogisticSoftMax::new();
        let hot = lik.init(&[0., 1., 2., 1.], 4).unwrap();
        (lik, hot)
    }

    #[test]
    fn discovers_class_count() {
        let (lik, hot) = three_class();
        assert_eq!(lik.num_latent(), 3);
        assert_eq!(hot.len(), 3);
    }

    #[test]
    fn alpha_couples_the_classes() {
        let (mut lik, hot) = three_class();
        let mu = vec![vec![0.; 4]; 3];
        let var = vec![vec![0.5; 4]; 3];
        lik.local_updates(&hot, &mu, &var, 1.);
        // gamma > 0 everywhere, alpha = 1 + sum_k gamma
        for i in 0..4 {
            let total: f64 = (0..3).map(|k| lik.gamma[k][i]).sum();
            assert!((lik.alpha[i] - 1. - total).abs() < 1e-12);
        }
    }

    #[test]
    fn probabilities_normalise_and_rank() {
        let (lik, _) = three_class();
        let fmu = vec![vec![3.], vec![-1.], vec![-1.]];
        let fvar = vec![vec![0.1], vec![0.1], vec![0.1]];
        let p = lik.proba(&fmu, &fvar);
        let total: f64 = (0..3).map(|k| p[k][0]).sum();
        assert!((total - 1.).abs() < 1e-9);
        assert!(p[0][0] > p[1][0]);
        assert_eq!(lik.predict_mean(&fmu, &fvar), vec![0.]);
    }
}
