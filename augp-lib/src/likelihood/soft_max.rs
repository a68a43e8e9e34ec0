//! Plain softmax link. No conjugate augmentation exists for this variant, so
//! every analytic inference rejects it at construction; it would pair with
//! the sampling or quadrature strategies, which are not implemented.

use rand::distributions::Distribution;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use statrs::distribution::Normal;

use crate::error::GpError;
use crate::inference::InferenceSpec;
use crate::likelihood::{encode_one_hot, AugLikelihood};

/// $p(y = k | f) = e^{f_k} / \sum_j e^{f_j}$
#[derive(Clone, Debug, Default)]
pub struct SoftMax {
    classes: usize,
    theta: Vec<f64>,
}

impl SoftMax {
    /// multiclass softmax likelihood
    #[must_use]
    pub fn new() -> Self {
        SoftMax::default()
    }
}

impl AugLikelihood for SoftMax {
    fn name(&self) -> &'static str {
        "SoftMax"
    }

    fn supports(&self, _inference: &InferenceSpec) -> bool {
        false
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
        self.theta = vec![0.; batch];
    }

    fn local_updates(&mut self, _y: &[Vec<f64>], _mu: &[Vec<f64>], _var: &[Vec<f64>], _rho: f64) {}

    fn grad_mean(&self, y: &[Vec<f64>], _k: usize) -> Vec<f64> {
        vec![0.; y[0].len()]
    }

    fn precision(&self, _k: usize) -> &[f64] {
        &self.theta
    }

    fn expected_log_lik(&self, _y: &[Vec<f64>], _mu: &[Vec<f64>], _var: &[Vec<f64>]) -> f64 {
        f64::NEG_INFINITY
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

    #[allow(clippy::cast_precision_loss)]
    fn proba(&self, fmu: &[Vec<f64>], fvar: &[Vec<f64>]) -> Vec<Vec<f64>> {
        const MC_SAMPLES: usize = 200;
        let npoints = fmu[0].len();
        let mut rng = ChaCha8Rng::seed_from_u64(1234);
        let unit = Normal::new(0., 1.).expect("unit normal");
        let mut proba = vec![vec![0.; npoints]; self.classes];
        let mut logits = vec![0.; self.classes];
        for i in 0..npoints {
            for _ in 0..MC_SAMPLES {
                for (k, l) in logits.iter_mut().enumerate() {
                    *l = fmu[k][i] + fvar[k][i].sqrt() * unit.sample(&mut rng);
                }
                let m = logits.iter().fold(f64::NEG_INFINITY, |a, b| a.max(*b));
                let total: f64 = logits.iter().map(|l| (l - m).exp()).sum();
                for k in 0..self.classes {
                    proba[k][i] += (logits[k] - m).exp() / total;
                }
            }
            for p in proba.iter_mut() {
                p[i] /= MC_SAMPLES as f64;
            }
        }
        proba
    }
}
