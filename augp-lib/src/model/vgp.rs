//! Full variational model: one variational Gaussian per latent process over
//! all training inputs, updated by natural-gradient coordinate ascent.

use faer::Mat;
use rayon::prelude::*;

use crate::error::GpError;
use crate::inference::{InferenceSpec, VariationalEngine};
use crate::kernel::{cross_mat, Kernel};
use crate::likelihood::AugLikelihood;
use crate::linalg::VariationalGaussian;
use crate::model::{
    kl_to_prior, latent_params, mean_grad, ModelConfig, PosteriorCov, PriorState,
};
use crate::optim::LogScaleStep;
use crate::train::TrainableModel;

/// Variational GP over the full training set
///
/// Each latent process carries its own $(\mu, \Sigma, \eta_1, \eta_2)$; the
/// prior covariance $\bm{K}_{nn}$ (one per latent with independent priors,
/// shared otherwise) is cached along with its inverse and only rebuilt when a
/// hyperparameter step raises the invalidation flag.
#[derive(Debug)]
pub struct Vgp<const N: usize, T, L>
where
    T: Kernel<N>,
    L: AugLikelihood,
{
    inputs: Vec<T>,
    targets: Vec<Vec<f64>>,
    likelihood: L,
    engine: VariationalEngine,
    factors: Vec<VariationalGaussian>,
    priors: Vec<PriorState<N>>,
    config: ModelConfig,
    hyper_updated: bool,
    trained: bool,
}

impl<const N: usize, T, L> Vgp<N, T, L>
where
    T: Kernel<N> + Sync,
    L: AugLikelihood,
{
    /// Creates a full variational model
    ///
    /// # Errors
    ///
    /// [`GpError::Configuration`] on mismatched input/target lengths, empty
    /// data, bad target encoding or a mini-batch size outside (0, n];
    /// [`GpError::Compatibility`] when the likelihood has no coordinate-ascent
    /// formulas for the requested inference;
    /// [`GpError::NumericalDegeneracy`] when the prior covariance cannot be
    /// factorised
    pub fn new(
        inputs: Vec<T>,
        targets: &[f64],
        params: [f64; N],
        mut likelihood: L,
        inference: InferenceSpec,
        config: ModelConfig,
    ) -> Result<Self, GpError> {
        let n = inputs.len();
        if n == 0 || targets.len() != n {
            return Err(GpError::Configuration(format!(
                "{} inputs for {} targets",
                n,
                targets.len()
            )));
        }
        if !likelihood.supports(&inference) {
            return Err(GpError::Compatibility {
                likelihood: likelihood.name(),
                inference: inference.name(),
            });
        }
        let batch = match inference {
            InferenceSpec::AnalyticSVI { batch, .. } => batch,
            _ => n,
        };
        let encoded = likelihood.init(targets, batch)?;
        let nlatent = likelihood.num_latent();
        let engine = VariationalEngine::from_spec(&inference, n, nlatent, config.seed)?;
        let nprior = if config.independent_priors { nlatent } else { 1 };
        let mut priors = vec![PriorState::new(params); nprior];
        for prior in &mut priors {
            prior.rebuild(&inputs)?;
        }
        Ok(Vgp {
            inputs,
            targets: encoded,
            likelihood,
            engine,
            factors: vec![VariationalGaussian::new(n); nlatent],
            priors,
            config,
            hyper_updated: false,
            trained: false,
        })
    }

    /// per-latent kernel parameterisations; a list of the wrong length is
    /// broadcast from its first entry with a warning
    pub fn set_latent_params(&mut self, params: Vec<[f64; N]>) {
        let fixed = latent_params(params, self.priors.len());
        for (prior, p) in self.priors.iter_mut().zip(fixed) {
            prior.params = p;
        }
        self.hyper_updated = true;
    }

    fn prior_of(&self, k: usize) -> usize {
        if self.config.independent_priors {
            k
        } else {
            0
        }
    }

    fn ensure_caches(&mut self) -> Result<(), GpError> {
        if self.hyper_updated {
            for prior in &mut self.priors {
                prior.rebuild(&self.inputs)?;
            }
            self.hyper_updated = false;
        }
        Ok(())
    }

    /// targets, means and variances restricted to the active batch,
    /// per latent
    fn batch_marginals(
        &self,
        batch: &[usize],
    ) -> (Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let nlatent = self.factors.len();
        let mut y = Vec::with_capacity(nlatent);
        let mut mu = Vec::with_capacity(nlatent);
        let mut var = Vec::with_capacity(nlatent);
        for k in 0..nlatent {
            let f = &self.factors[k];
            y.push(batch.iter().map(|&i| self.targets[k][i]).collect());
            mu.push(batch.iter().map(|&i| f.mu[(i, 0)]).collect());
            var.push(batch.iter().map(|&i| f.sigma[(i, i)]).collect());
        }
        (y, mu, var)
    }

    /// evidence lower bound on the active batch, $\rho$-scaled
    pub fn elbo(&mut self) -> Result<f64, GpError> {
        self.ensure_caches()?;
        let batch: Vec<usize> = self.engine.current_batch().to_vec();
        let (y, mu, var) = self.batch_marginals(&batch);
        let expec = self.engine.rho() * self.likelihood.expected_log_lik(&y, &mu, &var);
        let kl: f64 = (0..self.factors.len())
            .map(|k| {
                kl_to_prior(
                    &self.factors[k],
                    &self.priors[self.prior_of(k)],
                    self.config.mean,
                )
            })
            .sum();
        Ok(expec - kl)
    }

    /// Latent posterior at test points, per latent process
    ///
    /// $\mu_* = \mu_0 + \bm{K}_{*n}\bm{K}_{nn}^{-1}(\mu - \mu_0), \quad
    /// \Sigma_* = \bm{K}_{**} - \bm{K}_{*n}\bm{K}_{nn}^{-1}(\bm{K}_{nn} - \Sigma)\bm{K}_{nn}^{-1}\bm{K}_{n*}$
    ///
    /// Takes `&mut self` to refresh the kernel caches when a preceding
    /// hyperparameter step invalidated them.
    ///
    /// # Errors
    ///
    /// [`GpError::NumericalDegeneracy`] when a stale cache cannot be rebuilt
    #[allow(clippy::type_complexity)]
    pub fn predict_f(
        &mut self,
        x2: &[T],
        covariance: bool,
        full_covariance: bool,
    ) -> Result<(Vec<Vec<f64>>, Option<Vec<PosteriorCov>>), GpError> {
        self.ensure_caches()?;
        let n = self.inputs.len();
        let t = x2.len();
        let c = self.config.mean.value();
        let mut means = Vec::with_capacity(self.factors.len());
        let mut covs = if covariance { Some(Vec::new()) } else { None };
        for k in 0..self.factors.len() {
            let prior = &self.priors[self.prior_of(k)];
            let f = &self.factors[k];
            let knx = cross_mat(&self.inputs, x2, &prior.params);
            // A = Knn^-1 Kn*
            let a = &prior.inv * &knx;
            let centered = Mat::from_fn(n, 1, |i, _| f.mu[(i, 0)] - c);
            let mu_star = a.transpose() * &centered;
            means.push((0..t).map(|j| c + mu_star[(j, 0)]).collect());
            if let Some(covs) = covs.as_mut() {
                // B = (Knn - Sigma) A
                let resid = Mat::from_fn(n, n, |i, j| {
                    Kernel::metric(&self.inputs[i], &self.inputs[j], &prior.params)
                        - f.sigma[(i, j)]
                });
                let b = resid * &a;
                if full_covariance {
                    let kxx = Mat::from_fn(t, t, |i, j| {
                        Kernel::metric(&x2[i], &x2[j], &prior.params)
                    });
                    covs.push(PosteriorCov::Full(kxx - a.transpose() * b));
                } else {
                    let diag = (0..t)
                        .map(|j| {
                            let kjj = Kernel::metric(&x2[j], &x2[j], &prior.params);
                            let corr: f64 = (0..n).map(|i| a[(i, j)] * b[(i, j)]).sum();
                            (kjj - corr).max(0.)
                        })
                        .collect();
                    covs.push(PosteriorCov::Diagonal(diag));
                }
            }
        }
        Ok((means, covs))
    }

    /// Point predictions of y through the likelihood
    ///
    /// # Errors
    ///
    /// forwarded from [`Vgp::predict_f`]
    pub fn predict_y(&mut self, x2: &[T]) -> Result<Vec<f64>, GpError> {
        let (mu, var) = self.marginal_pairs(x2)?;
        Ok(self.likelihood.predict_mean(&mu, &var))
    }

    /// Event/class probabilities (or predictive variances for regression)
    ///
    /// # Errors
    ///
    /// forwarded from [`Vgp::predict_f`]
    pub fn proba_y(&mut self, x2: &[T]) -> Result<Vec<Vec<f64>>, GpError> {
        let (mu, var) = self.marginal_pairs(x2)?;
        Ok(self.likelihood.proba(&mu, &var))
    }

    fn marginal_pairs(&mut self, x2: &[T]) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>), GpError> {
        let (mu, covs) = self.predict_f(x2, true, false)?;
        let var = covs
            .expect("covariance was requested")
            .into_iter()
            .map(|c| match c {
                PosteriorCov::Diagonal(d) => d,
                PosteriorCov::Full(_) => unreachable!("diagonal covariance was requested"),
            })
            .collect();
        Ok((mu, var))
    }

    /// shared access for the tests and demo binaries
    #[must_use]
    pub fn likelihood(&self) -> &L {
        &self.likelihood
    }

    /// true once the driver has reached Converged
    #[must_use]
    pub fn trained(&self) -> bool {
        self.trained
    }

    /// current kernel parameters of each prior
    #[must_use]
    pub fn params(&self) -> Vec<[f64; N]> {
        self.priors.iter().map(|p| p.params).collect()
    }
}

impl<const N: usize, T, L> TrainableModel for Vgp<N, T, L>
where
    T: Kernel<N> + Sync,
    L: AugLikelihood,
{
    fn step(&mut self) -> Result<(), GpError> {
        self.ensure_caches()?;
        let batch: Vec<usize> = self.engine.next_batch().to_vec();
        let rho = self.engine.rho();
        let n = self.inputs.len();
        let nlatent = self.factors.len();

        // 1. local updates: augmentation variables from the current marginals
        let (y_b, mu_b, var_b) = self.batch_marginals(&batch);
        self.likelihood.local_updates(&y_b, &mu_b, &var_b, rho);
        let steps = self.engine.step_sizes();

        // 2. natural-gradient targets, per latent, from one consistent
        // snapshot
        let priors = &self.priors;
        let likelihood = &self.likelihood;
        let independent = self.config.independent_priors;
        let mean = self.config.mean;
        let updates: Vec<(Mat<f64>, Mat<f64>)> = (0..nlatent)
            .into_par_iter()
            .map(|k| {
                let prior = &priors[if independent { k } else { 0 }];
                let r = likelihood.grad_mean(&y_b, k);
                let theta = likelihood.precision(k);
                let mu0 = mean.column(n);
                let mut e1 = &prior.inv * &mu0;
                for (j, &i) in batch.iter().enumerate() {
                    e1[(i, 0)] += rho * r[j];
                }
                let mut e2 = Mat::from_fn(n, n, |a, b| -0.5 * prior.inv[(a, b)]);
                for (j, &i) in batch.iter().enumerate() {
                    e2[(i, i)] -= 0.5 * rho * theta[j];
                }
                (e1, e2)
            })
            .collect();

        // 3. global update after the barrier: step towards the targets, then
        // restore the moment invariant
        for (k, (t1, t2)) in updates.into_iter().enumerate() {
            let l = steps[k];
            let f = &mut self.factors[k];
            let e1 = Mat::from_fn(n, 1, |i, _| {
                f.eta1[(i, 0)] + l * (t1[(i, 0)] - f.eta1[(i, 0)])
            });
            let e2 = Mat::from_fn(n, n, |i, j| {
                f.eta2[(i, j)] + l * (t2[(i, j)] - f.eta2[(i, j)])
            });
            f.eta1 = e1;
            f.eta2 = e2;
            f.recover_moments()?;
        }
        Ok(())
    }

    fn hyper_step(&mut self) -> Result<(), GpError> {
        self.ensure_caches()?;
        let n = self.inputs.len();
        let nlatent = self.factors.len();
        let independent = self.config.independent_priors;
        let mean = self.config.mean;
        let step = LogScaleStep {
            rate: self.config.hyper_rate,
        };
        for (pi, prior) in self.priors.iter_mut().enumerate() {
            let latents: Vec<usize> = if independent {
                vec![pi]
            } else {
                (0..nlatent).collect()
            };
            let c = mean.value();
            let mut s = Mat::<f64>::zeros(n, n);
            for &k in &latents {
                let f = &self.factors[k];
                s = s + Mat::from_fn(n, n, |i, j| {
                    f.sigma[(i, j)] + (f.mu[(i, 0)] - c) * (f.mu[(j, 0)] - c)
                });
            }
            #[allow(clippy::cast_precision_loss)]
            let grads = prior.param_grads(&self.inputs, &s, latents.len() as f64);
            for (p, g) in prior.params.iter_mut().zip(grads) {
                *p = step.apply(*p, g);
            }
        }
        let mut g = 0.;
        for k in 0..nlatent {
            g += mean_grad(
                &self.factors[k],
                &self.priors[if independent { k } else { 0 }],
                mean,
            );
        }
        self.config.mean.ascend(g, self.config.hyper_rate);
        self.hyper_updated = true;
        Ok(())
    }

    fn param_snapshot(&self) -> Vec<f64> {
        let n = self.inputs.len();
        let mut snap = Vec::with_capacity(self.factors.len() * 2 * n);
        for f in &self.factors {
            snap.extend(f.mu_vec());
            snap.extend(f.diag_sigma());
        }
        snap
    }

    fn objective(&mut self) -> f64 {
        self.elbo().unwrap_or(f64::NAN)
    }

    fn epsilon(&self) -> f64 {
        self.engine.epsilon()
    }

    fn verbose(&self) -> u8 {
        self.config.verbose
    }

    fn autotuning(&self) -> bool {
        self.config.autotuning
    }

    fn atfrequency(&self) -> usize {
        self.config.atfrequency.max(1)
    }

    fn set_trained(&mut self, trained: bool) {
        self.trained = trained;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::{BayesianSvm, Gaussian, Logistic, LogisticSoftMax, SoftMax};
    use crate::linalg::{eye, inv_from_l, jittered_cholesky_l};
    use crate::optim::InverseDecay;
    use crate::train::train;
    use itertools::Itertools;

    #[derive(Clone, Debug)]
    struct OneD(f64);

    impl Kernel<1> for OneD {
        fn metric(&self, rhs: &Self, param: &[f64; 1]) -> f64 {
            (-0.5 * param[0] * (self.0 - rhs.0).powi(2)).exp()
        }
        fn deriv(&self, rhs: &Self, param: &[f64; 1]) -> [f64; 1] {
            let d2 = (self.0 - rhs.0).powi(2);
            [-0.5 * d2 * (-0.5 * param[0] * d2).exp()]
        }
    }

    #[derive(Clone, Debug)]
    struct TwoDpoint(f64, f64);

    impl Kernel<1> for TwoDpoint {
        fn metric(&self, rhs: &Self, param: &[f64; 1]) -> f64 {
            let z2 = param[0] * (((self.0 - rhs.0).powi(2)) + ((self.1 - rhs.1).powi(2)));
            (-0.5 * z2).exp()
        }
        fn deriv(&self, rhs: &Self, param: &[f64; 1]) -> [f64; 1] {
            let z2 = param[0] * (((self.0 - rhs.0).powi(2)) + ((self.1 - rhs.1).powi(2)));
            let dz2dp = ((self.0 - rhs.0).powi(2)) + ((self.1 - rhs.1).powi(2));
            [-0.5 * dz2dp * (-0.5 * z2).exp()]
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn line(n: usize, lo: f64, hi: f64) -> Vec<OneD> {
        (0..n)
            .map(|i| OneD(lo + (hi - lo) * i as f64 / (n - 1) as f64))
            .collect()
    }

    #[allow(clippy::cast_precision_loss)]
    fn unit_grid(side: usize) -> Vec<TwoDpoint> {
        let range: Vec<f64> = (0..side).map(|i| i as f64 / (side - 1) as f64).collect();
        range
            .clone()
            .into_iter()
            .cartesian_product(range)
            .map(|(a, b)| TwoDpoint(a, b))
            .collect()
    }

    #[test]
    fn one_sweep_is_the_exact_conjugate_posterior() {
        let noise = 0.1;
        let inputs = line(8, 0., 2.);
        let y: Vec<f64> = inputs.iter().map(|x| (2. * x.0).sin()).collect();
        let mut model = Vgp::new(
            inputs.clone(),
            &y,
            [4.],
            Gaussian::new(noise, false),
            InferenceSpec::AnalyticVI { epsilon: 1e-8 },
            ModelConfig::default(),
        )
        .unwrap();
        model.step().unwrap();

        // sigma = (Knn^-1 + I/eps)^-1, mu = sigma y / eps
        let inv_k = model.priors[0].inv.clone();
        let n = inputs.len();
        let prec = Mat::from_fn(n, n, |i, j| {
            inv_k[(i, j)] + if i == j { 1. / noise } else { 0. }
        });
        let expected_sigma = inv_from_l(&jittered_cholesky_l(&prec).unwrap());
        let expected_mu =
            &expected_sigma * Mat::from_fn(n, 1, |i, _| y[i] / noise);
        let f = &model.factors[0];
        for i in 0..n {
            assert!((f.mu[(i, 0)] - expected_mu[(i, 0)]).abs() < 1e-8);
            for j in 0..n {
                assert!((f.sigma[(i, j)] - expected_sigma[(i, j)]).abs() < 1e-8);
            }
        }
        // the natural-moment invariant holds after the completed sweep
        let round = &f.sigma * Mat::from_fn(n, n, |i, j| -2. * f.eta2[(i, j)]);
        for i in 0..n {
            for j in 0..n {
                assert!((round[(i, j)] - eye(n)[(i, j)]).abs() < 1e-7);
            }
        }
    }

    #[test]
    fn regression_round_trip_beats_threshold() {
        let inputs = line(40, 0., 2.);
        let y: Vec<f64> = inputs.iter().map(|x| (3. * x.0).sin()).collect();
        let mut model = Vgp::new(
            inputs.clone(),
            &y,
            [8.],
            Gaussian::new(0.01, false),
            InferenceSpec::AnalyticVI { epsilon: 1e-7 },
            ModelConfig::default(),
        )
        .unwrap();
        assert!(train(&mut model, 50).unwrap());
        assert!(model.trained());
        let pred = model.predict_y(&inputs).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let mse: f64 = pred
            .iter()
            .zip(&y)
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        assert!(mse < 0.2, "mse {mse}");
    }

    #[test]
    fn bayesian_svm_classifies_smooth_labels() {
        // 100 2-D points, labels from the sign of a smooth function
        let inputs = unit_grid(10);
        let labels: Vec<f64> = inputs
            .iter()
            .map(|p| {
                let f = p.1 - 0.5 - 0.3 * (2. * std::f64::consts::PI * p.0).sin();
                if f >= 0. {
                    1.
                } else {
                    -1.
                }
            })
            .collect();
        let mut model = Vgp::new(
            inputs.clone(),
            &labels,
            [12.],
            BayesianSvm::new(),
            InferenceSpec::AnalyticVI { epsilon: 1e-7 },
            ModelConfig::default(),
        )
        .unwrap();
        assert!(train(&mut model, 50).unwrap());
        let pred = model.predict_y(&inputs).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let err: f64 = pred
            .iter()
            .zip(&labels)
            .filter(|(p, t)| (*p - *t).abs() > 1e-12)
            .count() as f64
            / labels.len() as f64;
        assert!(err < 0.2, "misclassification rate {err}");
    }

    #[test]
    fn svi_with_full_batch_reproduces_the_vi_delta() {
        let inputs = line(12, 0., 1.);
        let labels: Vec<f64> = inputs
            .iter()
            .map(|x| if x.0 > 0.5 { 1. } else { -1. })
            .collect();
        let n = inputs.len();
        let make = |spec| {
            Vgp::new(
                inputs.clone(),
                &labels,
                [6.],
                Logistic::new(),
                spec,
                ModelConfig::default(),
            )
            .unwrap()
        };
        let mut vi = make(InferenceSpec::AnalyticVI { epsilon: 1e-7 });
        // batch = n forces rho = 1
        let mut svi = make(InferenceSpec::AnalyticSVI {
            batch: n,
            epsilon: 1e-7,
        });
        assert!((svi.engine.rho() - 1.).abs() < 1e-15);

        let eta1_init = vi.factors[0].eta1.clone();
        let eta2_init = vi.factors[0].eta2.clone();
        vi.step().unwrap();
        svi.step().unwrap();

        let step1 = InverseDecay::default().next_step();
        for i in 0..n {
            let vi_delta = vi.factors[0].eta1[(i, 0)] - eta1_init[(i, 0)];
            let svi_delta =
                (svi.factors[0].eta1[(i, 0)] - eta1_init[(i, 0)]) / step1;
            assert!((vi_delta - svi_delta).abs() < 1e-9);
            for j in 0..n {
                let vi_d2 = vi.factors[0].eta2[(i, j)] - eta2_init[(i, j)];
                let svi_d2 =
                    (svi.factors[0].eta2[(i, j)] - eta2_init[(i, j)]) / step1;
                assert!((vi_d2 - svi_d2).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn converged_sweep_is_idempotent() {
        let inputs = line(10, 0., 1.);
        let y: Vec<f64> = inputs.iter().map(|x| x.0.cos()).collect();
        let mut model = Vgp::new(
            inputs,
            &y,
            [3.],
            Gaussian::new(0.05, false),
            InferenceSpec::AnalyticVI { epsilon: 1e-7 },
            ModelConfig::default(),
        )
        .unwrap();
        assert!(train(&mut model, 50).unwrap());
        let before = model.param_snapshot();
        model.step().unwrap();
        let after = model.param_snapshot();
        #[allow(clippy::cast_precision_loss)]
        let delta: f64 = before
            .iter()
            .zip(&after)
            .map(|(a, b)| (a - b).abs())
            .sum::<f64>()
            / before.len() as f64;
        assert!(delta < 1e-7, "delta {delta}");
    }

    #[test]
    fn incompatible_pair_names_both_sides() {
        let inputs = line(6, 0., 1.);
        let labels = vec![0., 1., 0., 1., 1., 0.];
        let err = Vgp::new(
            inputs,
            &labels,
            [2.],
            SoftMax::new(),
            InferenceSpec::AnalyticVI { epsilon: 1e-5 },
            ModelConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, GpError::Compatibility { .. }));
        let msg = err.to_string();
        assert!(msg.contains("SoftMax") && msg.contains("AnalyticVI"), "{msg}");
    }

    #[test]
    fn multiclass_separable_clusters() {
        // three well separated clusters on a line
        let mut inputs = Vec::new();
        let mut labels = Vec::new();
        for (c, centre) in [0., 3., 6.].iter().enumerate() {
            for i in 0..8 {
                inputs.push(OneD(centre + 0.05 * f64::from(i)));
                #[allow(clippy::cast_precision_loss)]
                labels.push(c as f64);
            }
        }
        let config = ModelConfig {
            independent_priors: true,
            ..ModelConfig::default()
        };
        let mut model = Vgp::new(
            inputs.clone(),
            &labels,
            [2.],
            LogisticSoftMax::new(),
            InferenceSpec::AnalyticVI { epsilon: 1e-6 },
            config,
        )
        .unwrap();
        assert!(train(&mut model, 60).unwrap());
        let pred = model.predict_y(&inputs).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let acc: f64 = pred
            .iter()
            .zip(&labels)
            .filter(|(p, t)| (*p - *t).abs() < 1e-12)
            .count() as f64
            / labels.len() as f64;
        assert!(acc > 0.7, "accuracy {acc}");
        // class probabilities normalise
        let proba = model.proba_y(&inputs).unwrap();
        let total: f64 = (0..3).map(|k| proba[k][0]).sum();
        assert!((total - 1.).abs() < 1e-6);
    }

    #[test]
    fn hyper_step_invalidates_and_rebuilds() {
        let inputs = line(10, 0., 1.);
        let y: Vec<f64> = inputs.iter().map(|x| x.0.sin()).collect();
        let mut config = ModelConfig::default();
        config.autotuning = true;
        config.atfrequency = 2;
        let mut model = Vgp::new(
            inputs,
            &y,
            [3.],
            Gaussian::new(0.05, false),
            InferenceSpec::AnalyticVI { epsilon: 0. },
            config,
        )
        .unwrap();
        let before = model.params()[0];
        assert!(train(&mut model, 10).unwrap());
        let after = model.params()[0];
        assert!(before != after, "hyperparameters never moved");
        // caches were rebuilt for the new parameters before predicting
        let xs = model_inputs(&model);
        assert!(model.predict_y(&xs).is_ok());
    }

    fn model_inputs<const N: usize, T: Kernel<N> + Clone, L: AugLikelihood>(
        m: &Vgp<N, T, L>,
    ) -> Vec<T> {
        m.inputs.clone()
    }
}
