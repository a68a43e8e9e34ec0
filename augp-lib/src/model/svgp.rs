//! Sparse variational model: the posterior lives on m inducing points and
//! reaches the data through the projection $\kappa = \bm{K}_{nm}\bm{K}_{mm}^{-1}$.

use faer::Mat;
use rayon::prelude::*;

use crate::error::GpError;
use crate::inducing::select_inducing;
use crate::inference::{InferenceSpec, VariationalEngine};
use crate::kernel::{cross_mat, Kernel};
use crate::likelihood::AugLikelihood;
use crate::linalg::VariationalGaussian;
use crate::model::{
    kl_to_prior, latent_params, mean_grad, ModelConfig, PosteriorCov, PriorState,
};
use crate::optim::LogScaleStep;
use crate::train::TrainableModel;

/// Batch-scoped projection caches of one prior: $\kappa$ over the active
/// mini-batch and the diagonal correction
/// $\tilde{K}_i = K_{ii} - (\kappa \bm{K}_{nm}^{\intercal})_{ii}$.
///
/// Rebuilt for every stochastic mini-batch (the rows change), and only on
/// hyperparameter invalidation in full-batch mode; the $\bm{K}_{mm}$-side
/// caches live in [`PriorState`] and follow the same invalidation flag. This
/// is what keeps an iteration at $O(M^2 N)$ instead of $O(N^3)$.
#[derive(Clone, Debug)]
struct SparseCache {
    kappa: Mat<f64>,
    ktilde: Vec<f64>,
}

/// Sparse variational GP with m inducing points, m ≪ n
#[derive(Debug)]
pub struct Svgp<const N: usize, T, L>
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
    inducing: Vec<T>,
    caches: Vec<Option<SparseCache>>,
    config: ModelConfig,
    hyper_updated: bool,
    trained: bool,
}

impl<const N: usize, T, L> Svgp<N, T, L>
where
    T: Kernel<N> + Clone + Sync,
    L: AugLikelihood,
{
    /// Creates a sparse variational model with `num_inducing` inducing points
    /// selected from the training inputs
    ///
    /// # Errors
    ///
    /// [`GpError::Configuration`] when `num_inducing` is outside (0, n), the
    /// input/target lengths differ, the encoding fails, or the mini-batch
    /// size is out of range; [`GpError::Compatibility`] for an unsupported
    /// (likelihood, inference) pair; [`GpError::NumericalDegeneracy`] when
    /// $\bm{K}_{mm}$ cannot be factorised
    pub fn new(
        inputs: Vec<T>,
        targets: &[f64],
        params: [f64; N],
        mut likelihood: L,
        inference: InferenceSpec,
        num_inducing: usize,
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
        if num_inducing == 0 || num_inducing >= n {
            return Err(GpError::Configuration(format!(
                "inducing point count {num_inducing} outside (0, {n})"
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
        let inducing = select_inducing(&inputs, num_inducing, &params, config.seed);
        let nprior = if config.independent_priors { nlatent } else { 1 };
        let mut priors = vec![PriorState::new(params); nprior];
        for prior in &mut priors {
            prior.rebuild(&inducing)?;
        }
        Ok(Svgp {
            inputs,
            targets: encoded,
            likelihood,
            engine,
            factors: vec![VariationalGaussian::new(num_inducing); nlatent],
            priors,
            inducing,
            caches: vec![None; nprior],
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
                prior.rebuild(&self.inducing)?;
            }
            for cache in &mut self.caches {
                *cache = None;
            }
            self.hyper_updated = false;
        }
        Ok(())
    }

    fn build_cache(&self, pi: usize, batch: &[usize]) -> SparseCache {
        let prior = &self.priors[pi];
        let b = batch.len();
        let m = self.inducing.len();
        let knm = Mat::from_fn(b, m, |j, l| {
            Kernel::metric(&self.inputs[batch[j]], &self.inducing[l], &prior.params)
        });
        let kappa = &knm * &prior.inv;
        let ktilde = (0..b)
            .map(|j| {
                let kjj = Kernel::metric(
                    &self.inputs[batch[j]],
                    &self.inputs[batch[j]],
                    &prior.params,
                );
                let proj: f64 = (0..m).map(|l| kappa[(j, l)] * knm[(j, l)]).sum();
                (kjj - proj).max(0.)
            })
            .collect();
        SparseCache { kappa, ktilde }
    }

    fn refresh_batch_caches(&mut self, batch: &[usize], force: bool) {
        for pi in 0..self.priors.len() {
            if force || self.caches[pi].is_none() {
                self.caches[pi] = Some(self.build_cache(pi, batch));
            }
        }
    }

    /// projected posterior marginals at the batch points,
    /// $\tilde{\mu} = \mu_{0} + \kappa(\mu - \mu_{0,Z})$ and
    /// $\tilde{\sigma}^2_j = \tilde{K}_j + \kappa_j \Sigma \kappa_j^{\intercal}$
    #[allow(clippy::similar_names)]
    fn projected_marginals(
        &self,
        batch: &[usize],
    ) -> (Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let nlatent = self.factors.len();
        let b = batch.len();
        let m = self.inducing.len();
        let c = self.config.mean.value();
        let mut y = Vec::with_capacity(nlatent);
        let mut mu = Vec::with_capacity(nlatent);
        let mut var = Vec::with_capacity(nlatent);
        for k in 0..nlatent {
            let cache = self.caches[self.prior_of(k)]
                .as_ref()
                .expect("batch caches built before projection");
            let f = &self.factors[k];
            y.push(batch.iter().map(|&i| self.targets[k][i]).collect());
            let proj = &cache.kappa * &f.mu;
            let spread = &cache.kappa * &f.sigma;
            mu.push(
                (0..b)
                    .map(|j| {
                        let rowsum: f64 = (0..m).map(|l| cache.kappa[(j, l)]).sum();
                        c * (1. - rowsum) + proj[(j, 0)]
                    })
                    .collect(),
            );
            var.push(
                (0..b)
                    .map(|j| {
                        let quad: f64 =
                            (0..m).map(|l| spread[(j, l)] * cache.kappa[(j, l)]).sum();
                        cache.ktilde[j] + quad
                    })
                    .collect(),
            );
        }
        (y, mu, var)
    }

    /// evidence lower bound on the active batch, $\rho$-scaled
    pub fn elbo(&mut self) -> Result<f64, GpError> {
        self.ensure_caches()?;
        let batch: Vec<usize> = self.engine.current_batch().to_vec();
        self.refresh_batch_caches(&batch, false);
        let (y, mu, var) = self.projected_marginals(&batch);
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
    /// $\mu_* = \mu_0 + \kappa_*(\mu - \mu_{0,Z}), \quad
    /// \Sigma_* = \bm{K}_{**} - \kappa_*(\bm{K}_{mm} - \Sigma)\kappa_*^{\intercal}$
    /// with $\kappa_* = \bm{K}_{*m}\bm{K}_{mm}^{-1}$
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
        let m = self.inducing.len();
        let t = x2.len();
        let c = self.config.mean.value();
        let mut means = Vec::with_capacity(self.factors.len());
        let mut covs = if covariance { Some(Vec::new()) } else { None };
        for k in 0..self.factors.len() {
            let prior = &self.priors[self.prior_of(k)];
            let f = &self.factors[k];
            let ktm = cross_mat(x2, &self.inducing, &prior.params);
            let a = &ktm * &prior.inv;
            let centered = Mat::from_fn(m, 1, |l, _| f.mu[(l, 0)] - c);
            let mu_star = &a * &centered;
            means.push((0..t).map(|j| c + mu_star[(j, 0)]).collect());
            if let Some(covs) = covs.as_mut() {
                let resid = Mat::from_fn(m, m, |i, j| {
                    Kernel::metric(&self.inducing[i], &self.inducing[j], &prior.params)
                        - f.sigma[(i, j)]
                });
                // B = (Kmm - Sigma) A^T
                let bmat = resid * a.transpose();
                if full_covariance {
                    let kxx = Mat::from_fn(t, t, |i, j| {
                        Kernel::metric(&x2[i], &x2[j], &prior.params)
                    });
                    covs.push(PosteriorCov::Full(kxx - &a * bmat));
                } else {
                    let diag = (0..t)
                        .map(|j| {
                            let kjj = Kernel::metric(&x2[j], &x2[j], &prior.params);
                            let corr: f64 = (0..m).map(|l| a[(j, l)] * bmat[(l, j)]).sum();
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
    /// forwarded from [`Svgp::predict_f`]
    pub fn predict_y(&mut self, x2: &[T]) -> Result<Vec<f64>, GpError> {
        let (mu, var) = self.marginal_pairs(x2)?;
        Ok(self.likelihood.predict_mean(&mu, &var))
    }

    /// Event/class probabilities (or predictive variances for regression)
    ///
    /// # Errors
    ///
    /// forwarded from [`Svgp::predict_f`]
    pub fn proba_y(&mut self, x2: &[T]) -> Result<Vec<Vec<f64>>, GpError> {
        let (mu, var) = self.marginal_pairs(x2)?;
        Ok(self.likelihood.proba(&mu, &var))
    }

    fn marginal_pairs(&mut self, x2: &[T]) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>), GpError> {
        let (mu, covs) = self.predict_f(x2, true, false)?;
        let var = covs
            .expect("covariance was requested")
            .into_iter()
            .map(|cov| match cov {
                PosteriorCov::Diagonal(d) => d,
                PosteriorCov::Full(_) => unreachable!("diagonal covariance was requested"),
            })
            .collect();
        Ok((mu, var))
    }

    /// the inducing point set
    #[must_use]
    pub fn inducing_points(&self) -> &[T] {
        &self.inducing
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
}

impl<const N: usize, T, L> TrainableModel for Svgp<N, T, L>
where
    T: Kernel<N> + Clone + Sync,
    L: AugLikelihood,
{
    fn step(&mut self) -> Result<(), GpError> {
        self.ensure_caches()?;
        let batch: Vec<usize> = self.engine.next_batch().to_vec();
        let stochastic = self.engine.is_stochastic();
        self.refresh_batch_caches(&batch, stochastic);
        let rho = self.engine.rho();
        let m = self.inducing.len();
        let b = batch.len();
        let nlatent = self.factors.len();
        let c = self.config.mean.value();

        // 1. local updates on the projected marginals
        let (y_b, mu_b, var_b) = self.projected_marginals(&batch);
        self.likelihood.local_updates(&y_b, &mu_b, &var_b, rho);
        let steps = self.engine.step_sizes();

        // 2. kappa-projected natural-gradient targets, per latent
        let priors = &self.priors;
        let caches = &self.caches;
        let likelihood = &self.likelihood;
        let independent = self.config.independent_priors;
        let updates: Vec<(Mat<f64>, Mat<f64>)> = (0..nlatent)
            .into_par_iter()
            .map(|k| {
                let pi = if independent { k } else { 0 };
                let prior = &priors[pi];
                let cache = caches[pi].as_ref().expect("batch caches built this sweep");
                let r = likelihood.grad_mean(&y_b, k);
                let theta = likelihood.precision(k);
                // the prior-mean offset of the projection enters the linear
                // term with weight theta
                let r_eff: Vec<f64> = (0..b)
                    .map(|j| {
                        let rowsum: f64 = (0..m).map(|l| cache.kappa[(j, l)]).sum();
                        r[j] - theta[j] * c * (1. - rowsum)
                    })
                    .collect();
                let weighted = Mat::from_fn(b, 1, |j, _| rho * r_eff[j]);
                let mu0z = Mat::from_fn(m, 1, |_, _| c);
                let e1 = cache.kappa.transpose() * weighted + &prior.inv * mu0z;
                let scaled = Mat::from_fn(b, m, |j, l| rho * theta[j] * cache.kappa[(j, l)]);
                let ktk = cache.kappa.transpose() * scaled;
                let e2 = Mat::from_fn(m, m, |x, y| -0.5 * (ktk[(x, y)] + prior.inv[(x, y)]));
                (e1, e2)
            })
            .collect();

        // 3. global update after the barrier
        for (k, (t1, t2)) in updates.into_iter().enumerate() {
            let l = steps[k];
            let f = &mut self.factors[k];
            let e1 = Mat::from_fn(m, 1, |i, _| {
                f.eta1[(i, 0)] + l * (t1[(i, 0)] - f.eta1[(i, 0)])
            });
            let e2 = Mat::from_fn(m, m, |i, j| {
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
        let m = self.inducing.len();
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
            let mut s = Mat::<f64>::zeros(m, m);
            for &k in &latents {
                let f = &self.factors[k];
                s = s + Mat::from_fn(m, m, |i, j| {
                    f.sigma[(i, j)] + (f.mu[(i, 0)] - c) * (f.mu[(j, 0)] - c)
                });
            }
            #[allow(clippy::cast_precision_loss)]
            let grads = prior.param_grads(&self.inducing, &s, latents.len() as f64);
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
        let m = self.inducing.len();
        let mut snap = Vec::with_capacity(self.factors.len() * 2 * m);
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
    use crate::likelihood::{Gaussian, Logistic};
    use crate::train::train;

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

    #[allow(clippy::cast_precision_loss)]
    fn line(n: usize, lo: f64, hi: f64) -> Vec<OneD> {
        (0..n)
            .map(|i| OneD(lo + (hi - lo) * i as f64 / (n - 1) as f64))
            .collect()
    }

    #[test]
    fn inducing_count_bounds_are_configuration_errors() {
        let inputs = line(20, 0., 1.);
        let y: Vec<f64> = inputs.iter().map(|x| x.0).collect();
        for m in [0, 20] {
            let err = Svgp::new(
                inputs.clone(),
                &y,
                [4.],
                Gaussian::new(0.1, false),
                InferenceSpec::AnalyticVI { epsilon: 1e-6 },
                m,
                ModelConfig::default(),
            )
            .unwrap_err();
            assert!(matches!(err, GpError::Configuration(_)), "m = {m}: {err}");
        }
    }

    #[test]
    fn sparse_regression_tracks_the_full_signal() {
        let inputs = line(40, 0., 2.);
        let y: Vec<f64> = inputs.iter().map(|x| (3. * x.0).sin()).collect();
        let mut model = Svgp::new(
            inputs.clone(),
            &y,
            [8.],
            Gaussian::new(0.01, false),
            InferenceSpec::AnalyticVI { epsilon: 1e-7 },
            12,
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
    fn stochastic_classification_converges() {
        let inputs = line(40, 0., 1.);
        let labels: Vec<f64> = inputs
            .iter()
            .map(|x| if x.0 > 0.5 { 1. } else { -1. })
            .collect();
        let mut model = Svgp::new(
            inputs.clone(),
            &labels,
            [30.],
            Logistic::new(),
            InferenceSpec::AnalyticSVI {
                batch: 10,
                epsilon: 1e-8,
            },
            10,
            ModelConfig::default(),
        )
        .unwrap();
        assert!(train(&mut model, 150).unwrap());
        let elbo = model.elbo().unwrap();
        assert!(elbo.is_finite());
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
    fn covariances_stay_symmetric_psd() {
        let inputs = line(30, 0., 2.);
        let y: Vec<f64> = inputs.iter().map(|x| x.0.cos()).collect();
        let mut model = Svgp::new(
            inputs,
            &y,
            [5.],
            Gaussian::new(0.05, false),
            InferenceSpec::AnalyticSVI {
                batch: 8,
                epsilon: 1e-9,
            },
            8,
            ModelConfig::default(),
        )
        .unwrap();
        for _ in 0..20 {
            model.step().unwrap();
            let f = &model.factors[0];
            let m = f.sigma.nrows();
            for i in 0..m {
                assert!(f.sigma[(i, i)] > 0.);
                for j in 0..m {
                    assert!((f.sigma[(i, j)] - f.sigma[(j, i)]).abs() < 1e-10);
                }
            }
        }
    }
}
