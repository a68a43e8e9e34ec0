//! Exact conjugate regression: Gaussian likelihood, Analytic inference.
//!
//! No variational machinery is needed here; the posterior is available in
//! closed form through one Cholesky factorisation of the noisy prior
//! covariance, and training reduces to gradient ascent on the log marginal
//! likelihood at the driver's hyperparameter cadence.

use std::f64::consts::PI;

use faer::{Faer, Mat};

use crate::error::GpError;
use crate::kernel::{deriv_mats, Kernel};
use crate::linalg::{cholesky_solve, logdet_from_l};
use crate::model::PosteriorCov;
use crate::optim::LogScaleStep;
use crate::train::TrainableModel;

/// Gaussian process regression with closed-form posterior
///
/// The covariance matrix over the inputs is
/// $\bm{K}_{i,j} = \phi(x_i, x_j, \theta) + \delta_{i,j}\epsilon$
/// and all queries go through its Cholesky factor, which is only recomputed
/// when a hyperparameter step changes $\theta$.
#[derive(Clone, Debug)]
pub struct ExactGp<const N: usize, T>
where
    T: Kernel<N>,
{
    inputs: Vec<T>,
    res: Vec<f64>,
    noise: f64,
    params: [f64; N],
    cholesky_l: Mat<f64>,
    tol: f64,
    hyper_rate: f64,
    trained: bool,
}

impl<const N: usize, T> ExactGp<N, T>
where
    T: Kernel<N>,
{
    /// Creates a new exact regression model
    ///
    /// # Errors
    ///
    /// Returns an error if the number of inputs and outputs differ, or if the
    /// noisy covariance is not Cholesky decomposable
    pub fn new(
        inputs: Vec<T>,
        res: Vec<f64>,
        noise: f64,
        params: [f64; N],
    ) -> Result<Self, GpError> {
        if inputs.len() != res.len() || inputs.is_empty() {
            return Err(GpError::Configuration(format!(
                "{} inputs for {} outputs",
                inputs.len(),
                res.len()
            )));
        }
        let cholesky_l = Self::factorise(&inputs, noise, &params)?;
        Ok(ExactGp {
            inputs,
            res,
            noise,
            params,
            cholesky_l,
            tol: 1e-6,
            hyper_rate: 0.05,
            trained: false,
        })
    }

    fn factorise(inputs: &[T], noise: f64, params: &[f64; N]) -> Result<Mat<f64>, GpError> {
        let n = inputs.len();
        let autocorr =
            Mat::from_fn(n, n, |i, j| Kernel::metric(&inputs[i], &inputs[j], params))
                + Mat::from_fn(n, n, |i, j| if i == j { noise } else { 0. });
        Ok(autocorr.cholesky(faer::Side::Lower)?.compute_l())
    }

    fn res_col(&self) -> Mat<f64> {
        Mat::from_fn(self.res.len(), 1, |i, _| self.res[i])
    }

    /// Calculate the log marginal likelihood (eq 2.30)
    ///
    /// $\ln p(y | x, \theta) = -\frac{1}{2}(y^{\intercal}\bm{K}^{-1}y + \ln|\bm{K}| + N\ln 2\pi)$
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn log_marginal_likelihood(&self) -> f64 {
        let y = self.res_col();
        let n = self.res.len();
        let chol_res = cholesky_solve(&self.cholesky_l, &y);
        let yky = (chol_res.transpose() * y)[(0, 0)];
        let logdet = logdet_from_l(&self.cholesky_l);
        -0.5 * (yky + logdet + (n as f64) * (2. * PI).ln())
    }

    /// Gradient of [`ExactGp::log_marginal_likelihood`] with respect to the
    /// kernel hyperparameters
    ///
    /// $\frac{\partial}{\partial \theta_{m}}\ln p(y | x, \theta) = \frac{1}{2}\text{Tr}(\bm{K}^{-1}yy^{\intercal}\bm{K}^{-1}\frac{\partial \bm{K}}{\partial \theta_{m}} - \bm{K}^{-1}\frac{\partial \bm{K}}{\partial \theta_{m}})$
    #[must_use]
    pub fn gradient(&self) -> [f64; N] {
        let y = self.res_col();
        let chol_res = cholesky_solve(&self.cholesky_l, &y);

        let dks = deriv_mats(&self.inputs, &self.params);
        let deltas = dks.map(|dk| {
            (&chol_res * chol_res.transpose()) * &dk - cholesky_solve(&self.cholesky_l, &dk)
        });

        deltas.map(|delta| {
            let range = delta.ncols();
            ((0..range).map(|i| delta[(i, i)]).sum::<f64>()) / 2.
        })
    }

    /// Posterior over test points (eq's 2.25, 2.26; the noise is rolled into
    /// $\bm{K}$)
    ///
    /// $\mu = \bm{C}^{\intercal}\bm{K}^{-1}y, \quad
    /// \mathbb{V} = \bm{P} - \bm{C}^{\intercal}\bm{K}^{-1}\bm{C}$
    #[must_use]
    pub fn predict_f(
        &self,
        x2: &[T],
        covariance: bool,
        full_covariance: bool,
    ) -> (Vec<f64>, Option<PosteriorCov>) {
        let x1 = &self.inputs;
        let crosscorr = Mat::from_fn(x1.len(), x2.len(), |i, j| {
            Kernel::metric(&x1[i], &x2[j], &self.params)
        });
        let y = self.res_col();
        let chol_res = cholesky_solve(&self.cholesky_l, &crosscorr);

        let mu_mat = chol_res.transpose() * &y;
        let mu = (0..x2.len()).map(|i| mu_mat[(i, 0)]).collect();
        if !covariance {
            return (mu, None);
        }
        let postcorr = Mat::from_fn(x2.len(), x2.len(), |i, j| {
            Kernel::metric(&x2[i], &x2[j], &self.params)
        });
        let sigma = postcorr - chol_res.transpose() * crosscorr;
        let cov = if full_covariance {
            PosteriorCov::Full(sigma)
        } else {
            PosteriorCov::Diagonal((0..x2.len()).map(|i| sigma[(i, i)]).collect())
        };
        (mu, Some(cov))
    }

    /// Predictive mean and variance of the observations, latent posterior
    /// plus noise
    #[must_use]
    pub fn predict_y(&self, x2: &[T]) -> (Vec<f64>, Vec<f64>) {
        let (mu, cov) = self.predict_f(x2, true, false);
        let var = match cov {
            Some(PosteriorCov::Diagonal(d)) => d.iter().map(|v| v + self.noise).collect(),
            _ => unreachable!("diagonal covariance was requested"),
        };
        (mu, var)
    }

    /// current kernel hyperparameters
    #[must_use]
    pub fn params(&self) -> &[f64; N] {
        &self.params
    }

    /// true once the driver has reached Converged
    #[must_use]
    pub fn trained(&self) -> bool {
        self.trained
    }
}

impl<const N: usize, T> TrainableModel for ExactGp<N, T>
where
    T: Kernel<N>,
{
    // the posterior is exact; the sweep has nothing to update
    fn step(&mut self) -> Result<(), GpError> {
        Ok(())
    }

    fn hyper_step(&mut self) -> Result<(), GpError> {
        let grads = self.gradient();
        let step = LogScaleStep {
            rate: self.hyper_rate,
        };
        for (p, g) in self.params.iter_mut().zip(grads) {
            *p = step.apply(*p, g);
        }
        self.cholesky_l = Self::factorise(&self.inputs, self.noise, &self.params)?;
        Ok(())
    }

    fn param_snapshot(&self) -> Vec<f64> {
        vec![self.log_marginal_likelihood()]
    }

    fn objective(&mut self) -> f64 {
        self.log_marginal_likelihood()
    }

    fn epsilon(&self) -> f64 {
        self.tol
    }

    fn verbose(&self) -> u8 {
        0
    }

    // training the exact model is hyperparameter ascent
    fn autotuning(&self) -> bool {
        true
    }

    fn atfrequency(&self) -> usize {
        1
    }

    fn set_trained(&mut self, trained: bool) {
        self.trained = trained;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::train;
    use itertools::Itertools;

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

    fn lim_nonpoly(x: &TwoDpoint) -> f64 {
        ((30. + 5. * x.0 * (5. * x.0).sin()) * (4. + (-5. * x.1).exp()) - 100.) / 6.
    }

    fn grid(n: usize) -> Vec<TwoDpoint> {
        #[allow(clippy::cast_precision_loss)]
        let range: Vec<f64> = (0..(n + 1)).map(|i| i as f64 / (n as f64)).collect();
        range
            .clone()
            .into_iter()
            .cartesian_product(range)
            .map(|(i, j)| TwoDpoint(i, j))
            .collect()
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let inputs = grid(3);
        let mut outputs: Vec<f64> = inputs.iter().map(lim_nonpoly).collect();
        outputs.pop();
        assert!(matches!(
            ExactGp::new(inputs, outputs, 0.01, [10.]).unwrap_err(),
            GpError::Configuration(_)
        ));
    }

    #[test]
    fn interpolates_smooth_surface() {
        let inputs = grid(10);
        let outputs: Vec<f64> = inputs.iter().map(lim_nonpoly).collect();
        let proc = ExactGp::new(inputs, outputs, 1e-6, [1750.]).unwrap();

        let probe = TwoDpoint(0.215, 0.255);
        let truth = lim_nonpoly(&probe);
        let (mu, var) = proc.predict_y(&[probe]);
        assert!((mu[0] - truth).abs() < 0.1, "mu {} truth {}", mu[0], truth);
        assert!(var[0] >= 0.);
    }

    #[test]
    fn training_improves_marginal_likelihood() {
        let inputs = grid(6);
        let outputs: Vec<f64> = inputs.iter().map(lim_nonpoly).collect();
        let mut proc = ExactGp::new(inputs, outputs, 0.01, [100.]).unwrap();
        let before = proc.log_marginal_likelihood();
        assert!(train(&mut proc, 25).unwrap());
        assert!(proc.trained());
        assert!(proc.log_marginal_likelihood() >= before - 1e-9);
    }
}
