//! Dense linear-algebra subroutines shared by every model variant:
//! Cholesky factorisation with bounded jitter repair, solves against a
//! precomputed factor, and the natural-parameter algebra of the Gaussian
//! variational factors.

use dyn_stack::{GlobalPodBuffer, PodStack};
use faer::{Faer, Mat};
use faer_core::Parallelism;
use log::warn;

use crate::error::GpError;

/// initial diagonal jitter for a failed factorisation, doubled on every retry
const JITTER_0: f64 = 1e-8;
/// retries before a degenerate matrix becomes a hard error
const JITTER_TRIES: usize = 10;

/// find x, the solution to AX=B where A is positive definite
/// takes cholesky decomposition of A as an input
pub(crate) fn cholesky_solve(l: &Mat<f64>, b: &Mat<f64>) -> Mat<f64> {
    let mut b = b.clone();
    let i = l.nrows();
    let j = b.ncols();

    faer_cholesky::llt::solve::solve_in_place_with_conj(
        l.as_ref(),
        faer_core::Conj::No,
        b.as_mut(),
        Parallelism::Rayon(0),
        PodStack::new(&mut GlobalPodBuffer::new(
            faer_cholesky::llt::solve::solve_in_place_req::<f64>(j, i, Parallelism::Rayon(0))
                .unwrap(),
        )),
    );

    b
}

/// n by n identity
pub(crate) fn eye(n: usize) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| if i == j { 1. } else { 0. })
}

/// restore exact symmetry, $\frac{1}{2}(\bm{A} + \bm{A}^{\intercal})$
///
/// inversion through a factorisation loses symmetry in the last bits; left
/// uncorrected this corrupts later factorisations of the same matrix
pub(crate) fn symmetrize(a: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| 0.5 * (a[(i, j)] + a[(j, i)]))
}

/// Cholesky factor L of a symmetric matrix, retrying with doubled diagonal
/// jitter on failure
///
/// # Errors
///
/// [`GpError::NumericalDegeneracy`] once the retry budget is exhausted
pub(crate) fn jittered_cholesky_l(a: &Mat<f64>) -> Result<Mat<f64>, GpError> {
    let n = a.nrows();
    if let Ok(chol) = a.cholesky(faer::Side::Lower) {
        return Ok(chol.compute_l());
    }
    let mut jitter = JITTER_0;
    for attempt in 1..=JITTER_TRIES {
        warn!("cholesky failed, retrying with jitter {jitter:.3e} (attempt {attempt})");
        let repaired = Mat::from_fn(n, n, |i, j| a[(i, j)] + if i == j { jitter } else { 0. });
        if let Ok(chol) = repaired.cholesky(faer::Side::Lower) {
            return Ok(chol.compute_l());
        }
        jitter *= 2.;
    }
    Err(GpError::NumericalDegeneracy {
        attempts: JITTER_TRIES,
    })
}

/// inverse of a positive definite matrix from its Cholesky factor, symmetrized
pub(crate) fn inv_from_l(l: &Mat<f64>) -> Mat<f64> {
    symmetrize(&cholesky_solve(l, &eye(l.nrows())))
}

/// $\ln |\bm{A}|$ from the Cholesky factor of $\bm{A}$
pub(crate) fn logdet_from_l(l: &Mat<f64>) -> f64 {
    2. * (0..l.nrows()).map(|i| l[(i, i)].ln()).sum::<f64>()
}

/// One Gaussian variational factor $q(f) = \mathcal{N}(\mu, \Sigma)$ kept in
/// both the moment and the natural parameterisation
///
/// Invariant (restored by [`VariationalGaussian::recover_moments`] after any
/// natural-parameter update, never mid-update):
///
/// $\Sigma = -\frac{1}{2}\eta_2^{-1}, \quad \mu = \Sigma \eta_1$
///
/// Coordinate-ascent updates are accumulated on $(\eta_1, \eta_2)$ because
/// sums of natural parameters realise the conjugate update rule; $(\mu,
/// \Sigma)$ are recovered by inversion only when local updates or predictions
/// need them.
#[derive(Clone, Debug)]
pub struct VariationalGaussian {
    /// posterior mean, n by 1
    pub mu: Mat<f64>,
    /// posterior covariance, symmetric positive definite
    pub sigma: Mat<f64>,
    /// first natural parameter $\eta_1 = \Sigma^{-1}\mu$
    pub eta1: Mat<f64>,
    /// second natural parameter $\eta_2 = -\frac{1}{2}\Sigma^{-1}$, negative definite symmetric
    pub eta2: Mat<f64>,
    /// $\ln|\Sigma|$, kept alongside the inversion for the KL term
    logdet_sigma: f64,
}

impl VariationalGaussian {
    /// identity-covariance factor of dimension n
    pub(crate) fn new(n: usize) -> Self {
        VariationalGaussian {
            mu: Mat::zeros(n, 1),
            sigma: eye(n),
            eta1: Mat::zeros(n, 1),
            eta2: Mat::from_fn(n, n, |i, j| if i == j { -0.5 } else { 0. }),
            logdet_sigma: 0.,
        }
    }

    pub(crate) fn dim(&self) -> usize {
        self.mu.nrows()
    }

    /// rebuild $(\mu, \Sigma)$ from $(\eta_1, \eta_2)$
    ///
    /// $\Sigma = (-2\eta_2)^{-1}$ through a jittered Cholesky factorisation,
    /// symmetrized; then $\mu = \Sigma\eta_1$
    ///
    /// # Errors
    ///
    /// [`GpError::NumericalDegeneracy`] if $-2\eta_2$ cannot be factorised
    pub(crate) fn recover_moments(&mut self) -> Result<(), GpError> {
        let n = self.dim();
        let prec = Mat::from_fn(n, n, |i, j| -2. * self.eta2[(i, j)]);
        let l = jittered_cholesky_l(&symmetrize(&prec))?;
        self.sigma = inv_from_l(&l);
        self.logdet_sigma = -logdet_from_l(&l);
        self.mu = &self.sigma * &self.eta1;
        Ok(())
    }

    /// $\ln|\Sigma|$ from the last moment recovery
    pub(crate) fn logdet_sigma(&self) -> f64 {
        self.logdet_sigma
    }

    /// override the cached $\ln|\Sigma|$ when $\Sigma$ is assigned directly
    pub(crate) fn set_logdet_sigma(&mut self, v: f64) {
        self.logdet_sigma = v;
    }

    /// posterior variances, the diagonal of $\Sigma$
    pub(crate) fn diag_sigma(&self) -> Vec<f64> {
        (0..self.dim()).map(|i| self.sigma[(i, i)]).collect()
    }

    /// posterior mean as a flat vector
    pub(crate) fn mu_vec(&self) -> Vec<f64> {
        (0..self.dim()).map(|i| self.mu[(i, 0)]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::assert_matrix_eq;
    use faer::mat;

    #[test]
    fn solve_against_known_factor() {
        let initial = mat!([4., 12.], [12., 37.]);
        let l = jittered_cholesky_l(&initial).unwrap();
        let expected_l = mat!([2., 0.], [6., 1.]);
        assert_matrix_eq!(l, expected_l, comp = float);

        let target = mat!([1., 2.], [3., 4.]);
        let res = cholesky_solve(&l, &target);
        let expected_res = mat!([0.25, 6.5], [0., -2.]);
        assert_matrix_eq!(res, expected_res, comp = float);
    }

    #[test]
    fn inverse_and_logdet() {
        let a = mat!([4., 2.], [2., 3.]);
        let l = jittered_cholesky_l(&a).unwrap();
        let inv = inv_from_l(&l);
        let prod = &a * &inv;
        assert_matrix_eq!(prod, eye(2), comp = abs, tol = 1e-12);
        // |A| = 8
        assert!((logdet_from_l(&l) - 8f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn jitter_repairs_semidefinite() {
        // rank-1, singular: needs jitter to factorise
        let a = mat!([1., 1.], [1., 1.]);
        let l = jittered_cholesky_l(&a).unwrap();
        assert_eq!(l.nrows(), 2);
    }

    #[test]
    fn natural_moment_round_trip() {
        let mut q = VariationalGaussian::new(3);
        // precision 2I shifted by an off-diagonal coupling
        q.eta2 = mat!([-1., 0.1, 0.], [0.1, -1., 0.1], [0., 0.1, -1.]);
        q.eta1 = mat!([1.], [0.5], [-0.3]);
        q.recover_moments().unwrap();

        // invariant: eta2 = -0.5 * sigma^-1  <=>  sigma * (-2 eta2) = I
        let prod = &q.sigma * Mat::from_fn(3, 3, |i, j| -2. * q.eta2[(i, j)]);
        assert_matrix_eq!(prod, eye(3), comp = abs, tol = 1e-10);
        // invariant: mu = sigma * eta1
        let mu = &q.sigma * &q.eta1;
        assert_matrix_eq!(mu, q.mu, comp = abs, tol = 1e-12);
        // symmetry of the recovered covariance
        for i in 0..3 {
            for j in 0..3 {
                assert!((q.sigma[(i, j)] - q.sigma[(j, i)]).abs() < 1e-14);
            }
        }
    }
}
