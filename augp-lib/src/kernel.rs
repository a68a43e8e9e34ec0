//! Covariance-function seam and kernel matrix builders.
//!
//! The covariance function lives on the point type, so any user type can act
//! as a GP input as long as it can measure similarity to another point and
//! differentiate that similarity with respect to the hyperparameters.

use faer::Mat;

/// Trait bounds needed for a type $\text{T}$ to be a valid input for the Gaussian processes
///
/// 1. There must be a covariance function defined on the type with some f64 hyperparameters
///
/// 2. There must be a derivative of this function in terms of the hyperparameters
///
/// Note that the covariance function should never return NaN
///
/// # Examples
///
/// Defining the RBF Kernel on a 2-D point
/// ```
/// use augp_lib::Kernel;
///
/// pub struct TwoDpoint(f64, f64);
///
/// impl Kernel<1> for TwoDpoint {
///     fn metric(&self, rhs: &Self, param: &[f64; 1]) -> f64 {
///         let z2 = param[0] * (((self.0 - rhs.0).powi(2)) + ((self.1 - rhs.1).powi(2)));
///         (-0.5 * z2).exp()
///     }
///     fn deriv(&self, rhs: &Self, param: &[f64; 1]) -> [f64; 1] {
///         let z2 = param[0] * (((self.0 - rhs.0).powi(2)) + ((self.1 - rhs.1).powi(2)));
///         let dz2dp = ((self.0 - rhs.0).powi(2)) + ((self.1 - rhs.1).powi(2));
///         [-0.5 * dz2dp * (-0.5 * z2).exp()]
///     }
/// }
/// ```
pub trait Kernel<const N: usize, Rhs = Self> {
    /// The covariance function $\phi$ on the type $\text{T} --- $
    /// $\phi: (\text{T}, \text{T}, \[\text{f64; \text{N}}\]) \to \text{f64}$
    fn metric(&self, rhs: &Rhs, param: &[f64; N]) -> f64;
    /// The derivative of this covariance function ---
    /// $\phi': (\text{T}, \text{T}, \[\text{f64; \text{N}}\]) \to \[\text{f64; \text{N}}\]$
    fn deriv(&self, rhs: &Rhs, param: &[f64; N]) -> [f64; N];
}

/// Square covariance matrix $\bm{K}_{i,j} = \phi(x_i, x_j, \theta)$
pub(crate) fn kernel_mat<const N: usize, T: Kernel<N>>(x: &[T], p: &[f64; N]) -> Mat<f64> {
    let n = x.len();
    Mat::from_fn(n, n, |i, j| Kernel::metric(&x[i], &x[j], p))
}

/// Cross covariance matrix $\bm{C}_{i,j} = \phi(x_i, z_j, \theta)$ between two point sets
pub(crate) fn cross_mat<const N: usize, T: Kernel<N>>(x: &[T], z: &[T], p: &[f64; N]) -> Mat<f64> {
    Mat::from_fn(x.len(), z.len(), |i, j| Kernel::metric(&x[i], &z[j], p))
}

/// Hyperparameter derivative matrices $\partial \bm{K} / \partial \theta_m$
///
/// # Panics
///
/// Relies on a Vector with $N$ elements being cast into an array with $N$ : should always hold
pub(crate) fn deriv_mats<const N: usize, T: Kernel<N>>(x: &[T], p: &[f64; N]) -> [Mat<f64>; N] {
    let n = x.len();
    let mut mats = vec![Mat::<f64>::zeros(n, n); N];
    for (i, x_1) in x.iter().enumerate() {
        for (j, x_2) in x.iter().enumerate() {
            let derivs = Kernel::deriv(x_1, x_2, p);
            for (m, d) in derivs.iter().enumerate() {
                mats[m][(i, j)] = *d;
            }
        }
    }
    mats.try_into().unwrap()
}
