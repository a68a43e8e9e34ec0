//! Prior mean functions for the latent processes.

use faer::Mat;

/// Prior mean $\mu_0$ of the latent GP
///
/// The constant variant is trainable: the driver feeds it the gradient
/// $\bm{1}^{\intercal}\bm{K}^{-1}(\mu - c\bm{1})$ of the ELBO at the
/// hyperparameter cadence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PriorMean {
    /// $\mu_0(x) = 0$
    Zero,
    /// $\mu_0(x) = c$, with $c$ refined during training
    Constant(f64),
}

impl PriorMean {
    pub(crate) fn value(self) -> f64 {
        match self {
            PriorMean::Zero => 0.,
            PriorMean::Constant(c) => c,
        }
    }

    /// $\mu_0$ evaluated over n points as a column vector
    pub(crate) fn column(self, n: usize) -> Mat<f64> {
        let c = self.value();
        Mat::from_fn(n, 1, |_, _| c)
    }

    /// gradient ascent on the constant; Zero stays fixed
    pub(crate) fn ascend(&mut self, grad: f64, rate: f64) {
        if let PriorMean::Constant(c) = self {
            if grad.is_finite() {
                *c += rate * grad;
            }
        }
    }
}
