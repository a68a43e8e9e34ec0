//! Step-size rules consumed by the inference engine: a Robbins–Monro
//! inverse-decay schedule for stochastic natural-gradient steps and a
//! log-space rule for positive kernel hyperparameters.

/// Inverse-decay schedule $\ell_t = (\tau + t)^{-\kappa}$
///
/// With $\kappa \in (0.5, 1]$ the steps satisfy the Robbins–Monro conditions
/// $\sum_t \ell_t = \infty$, $\sum_t \ell_t^2 < \infty$, so the stochastic
/// natural-gradient iteration converges on the coordinate-ascent fixed point.
#[derive(Clone, Debug)]
pub struct InverseDecay {
    tau: f64,
    kappa: f64,
    t: usize,
}

impl Default for InverseDecay {
    fn default() -> Self {
        InverseDecay {
            tau: 100.,
            kappa: 0.51,
            t: 0,
        }
    }
}

impl InverseDecay {
    /// schedule with offset $\tau$ and exponent $\kappa$
    #[must_use]
    pub fn new(tau: f64, kappa: f64) -> Self {
        InverseDecay { tau, kappa, t: 0 }
    }

    /// advance the schedule and return the step size for this iteration
    #[allow(clippy::cast_precision_loss)]
    pub fn next_step(&mut self) -> f64 {
        self.t += 1;
        (self.tau + self.t as f64).powf(-self.kappa)
    }
}

/// Gradient ascent on $\ln \theta$ for parameters constrained positive
///
/// The chain rule gives $\partial/\partial \ln\theta = \theta \cdot
/// \partial/\partial\theta$, so the update is
/// $\theta \gets \theta \exp(\ell \theta \, g)$. Non-finite gradients are
/// skipped, leaving the parameter untouched.
#[derive(Clone, Copy, Debug)]
pub struct LogScaleStep {
    /// learning rate $\ell$
    pub rate: f64,
}

impl Default for LogScaleStep {
    fn default() -> Self {
        LogScaleStep { rate: 0.01 }
    }
}

impl LogScaleStep {
    /// one ascent step; returns the updated parameter
    #[must_use]
    pub fn apply(&self, param: f64, grad: f64) -> f64 {
        let g = param * grad;
        if !g.is_finite() {
            return param;
        }
        // clamp the log-space move so a bad early gradient cannot send the
        // lengthscale to infinity
        param * (self.rate * g).clamp(-1., 1.).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_is_monotone() {
        let mut sched = InverseDecay::new(1., 0.6);
        let a = sched.next_step();
        let b = sched.next_step();
        let c = sched.next_step();
        assert!(a > b && b > c);
        assert!((a - 2f64.powf(-0.6)).abs() < 1e-12);
    }

    #[test]
    fn log_step_keeps_positive() {
        let step = LogScaleStep { rate: 0.1 };
        let p = step.apply(2., -1e12);
        assert!(p > 0.);
        // non-finite gradient is a no-op
        assert!((step.apply(2., f64::NAN) - 2.).abs() < 1e-15);
    }
}
