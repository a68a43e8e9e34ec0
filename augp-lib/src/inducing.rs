//! Inducing-point initialisation for the sparse models.
//!
//! Input points are opaque types carrying only a covariance function, so the
//! clustering pass works in the metric space the kernel induces: a seeded
//! farthest-point sweep that keeps the selected set spread out under the
//! kernel similarity. Selected points are copies of training inputs; they are
//! fixed after initialisation.

use ordered_float::NotNan;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::kernel::Kernel;

/// pick m spread-out inducing points from the training inputs
///
/// The first point is drawn uniformly; each following point is the input
/// least similar (under the kernel) to everything already selected.
///
/// # Panics
///
/// Panics if the covariance function returns NaN
pub(crate) fn select_inducing<const N: usize, T>(
    inputs: &[T],
    m: usize,
    p: &[f64; N],
    seed: u64,
) -> Vec<T>
where
    T: Kernel<N> + Clone,
{
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let first = rng.gen_range(0..inputs.len());

    let mut chosen = vec![first];
    // best similarity of every input to the selected set so far
    let mut best: Vec<NotNan<f64>> = inputs
        .iter()
        .map(|x| NotNan::new(Kernel::metric(x, &inputs[first], p)).expect("NaN from metric"))
        .collect();

    while chosen.len() < m {
        let next = best
            .iter()
            .enumerate()
            .filter(|(i, _)| !chosen.contains(i))
            .min_by_key(|(_, s)| **s)
            .map(|(i, _)| i)
            .expect("more inducing points than inputs");
        chosen.push(next);
        for (i, b) in best.iter_mut().enumerate() {
            let s = NotNan::new(Kernel::metric(&inputs[i], &inputs[next], p))
                .expect("NaN from metric");
            if s > *b {
                *b = s;
            }
        }
    }

    chosen.into_iter().map(|i| inputs[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct P(f64);

    impl Kernel<1> for P {
        fn metric(&self, rhs: &Self, param: &[f64; 1]) -> f64 {
            (-0.5 * param[0] * (self.0 - rhs.0).powi(2)).exp()
        }
        fn deriv(&self, _rhs: &Self, _param: &[f64; 1]) -> [f64; 1] {
            [0.]
        }
    }

    #[test]
    fn selection_is_deterministic_and_spread() {
        let pts: Vec<P> = (0..50).map(|i| P(f64::from(i) / 10.)).collect();
        let a = select_inducing(&pts, 5, &[1.], 7);
        let b = select_inducing(&pts, 5, &[1.], 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        // farthest-point selection must reach both ends of the line
        let lo = a.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let hi = a.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        assert!(lo < 1. && hi > 4.);
    }
}
