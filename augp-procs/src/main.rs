use std::time::Instant;

use augp_lib::{
    train, BayesianSvm, Gaussian, InferenceSpec, Kernel, Logistic, ModelConfig, Svgp, Vgp,
};
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Clone, Copy, Debug)]
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

#[derive(Clone, Copy, Debug)]
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

// wavy decision boundary over the unit square
fn boundary(p: &TwoDpoint) -> f64 {
    p.1 - 0.5 - 0.3 * (2. * std::f64::consts::PI * p.0).sin()
}

fn classification_demo() {
    let n: usize = 14;
    let range: Vec<f64> = (0..n).map(|i| i as f64 / (n - 1) as f64).collect();
    let inputs: Vec<TwoDpoint> = range
        .clone()
        .into_iter()
        .cartesian_product(range)
        .map(|(a, b)| TwoDpoint(a, b))
        .collect();
    let labels: Vec<f64> = inputs
        .iter()
        .map(|p| if boundary(p) >= 0. { 1. } else { -1. })
        .collect();

    let config = ModelConfig {
        verbose: 1,
        ..ModelConfig::default()
    };

    let now = Instant::now();
    let mut svm = Vgp::new(
        inputs.clone(),
        &labels,
        [14.],
        BayesianSvm::new(),
        InferenceSpec::AnalyticVI { epsilon: 1e-6 },
        config,
    )
    .unwrap();
    train(&mut svm, 100).unwrap();
    println!("BayesianSVM VGP trained in {:.2?}", now.elapsed());

    let pred = svm.predict_y(&inputs).unwrap();
    let errors = pred
        .iter()
        .zip(&labels)
        .filter(|(p, t)| (*p - *t).abs() > 1e-12)
        .count();
    println!(
        "training error {} / {} (elbo {:.3})",
        errors,
        labels.len(),
        svm.elbo().unwrap()
    );

    let now = Instant::now();
    let mut logit = Vgp::new(
        inputs.clone(),
        &labels,
        [14.],
        Logistic::new(),
        InferenceSpec::AnalyticVI { epsilon: 1e-6 },
        config,
    )
    .unwrap();
    train(&mut logit, 100).unwrap();
    println!("Logistic VGP trained in {:.2?}", now.elapsed());
    let proba = logit.proba_y(&[TwoDpoint(0.5, 0.9), TwoDpoint(0.5, 0.1)]).unwrap();
    println!("p(y = 1) above / below the boundary: {:.3} / {:.3}", proba[0][0], proba[0][1]);
}

fn sparse_regression_demo() {
    let n = 600;
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let inputs: Vec<OneD> = (0..n).map(|_| OneD(rng.gen_range(0.0..4.0))).collect();
    let targets: Vec<f64> = inputs
        .iter()
        .map(|x| (2. * x.0).sin() + 0.1 * rng.gen_range(-1.0..1.0))
        .collect();

    let now = Instant::now();
    let mut model = Svgp::new(
        inputs.clone(),
        &targets,
        [4.],
        Gaussian::new(0.05, true),
        InferenceSpec::AnalyticSVI {
            batch: 64,
            epsilon: 1e-7,
        },
        24,
        ModelConfig {
            verbose: 1,
            ..ModelConfig::default()
        },
    )
    .unwrap();
    train(&mut model, 300).unwrap();
    println!(
        "sparse SVI regression ({} points, 24 inducing) trained in {:.2?}",
        n,
        now.elapsed()
    );

    let probes: Vec<OneD> = (0..9).map(|i| OneD(f64::from(i) * 0.5)).collect();
    let pred = model.predict_y(&probes).unwrap();
    for (p, yhat) in probes.iter().zip(&pred) {
        println!(
            "x = {:.1}: predicted {:+.3}, truth {:+.3}",
            p.0,
            yhat,
            (2. * p.0).sin()
        );
    }
}

fn main() {
    env_logger::init();
    classification_demo();
    sparse_regression_demo();
}
