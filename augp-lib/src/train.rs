//! Training driver: the convergence loop shared by every model container.

use log::{debug, info, warn};

use crate::error::GpError;

/// Driver states; `train` walks Idle → Running → Converged unless an
/// unrepaired numerical failure forces Failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainState {
    /// constructed, not yet trained
    Idle,
    /// inside the iteration loop
    Running,
    /// tolerance reached or iteration budget exhausted
    Converged,
    /// numerical degeneracy survived the local repair
    Failed,
}

/// One-iteration surface the driver needs from a model
pub trait TrainableModel {
    /// one complete sweep: local updates, natural-gradient targets, global
    /// update, invariant restoration
    ///
    /// # Errors
    ///
    /// [`GpError::NumericalDegeneracy`] when a covariance cannot be repaired
    fn step(&mut self) -> Result<(), GpError>;

    /// hyperparameter-gradient step (kernel parameters, prior mean), run at
    /// the `atfrequency` cadence
    ///
    /// # Errors
    ///
    /// [`GpError::NumericalDegeneracy`] when the rebuilt caches fail
    fn hyper_step(&mut self) -> Result<(), GpError>;

    /// flat snapshot of the variational parameters the convergence test
    /// compares across iterations
    fn param_snapshot(&self) -> Vec<f64>;

    /// current objective (ELBO, or log marginal likelihood for the exact
    /// model), for progress reporting; takes `&mut self` because the
    /// variational models refresh lazy kernel caches on the way
    fn objective(&mut self) -> f64;

    /// convergence tolerance ε
    fn epsilon(&self) -> f64;

    fn verbose(&self) -> u8;

    fn autotuning(&self) -> bool;

    fn atfrequency(&self) -> usize;

    fn set_trained(&mut self, trained: bool);
}

/// mean absolute difference between two parameter snapshots
#[allow(clippy::cast_precision_loss)]
fn snapshot_delta(prev: &[f64], cur: &[f64]) -> f64 {
    if prev.len() != cur.len() {
        // latent dimension changed under us, force another sweep
        return f64::INFINITY;
    }
    prev.iter()
        .zip(cur)
        .map(|(a, b)| (a - b).abs())
        .sum::<f64>()
        / prev.len().max(1) as f64
}

/// Run up to `iterations` sweeps, checking convergence after each.
///
/// Returns true on reaching [`TrainState::Converged`]; exhausting the budget
/// counts as convergence, per the coordinate-ascent contract (every sweep is
/// an ascent step). A numerical failure that survives the jitter repair moves
/// the driver to [`TrainState::Failed`] and surfaces the error.
///
/// # Errors
///
/// [`GpError::Configuration`] for a zero iteration budget;
/// [`GpError::NumericalDegeneracy`] forwarded from the model
pub fn train<M: TrainableModel>(model: &mut M, iterations: usize) -> Result<bool, GpError> {
    if iterations == 0 {
        return Err(GpError::Configuration(
            "iteration budget must be positive".to_string(),
        ));
    }
    let mut state = TrainState::Idle;
    debug!("driver state {state:?} -> Running with budget {iterations}");
    state = TrainState::Running;
    let mut prev = model.param_snapshot();

    for iter in 1..=iterations {
        if let Err(e) = model.step() {
            warn!("iteration {iter} failed ({e}), driver state -> {:?}", TrainState::Failed);
            model.set_trained(false);
            return Err(e);
        }
        if model.autotuning() && iter % model.atfrequency() == 0 {
            if let Err(e) = model.hyper_step() {
                warn!(
                    "hyperparameter step at iteration {iter} failed ({e}), driver state -> {:?}",
                    TrainState::Failed
                );
                model.set_trained(false);
                return Err(e);
            }
        }

        let cur = model.param_snapshot();
        let delta = snapshot_delta(&prev, &cur);
        prev = cur;

        match model.verbose() {
            0 => {}
            1 => {
                if iter % 10 == 0 {
                    info!("iteration {iter}: delta {delta:.3e}");
                }
            }
            _ => {
                info!(
                    "iteration {iter}: objective {:.6}, delta {delta:.3e}",
                    model.objective()
                );
            }
        }
        if model.verbose() >= 3 {
            debug!("iteration {iter} snapshot mean delta {delta:.6e}");
        }

        if delta < model.epsilon() {
            if model.verbose() > 0 {
                info!("converged after {iter} iterations (delta {delta:.3e})");
            }
            state = TrainState::Converged;
            break;
        }
    }

    // budget exhaustion also counts as success
    if state == TrainState::Running {
        state = TrainState::Converged;
    }
    model.set_trained(true);
    Ok(state == TrainState::Converged)
}
