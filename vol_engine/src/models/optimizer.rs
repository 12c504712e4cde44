//! models/optimizer.rs - Maximum-likelihood estimation
//!
//! Minimises the negative log-likelihood with Nelder-Mead (derivative-free).
//! Constraints are enforced by returning a large penalty for infeasible
//! points, so the simplex never settles outside the admissible region.

use argmin::core::{CostFunction, Error, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;

use super::{distribution, garch, mean, ParamLayout};
use crate::config::EngineConfig;
use crate::error::{Result, VolError};

const LARGE_NUMBER: f64 = 1e12;

/// What to do when the optimizer stops without meeting its tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Raise `VolError::Convergence`.
    #[default]
    Strict,
    /// Log a warning and keep the best parameters found.
    BestEffort,
}

#[derive(Debug, Clone)]
pub(crate) struct Optimum {
    pub params: Vec<f64>,
    pub nll: f64,
    pub converged: bool,
    pub iterations: u64,
}

/// Negative log-likelihood of `theta` on `returns`; `LARGE_NUMBER` when
/// `theta` is infeasible or the likelihood is not finite.
pub(crate) fn objective(config: &EngineConfig, layout: &ParamLayout, theta: &[f64], returns: &[f64]) -> f64 {
    if !layout.is_feasible(config, theta) {
        return LARGE_NUMBER;
    }

    let resid = mean::residuals(config.mean_model, layout.mean(theta), returns);
    let bc = garch::backcast(&resid);
    let sigma2 = garch::conditional_variance(config.volatility_model, layout.vol(theta), &resid, bc);
    let nll = distribution::negative_log_likelihood(
        config.error_distribution,
        layout.dist(theta),
        &resid,
        &sigma2,
    );
    if nll.is_finite() {
        nll
    } else {
        LARGE_NUMBER
    }
}

struct NegLogLikelihood<'a> {
    config: &'a EngineConfig,
    layout: ParamLayout,
    returns: &'a [f64],
}

impl<'a> CostFunction for NegLogLikelihood<'a> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> std::result::Result<Self::Output, Error> {
        Ok(objective(self.config, &self.layout, theta, self.returns))
    }
}

/// Initial simplex: the start point plus one vertex per coordinate, each
/// shrunk by 10% (or nudged by 0.01 when the coordinate is ~0).
fn initial_simplex(theta0: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = vec![theta0.to_vec()];
    for i in 0..theta0.len() {
        let mut v = theta0.to_vec();
        v[i] = if v[i].abs() > 1e-3 { v[i] * 0.9 } else { v[i] + 0.01 };
        simplex.push(v);
    }
    simplex
}

/// Run Nelder-Mead from `start`. Convergence policy is left to the caller.
pub(crate) fn minimize(
    config: &EngineConfig,
    layout: ParamLayout,
    returns: &[f64],
    start: &[f64],
) -> Result<Optimum> {
    let optimizer_err = |e: Error| VolError::Convergence {
        iterations: 0,
        reason: format!("optimizer failed: {e}"),
    };

    let cost = NegLogLikelihood { config, layout, returns };
    let solver = NelderMead::new(initial_simplex(start))
        .with_sd_tolerance(config.tolerance)
        .map_err(optimizer_err)?;

    let result = Executor::new(cost, solver)
        .configure(|state| state.max_iters(config.max_iterations))
        .run()
        .map_err(optimizer_err)?;

    let state = result.state();
    let iterations = state.get_iter();
    let params = state.get_best_param().cloned().ok_or_else(|| VolError::Convergence {
        iterations,
        reason: "optimizer produced no parameters".into(),
    })?;
    let converged = matches!(
        state.get_termination_status(),
        TerminationStatus::Terminated(
            TerminationReason::SolverConverged | TerminationReason::TargetCostReached
        )
    );

    Ok(Optimum {
        nll: state.get_best_cost(),
        params,
        converged,
        iterations,
    })
}
