//! models.rs - Model specification, estimation and fitted-model state
//!
//! Parameter vector layout (names follow the usual GARCH reporting
//! conventions):
//!
//!   [ mean: mu | const, phi[1..k] ][ omega, alpha[1..p], beta[1..q] ][ nu, lambda ]

pub mod distribution;
pub mod garch;
pub mod mean;
pub mod optimizer;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{EngineConfig, VolatilityModel};
use crate::data::{IndexKey, ReturnSeries};
use crate::error::{Result, VolError};
use distribution::Innovations;
use garch::{VolParams, MIN_VARIANCE};
pub use optimizer::FitMode;

/// Where each parameter group lives in the flat parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParamLayout {
    mean: usize,
    p: usize,
    q: usize,
    dist: usize,
}

impl ParamLayout {
    pub(crate) fn of(config: &EngineConfig) -> Self {
        Self {
            mean: mean::n_params(config.mean_model),
            p: config.arch_order,
            q: config.garch_order,
            dist: distribution::n_params(config.error_distribution),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.mean + 1 + self.p + self.q + self.dist
    }

    pub(crate) fn mean<'a>(&self, theta: &'a [f64]) -> &'a [f64] {
        &theta[..self.mean]
    }

    pub(crate) fn vol<'a>(&self, theta: &'a [f64]) -> VolParams<'a> {
        let o = self.mean;
        VolParams {
            omega: theta[o],
            alpha: &theta[o + 1..o + 1 + self.p],
            beta: &theta[o + 1 + self.p..o + 1 + self.p + self.q],
        }
    }

    pub(crate) fn dist<'a>(&self, theta: &'a [f64]) -> &'a [f64] {
        &theta[self.len() - self.dist..]
    }

    pub(crate) fn is_feasible(&self, config: &EngineConfig, theta: &[f64]) -> bool {
        self.vol(theta).is_valid(config.volatility_model)
            && distribution::is_valid(config.error_distribution, self.dist(theta))
            && self.mean(theta).iter().all(|m| m.is_finite())
    }
}

/// Parameter names of a configuration, in vector order.
pub fn param_names(config: &EngineConfig) -> Vec<String> {
    let mut names = mean::names(config.mean_model);
    names.extend(garch::names(config.arch_order, config.garch_order));
    names.extend(distribution::names(config.error_distribution));
    names
}

/// Smallest return sample accepted for one fit.
pub fn min_observations(config: &EngineConfig) -> usize {
    let k = ParamLayout::of(config).len();
    (2 * k).max(10) + mean::lags(config.mean_model)
}

/// Point estimates plus the filtered state needed to forecast.
#[derive(Debug, Clone)]
pub(crate) struct Estimate {
    pub params: Vec<f64>,
    pub log_likelihood: f64,
    pub converged: bool,
    pub iterations: u64,
    pub resid: Vec<f64>,
    pub sigma2: Vec<f64>,
    pub backcast: f64,
}

impl Estimate {
    /// Fit `config`'s model to a borrowed return slice.
    pub(crate) fn fit(
        config: &EngineConfig,
        returns: &[f64],
        mode: FitMode,
        warm_start: Option<&[f64]>,
    ) -> Result<Self> {
        let layout = ParamLayout::of(config);
        let needed = min_observations(config);
        if returns.len() < needed {
            return Err(VolError::InvalidInput(format!(
                "{} needs at least {needed} returns, got {}",
                config.label(),
                returns.len()
            )));
        }

        let start = Self::starting_point(config, returns);
        let e2 = mean_square(&mean::residuals(config.mean_model, layout.mean(&start), returns));
        if e2 < MIN_VARIANCE {
            debug!("all-zero residuals ({} obs): using variance-floor fit", returns.len());
            return Ok(Self::degenerate(config, layout, start, returns));
        }

        let start = match warm_start {
            Some(w) if w.len() == layout.len() && layout.is_feasible(config, w) => w.to_vec(),
            _ => start,
        };

        let opt = optimizer::minimize(config, layout, returns, &start)?;
        debug!(
            "{} on {} obs: nll={:.4} iters={} converged={}",
            config.label(),
            returns.len(),
            opt.nll,
            opt.iterations,
            opt.converged
        );
        if !layout.is_feasible(config, &opt.params) {
            return Err(VolError::Convergence {
                iterations: opt.iterations,
                reason: format!("best parameters violate the model constraints: {:?}", opt.params),
            });
        }
        if !opt.converged {
            match mode {
                FitMode::Strict => {
                    return Err(VolError::Convergence {
                        iterations: opt.iterations,
                        reason: format!(
                            "tolerance {} not reached within {} iterations",
                            config.tolerance, config.max_iterations
                        ),
                    })
                }
                FitMode::BestEffort => warn!(
                    "{}: optimizer stopped after {} iterations without converging; keeping best parameters",
                    config.label(),
                    opt.iterations
                ),
            }
        }

        Ok(Self::from_params(config, layout, opt.params, returns, opt.converged, opt.iterations))
    }

    fn starting_point(config: &EngineConfig, returns: &[f64]) -> Vec<f64> {
        let mut theta = mean::starting_values(config.mean_model, returns);
        let resid = mean::residuals(config.mean_model, &theta, returns);
        theta.extend(garch::starting_values(
            config.volatility_model,
            config.arch_order,
            config.garch_order,
            mean_square(&resid),
        ));
        theta.extend(distribution::starting_values(config.error_distribution));
        theta
    }

    /// Residuals identically zero: variance pinned at the floor.
    fn degenerate(config: &EngineConfig, layout: ParamLayout, mut theta: Vec<f64>, returns: &[f64]) -> Self {
        let o = layout.mean;
        theta[o] = match config.volatility_model {
            VolatilityModel::Garch => MIN_VARIANCE,
            VolatilityModel::Egarch => MIN_VARIANCE.ln(),
        };
        for v in &mut theta[o + 1..o + 1 + layout.p + layout.q] {
            *v = 0.0;
        }
        Self::from_params(config, layout, theta, returns, true, 0)
    }

    fn from_params(
        config: &EngineConfig,
        layout: ParamLayout,
        params: Vec<f64>,
        returns: &[f64],
        converged: bool,
        iterations: u64,
    ) -> Self {
        let resid = mean::residuals(config.mean_model, layout.mean(&params), returns);
        let backcast = garch::backcast(&resid);
        let sigma2 = garch::conditional_variance(config.volatility_model, layout.vol(&params), &resid, backcast);
        let nll = distribution::negative_log_likelihood(
            config.error_distribution,
            layout.dist(&params),
            &resid,
            &sigma2,
        );
        Self {
            params,
            log_likelihood: -nll,
            converged,
            iterations,
            resid,
            sigma2,
            backcast,
        }
    }

    /// Variances for steps 1..=horizon from residual position `origin`.
    pub(crate) fn forecast(&self, config: &EngineConfig, origin: usize, horizon: usize) -> Vec<f64> {
        let layout = ParamLayout::of(config);
        let innovations = Innovations::new(config.error_distribution, layout.dist(&self.params));
        garch::forecast_variance(
            config.volatility_model,
            layout.vol(&self.params),
            &self.resid,
            &self.sigma2,
            self.backcast,
            origin,
            horizon,
            &innovations,
        )
    }
}

/// E[ε²] of the residuals, unclamped.
fn mean_square(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    x.iter().map(|e| e * e).sum::<f64>() / x.len() as f64
}

// ── Public model objects ──────────────────────────────────────────────────

/// An unfitted model: configuration bound to a return series.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    config: EngineConfig,
    returns: ReturnSeries,
}

impl ModelSpec {
    pub fn new(config: EngineConfig, returns: ReturnSeries) -> Result<Self> {
        config.validate()?;
        let needed = min_observations(&config);
        if returns.len() < needed {
            return Err(VolError::InvalidInput(format!(
                "{} needs at least {needed} returns, got {}",
                config.label(),
                returns.len()
            )));
        }
        Ok(Self { config, returns })
    }

    /// Shape-only spec over synthetic returns. Never fitted; used when a
    /// model is restored from disk without its data.
    pub fn placeholder(config: EngineConfig) -> Result<Self> {
        let n = min_observations(&config);
        let values: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let index = (1..=n).map(IndexKey::Position).collect();
        Self::new(config, ReturnSeries::new(index, values)?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn returns(&self) -> &ReturnSeries {
        &self.returns
    }

    pub fn param_names(&self) -> Vec<String> {
        param_names(&self.config)
    }

    /// Maximum-likelihood fit. `warm_start` seeds the optimizer with a
    /// previous parameter vector of the same layout.
    pub fn fit(&self, mode: FitMode, warm_start: Option<&[f64]>) -> Result<FittedModel> {
        let estimate = Estimate::fit(&self.config, self.returns.values(), mode, warm_start)?;
        let lags = mean::lags(self.config.mean_model);
        Ok(FittedModel {
            config: self.config.clone(),
            names: self.param_names(),
            index: self.returns.index()[lags..].to_vec(),
            estimate,
        })
    }
}

/// Variance forecasts for steps 1..=horizon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    origin: IndexKey,
    variances: Vec<f64>,
}

impl ForecastResult {
    pub fn origin(&self) -> IndexKey {
        self.origin
    }

    pub fn horizon(&self) -> usize {
        self.variances.len()
    }

    pub fn variances(&self) -> &[f64] {
        &self.variances
    }

    /// Variance `step` periods ahead (1-based).
    pub fn variance(&self, step: usize) -> Option<f64> {
        step.checked_sub(1).and_then(|i| self.variances.get(i)).copied()
    }

    pub fn volatility(&self) -> Vec<f64> {
        self.variances.iter().map(|v| v.sqrt()).collect()
    }
}

/// A fitted model. Immutable; refitting produces a new value.
#[derive(Debug, Clone)]
pub struct FittedModel {
    config: EngineConfig,
    names: Vec<String>,
    /// Keys of the residual observations (AR lags held out).
    index: Vec<IndexKey>,
    estimate: Estimate,
}

impl FittedModel {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parameter name → estimate.
    pub fn params(&self) -> BTreeMap<String, f64> {
        self.names
            .iter()
            .cloned()
            .zip(self.estimate.params.iter().copied())
            .collect()
    }

    pub fn param(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.estimate.params[i])
    }

    pub fn param_vector(&self) -> &[f64] {
        &self.estimate.params
    }

    pub fn log_likelihood(&self) -> f64 {
        self.estimate.log_likelihood
    }

    pub fn aic(&self) -> f64 {
        2.0 * self.names.len() as f64 - 2.0 * self.log_likelihood()
    }

    pub fn bic(&self) -> f64 {
        (self.nobs() as f64).ln() * self.names.len() as f64 - 2.0 * self.log_likelihood()
    }

    pub fn converged(&self) -> bool {
        self.estimate.converged
    }

    pub fn iterations(&self) -> u64 {
        self.estimate.iterations
    }

    /// Observations entering the likelihood.
    pub fn nobs(&self) -> usize {
        self.estimate.resid.len()
    }

    pub fn index(&self) -> &[IndexKey] {
        &self.index
    }

    pub fn residuals(&self) -> &[f64] {
        &self.estimate.resid
    }

    pub fn conditional_variance(&self) -> &[f64] {
        &self.estimate.sigma2
    }

    pub fn conditional_volatility(&self) -> Vec<f64> {
        self.estimate.sigma2.iter().map(|s| s.sqrt()).collect()
    }

    pub fn std_residuals(&self) -> Vec<f64> {
        self.estimate
            .resid
            .iter()
            .zip(&self.estimate.sigma2)
            .map(|(e, s2)| e / s2.sqrt())
            .collect()
    }

    /// Forecast `horizon` steps from `start` (default: last observation).
    pub fn forecast(&self, horizon: usize, start: Option<IndexKey>) -> Result<ForecastResult> {
        if horizon == 0 {
            return Err(VolError::InvalidInput("forecast horizon must be >= 1".into()));
        }
        let origin = match start {
            None => self.index.len() - 1,
            Some(key) => self.index.binary_search(&key).map_err(|_| {
                VolError::InvalidInput(format!("forecast origin {key} is not in the training sample"))
            })?,
        };
        Ok(ForecastResult {
            origin: self.index[origin],
            variances: self.estimate.forecast(&self.config, origin, horizon),
        })
    }
}
