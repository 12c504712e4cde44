//! engine.rs - VolatilityEngine: the public façade
//!
//! Owns the configuration, the most recent model spec and fit, and routes
//! every operation (train, forecast, rolling, evaluate, save/load) through
//! the model modules. The only mutable state is the cached spec/fit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::EngineConfig;
use crate::data::{self, IndexKey, PriceData, ReturnSeries};
use crate::error::{Result, VolError};
use crate::metrics::{self, EvaluationMetrics};
use crate::models::{FitMode, FittedModel, ForecastResult, ModelSpec};
use crate::persistence::PersistedModel;
use crate::rolling::{self, RollingControl, RollingForecastTable};

#[derive(Debug, Clone)]
pub struct VolatilityEngine {
    config: EngineConfig,
    spec: Option<ModelSpec>,
    fitted: Option<Arc<FittedModel>>,
    /// Point estimates restored by `load`; never a usable fit.
    loaded_params: Option<BTreeMap<String, f64>>,
}

impl VolatilityEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            spec: None,
            fitted: None,
            loaded_params: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn spec(&self) -> Option<&ModelSpec> {
        self.spec.as_ref()
    }

    /// Latest fit, if any.
    pub fn fitted(&self) -> Option<Arc<FittedModel>> {
        self.fitted.clone()
    }

    pub fn loaded_params(&self) -> Option<&BTreeMap<String, f64>> {
        self.loaded_params.as_ref()
    }

    pub fn prepare_returns(&self, data: &PriceData) -> Result<ReturnSeries> {
        data::prepare_returns(data)
    }

    /// Bind `returns` to the configuration; replaces any previous spec.
    pub fn build_model(&mut self, returns: ReturnSeries) -> Result<&ModelSpec> {
        let spec = ModelSpec::new(self.config.clone(), returns)?;
        Ok(&*self.spec.insert(spec))
    }

    /// Fit on `data`. With `update`, the optimizer starts from the previous
    /// fit (or from loaded parameters) instead of the default start point.
    pub fn train(&mut self, data: &PriceData, update: bool, mode: FitMode) -> Result<Arc<FittedModel>> {
        let returns = self.prepare_returns(data)?;
        let warm_start = if update { self.warm_start() } else { None };
        let n = returns.len();
        self.build_model(returns)?;

        let spec = self.spec.as_ref().ok_or(VolError::NotTrained)?;
        let started = Instant::now();
        let fit = Arc::new(spec.fit(mode, warm_start.as_deref())?);
        info!(
            "trained {} on {} returns in {:.2?}: loglik={:.3} aic={:.3} iters={} converged={}{}",
            self.config.label(),
            n,
            started.elapsed(),
            fit.log_likelihood(),
            fit.aic(),
            fit.iterations(),
            fit.converged(),
            if warm_start.is_some() { " (warm start)" } else { "" }
        );
        self.fitted = Some(Arc::clone(&fit));
        Ok(fit)
    }

    fn warm_start(&self) -> Option<Vec<f64>> {
        if let Some(fit) = &self.fitted {
            return Some(fit.param_vector().to_vec());
        }
        let loaded = self.loaded_params.as_ref()?;
        crate::models::param_names(&self.config)
            .iter()
            .map(|name| loaded.get(name).copied())
            .collect()
    }

    fn current_fit(&self) -> Result<&FittedModel> {
        self.fitted.as_deref().ok_or(VolError::NotTrained)
    }

    /// Forecast from the current fit. `horizon` defaults to the configured
    /// value, `start` to the last training observation.
    pub fn forecast(&self, horizon: Option<usize>, start: Option<IndexKey>) -> Result<ForecastResult> {
        let fit = self.current_fit()?;
        fit.forecast(horizon.unwrap_or(self.config.forecast_horizon), start)
    }

    pub fn rolling_forecast(&self, data: &PriceData, window: Option<usize>) -> Result<RollingForecastTable> {
        self.rolling_forecast_with(data, window, &RollingControl::default())
    }

    pub fn rolling_forecast_with(
        &self,
        data: &PriceData,
        window: Option<usize>,
        control: &RollingControl,
    ) -> Result<RollingForecastTable> {
        let returns = self.prepare_returns(data)?;
        let window = window.unwrap_or(self.config.rolling_window);
        rolling::rolling_forecast(&self.config, &returns, window, control)
    }

    /// Score the current fit's horizon-step volatility against the realized
    /// volatility of `test_data`.
    pub fn evaluate(&self, test_data: &PriceData) -> Result<EvaluationMetrics> {
        let fit = self.current_fit()?;
        let horizon = self.config.forecast_horizon;
        let returns = self.prepare_returns(test_data)?;
        let realized = metrics::realized_volatility(returns.values(), horizon);
        if realized.is_empty() {
            return Err(VolError::InvalidInput(format!(
                "{} test returns give no realized volatility at horizon {horizon}",
                returns.len()
            )));
        }

        let forecast = fit.forecast(horizon, None)?;
        let sigma = forecast.variance(horizon).map(f64::sqrt).unwrap_or_default();
        let m = metrics::compute_metrics(sigma, &realized)?;
        info!(
            "evaluated {} over {} realized values: rmse={:.4} mae={:.4}",
            self.config.label(),
            m.n_obs,
            m.rmse,
            m.mae
        );
        Ok(m)
    }

    /// Persist config and point estimates to `dir/garch_model.json`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let fit = self.current_fit()?;
        PersistedModel {
            config: self.config.clone(),
            params: fit.params(),
        }
        .write(dir)
    }

    /// Restore configuration and parameters. The result holds a placeholder
    /// spec and no fit: `forecast`, `evaluate` and `save` need a `train` first.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let persisted = PersistedModel::read(dir)?;
        let spec = ModelSpec::placeholder(persisted.config.clone())?;
        Ok(Self {
            config: persisted.config,
            spec: Some(spec),
            fitted: None,
            loaded_params: Some(persisted.params),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Distribution, MeanModel, VolatilityModel};
    use crate::data::PricePoint;
    use chrono::{DateTime, Duration};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    fn random_walk(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut price = 100.0;
        (0..n)
            .map(|_| {
                let z: f64 = rng.sample(StandardNormal);
                price *= 1.0 + 0.01 * z;
                price
            })
            .collect()
    }

    fn engine() -> VolatilityEngine {
        VolatilityEngine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn prepare_returns_matches_formula() {
        let r = engine().prepare_returns(&vec![100.0, 110.0, 99.0].into()).unwrap();
        assert_eq!(r.len(), 2);
        assert!((r.values()[0] - 10.0).abs() < 1e-9);
        assert!((r.values()[1] + 10.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = EngineConfig { forecast_horizon: 0, ..EngineConfig::default() };
        assert!(matches!(VolatilityEngine::new(cfg), Err(VolError::Config(_))));
    }

    #[test]
    fn forecast_before_train_is_not_trained() {
        let e = engine();
        assert!(matches!(e.forecast(None, None), Err(VolError::NotTrained)));
        assert!(matches!(
            e.evaluate(&vec![1.0, 2.0, 3.0].into()),
            Err(VolError::NotTrained)
        ));
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(e.save(dir.path()), Err(VolError::NotTrained)));
    }

    #[test]
    fn build_model_replaces_spec() {
        let mut e = engine();
        let a = e.prepare_returns(&random_walk(60, 1).into()).unwrap();
        let b = e.prepare_returns(&random_walk(90, 2).into()).unwrap();
        e.build_model(a).unwrap();
        assert_eq!(e.spec().unwrap().returns().len(), 59);
        e.build_model(b).unwrap();
        assert_eq!(e.spec().unwrap().returns().len(), 89);
    }

    #[test]
    fn build_model_rejects_tiny_series() {
        let mut e = engine();
        let r = e.prepare_returns(&vec![100.0, 101.0, 100.5].into()).unwrap();
        assert!(matches!(e.build_model(r), Err(VolError::InvalidInput(_))));
    }

    #[test]
    fn train_then_forecast_gives_horizon_variances() {
        let mut e = engine();
        e.train(&random_walk(300, 3).into(), false, FitMode::BestEffort).unwrap();
        for h in [1, 5, 10] {
            let fc = e.forecast(Some(h), None).unwrap();
            assert_eq!(fc.horizon(), h);
            assert!(fc.variances().iter().all(|&v| v >= 0.0 && v.is_finite()));
        }
        assert_eq!(e.forecast(None, None).unwrap().horizon(), 5);
    }

    #[test]
    fn update_warm_starts_from_previous_fit() {
        let mut e = engine();
        let prices = random_walk(400, 4);
        let first = e.train(&prices[..300].to_vec().into(), false, FitMode::BestEffort).unwrap();
        let second = e.train(&prices.clone().into(), true, FitMode::BestEffort).unwrap();
        assert_eq!(first.nobs(), 299);
        assert_eq!(second.nobs(), 399);
        assert_eq!(e.spec().unwrap().returns().len(), 399);
        assert!(Arc::ptr_eq(&e.fitted().unwrap(), &second));
    }

    #[test]
    fn forecast_from_timestamped_origin() {
        let t0 = DateTime::from_timestamp(1_704_067_200, 0).unwrap();
        let points: Vec<PricePoint> = random_walk(120, 5)
            .into_iter()
            .enumerate()
            .map(|(i, p)| PricePoint::new(t0 + Duration::days(i as i64), p))
            .collect();
        let mut e = engine();
        e.train(&points.into(), false, FitMode::BestEffort).unwrap();

        let anchor = IndexKey::Time(t0 + Duration::days(60));
        let fc = e.forecast(Some(3), Some(anchor)).unwrap();
        assert_eq!(fc.origin(), anchor);
        assert!(matches!(
            e.forecast(Some(3), Some(IndexKey::Time(t0 - Duration::days(1)))),
            Err(VolError::InvalidInput(_))
        ));
    }

    #[test]
    fn rolling_rows_follow_return_index() {
        let cfg = EngineConfig { max_iterations: 300, ..EngineConfig::default() };
        let e = VolatilityEngine::new(cfg).unwrap();
        let prices = random_walk(81, 6);
        let table = e.rolling_forecast(&prices.clone().into(), Some(50)).unwrap();
        let returns = e.prepare_returns(&prices.into()).unwrap();
        assert_eq!(table.len(), 81 - 1 - 50);
        assert_eq!(table.dates(), returns.index()[50..].to_vec());
        assert!(table.rows().iter().all(|r| r.volatility_1d.is_finite()));
    }

    #[test]
    fn rolling_window_longer_than_series_is_empty() {
        let e = engine();
        let table = e.rolling_forecast(&random_walk(100, 7).into(), None).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn save_and_load_round_trip_config() {
        let cfg = EngineConfig {
            mean_model: MeanModel::Ar(1),
            volatility_model: VolatilityModel::Egarch,
            error_distribution: Distribution::StudentsT,
            forecast_horizon: 3,
            rolling_window: 100,
            ..EngineConfig::default()
        };
        let mut e = VolatilityEngine::new(cfg.clone()).unwrap();
        let fit = e.train(&random_walk(250, 8).into(), false, FitMode::BestEffort).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = e.save(dir.path()).unwrap();
        assert!(path.exists());

        let loaded = VolatilityEngine::load(dir.path()).unwrap();
        assert_eq!(loaded.config(), &cfg);
        assert_eq!(loaded.loaded_params(), Some(&fit.params()));
        assert!(loaded.spec().is_some());
        assert!(matches!(loaded.forecast(None, None), Err(VolError::NotTrained)));
        assert!(matches!(loaded.save(dir.path()), Err(VolError::NotTrained)));
    }

    #[test]
    fn loaded_engine_retrains_with_warm_start() {
        let mut e = engine();
        e.train(&random_walk(200, 9).into(), false, FitMode::BestEffort).unwrap();
        let dir = tempfile::tempdir().unwrap();
        e.save(dir.path()).unwrap();

        let mut loaded = VolatilityEngine::load(dir.path()).unwrap();
        assert_eq!(loaded.warm_start().map(|w| w.len()), Some(4));
        loaded.train(&random_walk(200, 10).into(), true, FitMode::BestEffort).unwrap();
        assert!(loaded.forecast(None, None).is_ok());
    }

    #[test]
    fn load_missing_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            VolatilityEngine::load(dir.path()),
            Err(VolError::Persistence { .. })
        ));
    }

    #[test]
    fn evaluate_constant_prices_is_finite() {
        let mut e = engine();
        e.train(&vec![50.0; 100].into(), false, FitMode::Strict).unwrap();
        let m = e.evaluate(&vec![50.0; 40].into()).unwrap();
        assert!(m.mse.is_finite() && m.rmse.is_finite() && m.mae.is_finite());
        assert_eq!(m.n_obs, 39 - 5);
    }

    #[test]
    fn evaluate_without_realized_values_is_invalid() {
        let mut e = engine();
        e.train(&random_walk(150, 11).into(), false, FitMode::BestEffort).unwrap();
        assert!(matches!(
            e.evaluate(&vec![100.0, 101.0, 102.0].into()),
            Err(VolError::InvalidInput(_))
        ));
    }

    #[test]
    fn random_walk_train_forecast_evaluate() {
        let prices = random_walk(1000, 42);
        let (train, test) = prices.split_at(800);

        let mut e = engine();
        let fit = e.train(&train.into(), false, FitMode::BestEffort).unwrap();
        assert_eq!(fit.nobs(), 799);
        let omega = fit.param("omega").unwrap();
        let alpha = fit.param("alpha[1]").unwrap();
        let beta = fit.param("beta[1]").unwrap();
        assert!(omega > 0.0 && alpha >= 0.0 && beta >= 0.0 && alpha + beta < 1.0);

        let fc = e.forecast(Some(5), None).unwrap();
        assert_eq!(fc.horizon(), 5);
        // 1% daily moves: forecast vol should be near 1 (percent units).
        let vol = fc.volatility();
        assert!(vol.iter().all(|&v| v > 0.3 && v < 3.0), "{vol:?}");

        let m = e.evaluate(&test.into()).unwrap();
        assert_eq!(m.n_obs, 199 - 5);
        assert!(m.rmse >= 0.0 && m.rmse.is_finite());
        assert!((m.rmse * m.rmse - m.mse).abs() < 1e-9);
        assert!(m.mae <= m.rmse + 1e-12);
    }
}
