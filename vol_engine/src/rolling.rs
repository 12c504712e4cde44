//! rolling.rs - Rolling-window re-estimation
//!
//! For each i in window..N a fresh model is fitted on returns[i-window..i]
//! only (no look-ahead), then forecast `horizon` steps from the last
//! in-window observation. The row is keyed by returns.index[i], the first
//! observation the forecast is about.
//!
//! The window must hold at least `models::min_observations` returns
//! (max(10, 2 × parameter count) + AR lags; 10 for GARCH(1,1)-normal).
//! A shorter window is `InvalidInput` for the whole run, not a short table;
//! only a series no longer than the window yields an empty table.
//!
//!   ┌──────────────────────────────────────────────────────┐
//!   │  ReturnSeries (shared, read-only)                    │
//!   │        │                                             │
//!   │   par_iter over i ∈ [window, N)                      │
//!   │        │                                             │
//!   │   ┌────┴──────────────────────────────┐              │
//!   │   │  check cancel / deadline           │              │
//!   │   │  Estimate::fit(slice, BestEffort)  │              │
//!   │   │  forecast(horizon) → σ_1, σ_5      │              │
//!   │   └───────────────────────────────────┘              │
//!   │        │                                             │
//!   │   collect Result<Vec<Row>>, sort by date             │
//!   └──────────────────────────────────────────────────────┘

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::data::{IndexKey, ReturnSeries};
use crate::error::{Result, VolError};
use crate::models::{min_observations, Estimate, FitMode};

/// Cooperative cancellation flag shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Run-time controls for a rolling computation.
#[derive(Debug, Clone, Default)]
pub struct RollingControl {
    pub cancel: Option<CancelToken>,
    /// Checked before each slice fit.
    pub deadline: Option<Instant>,
    /// Fit slices one after another on the calling thread.
    pub sequential: bool,
}

impl RollingControl {
    fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(VolError::Cancelled("cancel token set".into()));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(VolError::Cancelled("deadline exceeded".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingRow {
    pub date: IndexKey,
    pub volatility_1d: f64,
    /// `None` when the forecast horizon is shorter than 5 steps.
    pub volatility_5d: Option<f64>,
    pub converged: bool,
}

/// Chronological rolling forecasts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RollingForecastTable {
    rows: Vec<RollingRow>,
}

impl RollingForecastTable {
    pub fn rows(&self) -> &[RollingRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> Vec<IndexKey> {
        self.rows.iter().map(|r| r.date).collect()
    }

    /// Rows as a frame: date (string), volatility_1d, volatility_5d, converged.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let dates: Vec<String> = self.rows.iter().map(|r| r.date.to_string()).collect();
        let vol_1d: Vec<f64> = self.rows.iter().map(|r| r.volatility_1d).collect();
        let vol_5d: Vec<Option<f64>> = self.rows.iter().map(|r| r.volatility_5d).collect();
        let converged: Vec<bool> = self.rows.iter().map(|r| r.converged).collect();
        Ok(df!(
            "date" => dates,
            "volatility_1d" => vol_1d,
            "volatility_5d" => vol_5d,
            "converged" => converged
        )?)
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path).map_err(|e| VolError::persistence(path, e))?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
        info!("rolling forecasts ({} rows) → {}", self.rows.len(), path.display());
        Ok(())
    }
}

/// Fit one model per trailing window and forecast from its end.
pub fn rolling_forecast(
    config: &EngineConfig,
    returns: &ReturnSeries,
    window: usize,
    control: &RollingControl,
) -> Result<RollingForecastTable> {
    if window == 0 {
        return Err(VolError::InvalidInput("rolling window must be >= 1".into()));
    }
    let n = returns.len();
    if n <= window {
        info!("rolling: {} returns ≤ window {}, no rows", n, window);
        return Ok(RollingForecastTable::default());
    }

    let needed = min_observations(config);
    if window < needed {
        return Err(VolError::InvalidInput(format!(
            "rolling window {window} is shorter than the {needed} returns {} needs",
            config.label()
        )));
    }

    let started = Instant::now();
    info!(
        "rolling {}: {} slices of {} obs (horizon {}, {})",
        config.label(),
        n - window,
        window,
        config.forecast_horizon,
        if control.sequential { "sequential" } else { "parallel" }
    );

    let fit_slice = |i: usize| -> Result<RollingRow> {
        control.check()?;
        let slice = &returns.values()[i - window..i];
        let est = Estimate::fit(config, slice, FitMode::BestEffort, None)?;
        let origin = est.resid.len() - 1;
        let vols: Vec<f64> = est
            .forecast(config, origin, config.forecast_horizon)
            .into_iter()
            .map(f64::sqrt)
            .collect();
        let row = RollingRow {
            date: returns.index()[i],
            volatility_1d: vols[0],
            volatility_5d: vols.get(4).copied(),
            converged: est.converged,
        };
        debug!(
            "slice @ {}: σ₁={:.4} iters={} converged={}",
            row.date, row.volatility_1d, est.iterations, row.converged
        );
        Ok(row)
    };

    let mut rows: Vec<RollingRow> = if control.sequential {
        (window..n).map(fit_slice).collect::<Result<_>>()?
    } else {
        (window..n).into_par_iter().map(fit_slice).collect::<Result<_>>()?
    };
    rows.sort_by(|a, b| a.date.cmp(&b.date));

    let unconverged = rows.iter().filter(|r| !r.converged).count();
    info!(
        "rolling done: {} rows in {:.2?} ({} slices hit the iteration cap)",
        rows.len(),
        started.elapsed(),
        unconverged
    );
    Ok(RollingForecastTable { rows })
}
