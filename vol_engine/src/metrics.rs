//! metrics.rs - Forecast evaluation against realized volatility
//!
//! ─────────────────────────────────────────────────────────────────────────
//! MATHEMATICAL SPECIFICATION
//! ─────────────────────────────────────────────────────────────────────────
//!
//! REALIZED VOLATILITY (forward-looking, horizon h)
//!   realized_t = std(r_{t+1}, …, r_{t+h})        (sample std, ddof = 1)
//!
//!   The trailing rolling std over h returns, shifted back by h, so each
//!   value lines up with the forecast origin it would be judged against.
//!   The last h positions have no complete future window and are dropped.
//!   Needs h ≥ 2 (a single return has no sample std).
//!
//! ERROR METRICS (forecast σ̂ broadcast against every realized value)
//!   MSE  = mean((σ̂ − realized_t)²)
//!   RMSE = √MSE
//!   MAE  = mean(|σ̂ − realized_t|)
//! ─────────────────────────────────────────────────────────────────────────

use serde::Serialize;

use crate::error::{Result, VolError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Realized values compared.
    pub n_obs: usize,
    /// The h-step forecast volatility broadcast against them.
    pub forecast_volatility: f64,
}

impl std::fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "════════════════════════════════════════════")?;
        writeln!(f, "  VOLATILITY FORECAST EVALUATION")?;
        writeln!(f, "════════════════════════════════════════════")?;
        writeln!(f, "  Observations   : {}", self.n_obs)?;
        writeln!(f, "  Forecast σ     : {:.4}%", self.forecast_volatility)?;
        writeln!(f, "  MSE            : {:.6}", self.mse)?;
        writeln!(f, "  RMSE           : {:.6}", self.rmse)?;
        writeln!(f, "  MAE            : {:.6}", self.mae)?;
        writeln!(f, "════════════════════════════════════════════")
    }
}

/// realized[t] = std(returns[t+1..=t+h]) for t in 0..len-h.
pub fn realized_volatility(returns: &[f64], horizon: usize) -> Vec<f64> {
    if horizon < 2 || returns.len() <= horizon {
        return Vec::new();
    }
    (0..returns.len() - horizon)
        .map(|t| std_dev(&returns[t + 1..=t + horizon]))
        .collect()
}

/// Score one forecast volatility against a realized series.
pub fn compute_metrics(forecast_volatility: f64, realized: &[f64]) -> Result<EvaluationMetrics> {
    if realized.is_empty() {
        return Err(VolError::InvalidInput(
            "no realized volatility to evaluate against".into(),
        ));
    }
    let errors: Vec<f64> = realized.iter().map(|r| forecast_volatility - r).collect();
    let mse = mean(&errors.iter().map(|e| e * e).collect::<Vec<_>>()).unwrap_or(0.0);
    let mae = mean(&errors.iter().map(|e| e.abs()).collect::<Vec<_>>()).unwrap_or(0.0);

    Ok(EvaluationMetrics {
        mse,
        rmse: mse.sqrt(),
        mae,
        n_obs: realized.len(),
        forecast_volatility,
    })
}

// ── Statistical helpers ───────────────────────────────────────────────────

fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = data.iter().sum::<f64>() / data.len() as f64;
    let var = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    var.sqrt()
}
