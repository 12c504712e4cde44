//! config.rs - Engine configuration
//!
//! One immutable record describes the model family (mean equation, variance
//! equation, innovation distribution), the forecast horizon, the rolling
//! window and the optimizer budget. `Default` carries the standard
//! GARCH(1,1)-normal setup; `from_env` overlays `VOL_*` variables (after
//! `.env`) the same way every other knob in the workspace is loaded.

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VolError};

pub const DEFAULT_ARCH_ORDER: usize = 1;
pub const DEFAULT_GARCH_ORDER: usize = 1;
pub const DEFAULT_FORECAST_HORIZON: usize = 5;
/// One trading year of daily bars.
pub const DEFAULT_ROLLING_WINDOW: usize = 252;
pub const DEFAULT_MAX_ITERATIONS: u64 = 5_000;
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Conditional mean equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeanModel {
    /// r_t = μ + ε_t
    Constant,
    /// r_t = ε_t
    Zero,
    /// r_t = c + Σ φ_i r_{t-i} + ε_t
    #[serde(rename = "AR")]
    Ar(usize),
}

/// Conditional variance equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityModel {
    #[serde(rename = "GARCH")]
    Garch,
    #[serde(rename = "EGARCH")]
    Egarch,
}

/// Distribution of the standardized innovations z_t = ε_t / σ_t.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribution {
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "t")]
    StudentsT,
    /// Hansen (1994) skewed Student-t.
    #[serde(rename = "skewt")]
    SkewStudent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// p: number of lagged squared-residual (ARCH) terms
    pub arch_order: usize,
    /// q: number of lagged conditional-variance (GARCH) terms
    pub garch_order: usize,
    pub mean_model: MeanModel,
    pub volatility_model: VolatilityModel,
    pub error_distribution: Distribution,
    /// Steps ahead produced by `forecast`
    pub forecast_horizon: usize,
    /// Trailing observations used for every rolling re-estimation
    pub rolling_window: usize,
    /// Nelder-Mead iteration cap
    pub max_iterations: u64,
    /// Nelder-Mead stops once the simplex cost std-dev falls below this
    pub tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arch_order: DEFAULT_ARCH_ORDER,
            garch_order: DEFAULT_GARCH_ORDER,
            mean_model: MeanModel::Constant,
            volatility_model: VolatilityModel::Garch,
            error_distribution: Distribution::Normal,
            forecast_horizon: DEFAULT_FORECAST_HORIZON,
            rolling_window: DEFAULT_ROLLING_WINDOW,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables (after dotenv).
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // ignore missing .env

        let d = Self::default();
        let cfg = Self {
            arch_order: parse_env("VOL_ARCH_ORDER", d.arch_order)?,
            garch_order: parse_env("VOL_GARCH_ORDER", d.garch_order)?,
            mean_model: parse_env("VOL_MEAN_MODEL", d.mean_model)?,
            volatility_model: parse_env("VOL_MODEL", d.volatility_model)?,
            error_distribution: parse_env("VOL_DISTRIBUTION", d.error_distribution)?,
            forecast_horizon: parse_env("VOL_FORECAST_HORIZON", d.forecast_horizon)?,
            rolling_window: parse_env("VOL_ROLLING_WINDOW", d.rolling_window)?,
            max_iterations: parse_env("VOL_MAX_ITERATIONS", d.max_iterations)?,
            tolerance: parse_env("VOL_TOLERANCE", d.tolerance)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.forecast_horizon == 0 {
            return Err(VolError::Config("forecast_horizon must be >= 1".into()));
        }
        if self.rolling_window == 0 {
            return Err(VolError::Config("rolling_window must be >= 1".into()));
        }
        if self.mean_model == MeanModel::Ar(0) {
            return Err(VolError::Config("AR mean model needs at least one lag".into()));
        }
        if self.max_iterations == 0 {
            return Err(VolError::Config("max_iterations must be >= 1".into()));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(VolError::Config(format!(
                "tolerance must be a positive number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Short label, e.g. `GARCH(1,1)-normal` or `AR(2)-EGARCH(1,1)-skewt`.
    pub fn label(&self) -> String {
        let mean = match self.mean_model {
            MeanModel::Constant | MeanModel::Zero => String::new(),
            MeanModel::Ar(k) => format!("AR({k})-"),
        };
        format!(
            "{mean}{}({},{})-{}",
            self.volatility_model, self.arch_order, self.garch_order, self.error_distribution
        )
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| VolError::Config(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}

// ── Text forms (env vars, CLI flags) ──────────────────────────────────────

impl FromStr for MeanModel {
    type Err = String;

    /// Accepts `constant`, `zero`, `ar` (one lag), `ar:k` or `ar(k)`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "constant" | "const" => return Ok(MeanModel::Constant),
            "zero" => return Ok(MeanModel::Zero),
            "ar" => return Ok(MeanModel::Ar(1)),
            _ => {}
        }
        let lags = lower
            .strip_prefix("ar:")
            .or_else(|| lower.strip_prefix("ar(").and_then(|r| r.strip_suffix(')')))
            .ok_or_else(|| format!("unknown mean model '{s}'"))?;
        let k = lags
            .parse::<usize>()
            .map_err(|e| format!("bad AR lag count in '{s}': {e}"))?;
        Ok(MeanModel::Ar(k))
    }
}

impl fmt::Display for MeanModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeanModel::Constant => write!(f, "Constant"),
            MeanModel::Zero => write!(f, "Zero"),
            MeanModel::Ar(k) => write!(f, "AR({k})"),
        }
    }
}

impl FromStr for VolatilityModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "garch" => Ok(VolatilityModel::Garch),
            "egarch" => Ok(VolatilityModel::Egarch),
            _ => Err(format!("unknown volatility model '{s}'")),
        }
    }
}

impl fmt::Display for VolatilityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityModel::Garch => write!(f, "GARCH"),
            VolatilityModel::Egarch => write!(f, "EGARCH"),
        }
    }
}

impl FromStr for Distribution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "gaussian" => Ok(Distribution::Normal),
            "t" | "studentst" | "student-t" => Ok(Distribution::StudentsT),
            "skewt" | "skewstudent" | "skew-t" => Ok(Distribution::SkewStudent),
            _ => Err(format!("unknown error distribution '{s}'")),
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Normal => write!(f, "normal"),
            Distribution::StudentsT => write!(f, "t"),
            Distribution::SkewStudent => write!(f, "skewt"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_garch11_normal() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.arch_order, 1);
        assert_eq!(cfg.garch_order, 1);
        assert_eq!(cfg.mean_model, MeanModel::Constant);
        assert_eq!(cfg.volatility_model, VolatilityModel::Garch);
        assert_eq!(cfg.error_distribution, Distribution::Normal);
        assert_eq!(cfg.forecast_horizon, 5);
        assert_eq!(cfg.rolling_window, 252);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.label(), "GARCH(1,1)-normal");
    }

    #[test]
    fn mean_model_parses_lag_forms() {
        assert_eq!("ar".parse::<MeanModel>().unwrap(), MeanModel::Ar(1));
        assert_eq!("AR:3".parse::<MeanModel>().unwrap(), MeanModel::Ar(3));
        assert_eq!("ar(2)".parse::<MeanModel>().unwrap(), MeanModel::Ar(2));
        assert_eq!("Zero".parse::<MeanModel>().unwrap(), MeanModel::Zero);
        assert!("ar:x".parse::<MeanModel>().is_err());
        assert!("arma".parse::<MeanModel>().is_err());
    }

    #[test]
    fn validate_rejects_zero_horizon_and_window() {
        let cfg = EngineConfig { forecast_horizon: 0, ..EngineConfig::default() };
        assert!(matches!(cfg.validate(), Err(VolError::Config(_))));

        let cfg = EngineConfig { rolling_window: 0, ..EngineConfig::default() };
        assert!(matches!(cfg.validate(), Err(VolError::Config(_))));

        let cfg = EngineConfig { mean_model: MeanModel::Ar(0), ..EngineConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn serde_names_are_stable() {
        let cfg = EngineConfig {
            mean_model: MeanModel::Ar(2),
            volatility_model: VolatilityModel::Egarch,
            error_distribution: Distribution::SkewStudent,
            ..EngineConfig::default()
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["mean_model"], serde_json::json!({ "AR": 2 }));
        assert_eq!(json["volatility_model"], "EGARCH");
        assert_eq!(json["error_distribution"], "skewt");
        let back: EngineConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
        assert_eq!(back.label(), "AR(2)-EGARCH(1,1)-skewt");
    }
}
