pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod persistence;
pub mod rolling;

pub use config::{Distribution, EngineConfig, MeanModel, VolatilityModel};
pub use data::{prepare_returns, IndexKey, PriceData, PricePoint, ReturnSeries};
pub use engine::VolatilityEngine;
pub use error::{Result, VolError};
pub use metrics::EvaluationMetrics;
pub use models::{FitMode, FittedModel, ForecastResult, ModelSpec};
pub use persistence::PersistedModel;
pub use rolling::{CancelToken, RollingControl, RollingForecastTable, RollingRow};
