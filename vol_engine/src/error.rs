//! error.rs - Error taxonomy for the volatility engine

use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolError {
    /// Price data missing a usable column, non-positive prices, bad anchors,
    /// or a series too short for the configured model.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// `forecast`, `evaluate` or `save` called before `train`.
    #[error("model has not been trained")]
    NotTrained,

    #[error("optimizer did not converge after {iterations} iterations: {reason}")]
    Convergence { iterations: u64, reason: String },

    #[error("persistence error at {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    /// Rolling re-estimation stopped by its cancel token or deadline.
    /// Partial rows are discarded.
    #[error("rolling forecast cancelled: {0}")]
    Cancelled(String),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

impl VolError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        VolError::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VolError>;
