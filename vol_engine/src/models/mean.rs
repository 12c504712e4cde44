//! models/mean.rs - Conditional mean equation
//!
//!   Constant:  ε_t = r_t − μ
//!   Zero:      ε_t = r_t
//!   AR(k):     ε_t = r_t − c − Σ_{i=1..k} φ_i r_{t−i}      (t ≥ k)
//!
//! An AR(k) mean holds out its first k observations: they only feed lags,
//! so the residual series is k shorter than the return series.

use crate::config::MeanModel;

pub(crate) fn n_params(mean: MeanModel) -> usize {
    match mean {
        MeanModel::Constant => 1,
        MeanModel::Zero => 0,
        MeanModel::Ar(k) => k + 1,
    }
}

/// Observations consumed as lags before the first residual.
pub(crate) fn lags(mean: MeanModel) -> usize {
    match mean {
        MeanModel::Ar(k) => k,
        MeanModel::Constant | MeanModel::Zero => 0,
    }
}

pub(crate) fn names(mean: MeanModel) -> Vec<String> {
    match mean {
        MeanModel::Constant => vec!["mu".into()],
        MeanModel::Zero => vec![],
        MeanModel::Ar(k) => std::iter::once("const".to_string())
            .chain((1..=k).map(|i| format!("phi[{i}]")))
            .collect(),
    }
}

pub(crate) fn starting_values(mean: MeanModel, returns: &[f64]) -> Vec<f64> {
    let mu = if returns.is_empty() {
        0.0
    } else {
        returns.iter().sum::<f64>() / returns.len() as f64
    };
    match mean {
        MeanModel::Constant => vec![mu],
        MeanModel::Zero => vec![],
        MeanModel::Ar(k) => {
            let mut v = vec![mu];
            v.extend(std::iter::repeat(0.0).take(k));
            v
        }
    }
}

pub(crate) fn residuals(mean: MeanModel, params: &[f64], returns: &[f64]) -> Vec<f64> {
    match mean {
        MeanModel::Constant => returns.iter().map(|r| r - params[0]).collect(),
        MeanModel::Zero => returns.to_vec(),
        MeanModel::Ar(k) => (k..returns.len())
            .map(|t| {
                let fitted: f64 = params[0]
                    + params[1..]
                        .iter()
                        .enumerate()
                        .map(|(i, phi)| phi * returns[t - i - 1])
                        .sum::<f64>();
                returns[t] - fitted
            })
            .collect(),
    }
}
