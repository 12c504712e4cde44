//! models/distribution.rs - Innovation densities
//!
//! ─────────────────────────────────────────────────────────────────────────
//! MATHEMATICAL SPECIFICATION
//! ─────────────────────────────────────────────────────────────────────────
//!
//! Standardized innovations z_t = ε_t / σ_t with E[z] = 0, Var[z] = 1.
//!
//! Normal:
//!   ℓ_t = −½ [ ln 2π + ln σ²_t + ε²_t / σ²_t ]
//!
//! Student-t (ν > 2), rescaled to unit variance:
//!   c   = ln Γ((ν+1)/2) − ln Γ(ν/2) − ½ ln(π(ν−2))
//!   ℓ_t = c − ½ ln σ²_t − (ν+1)/2 · ln(1 + ε²_t / (σ²_t (ν−2)))
//!
//! Hansen skew-t (ν > 2, −1 < λ < 1):
//!   a   = 4λ e^c (ν−2)/(ν−1)
//!   b   = √(1 + 3λ² − a²)
//!   ℓ_t = ln b + c − ½ ln σ²_t
//!         − (ν+1)/2 · ln(1 + ((b z_t + a)/(1 + sgn(z_t + a/b) λ))² / (ν−2))
//!
//! Sampling (Monte-Carlo forecasts) uses the exact standardized draws:
//! N(0,1), t_ν·√((ν−2)/ν), and the Hansen quantile function for skew-t.
//! ─────────────────────────────────────────────────────────────────────────

use rand::Rng;
use rand_distr::{StandardNormal, StudentT};
use statrs::distribution::{ContinuousCDF, StudentsT as StudentsTDist};
use statrs::function::gamma::ln_gamma;

use crate::config::Distribution;

const LN_2PI: f64 = 1.837_877_066_409_345_3;
pub(crate) const NU_MIN: f64 = 2.05;
pub(crate) const NU_MAX: f64 = 500.0;
pub(crate) const LAMBDA_BOUND: f64 = 0.995;

pub(crate) fn n_params(dist: Distribution) -> usize {
    match dist {
        Distribution::Normal => 0,
        Distribution::StudentsT => 1,
        Distribution::SkewStudent => 2,
    }
}

pub(crate) fn names(dist: Distribution) -> Vec<String> {
    match dist {
        Distribution::Normal => vec![],
        Distribution::StudentsT => vec!["nu".into()],
        Distribution::SkewStudent => vec!["nu".into(), "lambda".into()],
    }
}

pub(crate) fn starting_values(dist: Distribution) -> Vec<f64> {
    match dist {
        Distribution::Normal => vec![],
        Distribution::StudentsT => vec![8.0],
        Distribution::SkewStudent => vec![8.0, 0.0],
    }
}

pub(crate) fn is_valid(dist: Distribution, params: &[f64]) -> bool {
    let nu_ok = |nu: f64| nu > NU_MIN && nu < NU_MAX;
    match dist {
        Distribution::Normal => true,
        Distribution::StudentsT => nu_ok(params[0]),
        Distribution::SkewStudent => nu_ok(params[0]) && params[1].abs() < LAMBDA_BOUND,
    }
}

fn t_constant(nu: f64) -> f64 {
    ln_gamma((nu + 1.0) / 2.0) - ln_gamma(nu / 2.0) - 0.5 * (std::f64::consts::PI * (nu - 2.0)).ln()
}

/// Σ −ℓ_t over the sample. `params` must already satisfy `is_valid`.
pub(crate) fn negative_log_likelihood(
    dist: Distribution,
    params: &[f64],
    resid: &[f64],
    sigma2: &[f64],
) -> f64 {
    let pairs = resid.iter().zip(sigma2.iter());
    match dist {
        Distribution::Normal => pairs
            .map(|(e, s2)| 0.5 * (LN_2PI + s2.ln() + e * e / s2))
            .sum(),
        Distribution::StudentsT => {
            let nu = params[0];
            let c = t_constant(nu);
            pairs
                .map(|(e, s2)| {
                    let ll = c - 0.5 * s2.ln() - 0.5 * (nu + 1.0) * (1.0 + e * e / (s2 * (nu - 2.0))).ln();
                    -ll
                })
                .sum()
        }
        Distribution::SkewStudent => {
            let (nu, lambda) = (params[0], params[1]);
            let c = t_constant(nu);
            let a = 4.0 * lambda * c.exp() * (nu - 2.0) / (nu - 1.0);
            let b = (1.0 + 3.0 * lambda * lambda - a * a).sqrt();
            pairs
                .map(|(e, s2)| {
                    let z = e / s2.sqrt();
                    let skew = 1.0 + (z + a / b).signum() * lambda;
                    let u = (b * z + a) / skew;
                    let ll = b.ln() + c - 0.5 * s2.ln()
                        - 0.5 * (nu + 1.0) * (1.0 + u * u / (nu - 2.0)).ln();
                    -ll
                })
                .sum()
        }
    }
}

/// Sampler for standardized innovations of a fitted distribution.
#[derive(Debug, Clone)]
pub(crate) enum Innovations {
    Normal,
    StudentsT { nu: f64, draw: StudentT<f64> },
    SkewStudent { nu: f64, lambda: f64, t: StudentsTDist },
}

impl Innovations {
    pub(crate) fn new(dist: Distribution, params: &[f64]) -> Self {
        match dist {
            Distribution::Normal => Innovations::Normal,
            Distribution::StudentsT => {
                let nu = params[0];
                match StudentT::new(nu) {
                    Ok(draw) => Innovations::StudentsT { nu, draw },
                    Err(_) => Innovations::Normal,
                }
            }
            Distribution::SkewStudent => {
                let (nu, lambda) = (params[0], params[1]);
                match StudentsTDist::new(0.0, 1.0, nu) {
                    Ok(t) => Innovations::SkewStudent { nu, lambda, t },
                    Err(_) => Innovations::Normal,
                }
            }
        }
    }

    /// One draw with mean 0 and variance 1.
    pub(crate) fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match self {
            Innovations::Normal => rng.sample(StandardNormal),
            Innovations::StudentsT { nu, draw } => rng.sample(draw) * ((nu - 2.0) / nu).sqrt(),
            Innovations::SkewStudent { nu, lambda, t } => {
                let u: f64 = rng.gen_range(1e-12..1.0 - 1e-12);
                skewt_quantile(u, *nu, *lambda, t)
            }
        }
    }
}

/// Hansen skew-t quantile function.
fn skewt_quantile(q: f64, nu: f64, lambda: f64, t: &StudentsTDist) -> f64 {
    let c = t_constant(nu);
    let a = 4.0 * lambda * c.exp() * (nu - 2.0) / (nu - 1.0);
    let b = (1.0 + 3.0 * lambda * lambda - a * a).sqrt();
    let split = (1.0 - lambda) / 2.0;
    let raw = if q < split {
        t.inverse_cdf(q / (1.0 - lambda))
    } else {
        t.inverse_cdf(0.5 + (q - split) / (1.0 + lambda))
    };
    (raw * (1.0 + (q - split).signum() * lambda) * (1.0 - 2.0 / nu).sqrt() - a) / b
}
