//! models/garch.rs - GARCH(p,q) and EGARCH(p,q) conditional variance
//!
//! ─────────────────────────────────────────────────────────────────────────
//! MATHEMATICAL SPECIFICATION
//! ─────────────────────────────────────────────────────────────────────────
//!
//! GARCH(p,q): Bollerslev (1986)
//!
//!   Return innovation:  ε_t = r_t − E[r_t | F_{t-1}]   (see mean.rs)
//!   Conditional variance update:
//!
//! ```text
//!       σ²_t = ω  +  Σ_{i=1..p} α_i · ε²_{t-i}  +  Σ_{j=1..q} β_j · σ²_{t-j}
//! ```
//!
//!   Constraints (positivity + covariance stationarity):
//!     ω > 0,  α_i ≥ 0,  β_j ≥ 0,  Σα + Σβ < 1
//!
//!   Long-run (unconditional) variance:
//!       σ²_∞ = ω / (1 − Σα − Σβ)
//!
//!   Multi-step forecast: run the recursion forward with every future
//!   ε²_{t+k} replaced by its conditional expectation σ²_{t+k}. For
//!   GARCH(1,1) this collapses to
//!       σ²_{t+h} = σ²_∞ + (α+β)^(h-1) · (σ²_{t+1} − σ²_∞)
//!
//! EGARCH(p,q): Nelson (1991), symmetric form
//!
//! ```text
//!       ln σ²_t = ω + Σ α_i (|z_{t-i}| − √(2/π)) + Σ β_j ln σ²_{t-j}
//! ```
//!
//!   Constraint: |Σβ| < 1.
//!   The 1-step forecast is exact; for h ≥ 2 the expectation of exp(·) has
//!   no closed form, so σ²_{t+h} is the mean over seeded simulated paths.
//!
//! Pre-sample values (t < 0) use the backcast σ̄² = mean(ε²) for both ε² and
//! σ², and a zero news term for EGARCH.
//! ─────────────────────────────────────────────────────────────────────────

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::distribution::Innovations;
use crate::config::VolatilityModel;

/// Variance floor; keeps ln σ² and ε²/σ² finite on flat data.
pub const MIN_VARIANCE: f64 = 1e-12;
pub const MAX_VARIANCE: f64 = 1e12;
/// E|z| for a standard normal.
const SQRT_2_OVER_PI: f64 = 0.797_884_560_802_865_4;
/// Paths averaged for EGARCH multi-step forecasts.
pub const SIMULATIONS: usize = 1_000;
pub const SIMULATION_SEED: u64 = 0x5EED_0F_CA57;

/// Variance-equation coefficients borrowed out of a parameter vector.
#[derive(Debug, Clone, Copy)]
pub struct VolParams<'a> {
    /// ω: intercept (GARCH: variance units, EGARCH: log-variance units)
    pub omega: f64,
    /// α_1..α_p: ARCH (shock) coefficients
    pub alpha: &'a [f64],
    /// β_1..β_q: GARCH (persistence) coefficients
    pub beta: &'a [f64],
}

impl<'a> VolParams<'a> {
    /// Σα + Σβ
    pub fn persistence(&self) -> f64 {
        self.alpha.iter().sum::<f64>() + self.beta.iter().sum::<f64>()
    }

    /// σ²_∞ = ω / (1 − Σα − Σβ); `None` when the process is not stationary.
    pub fn long_run_variance(&self) -> Option<f64> {
        let p = self.persistence();
        (p < 1.0).then(|| self.omega / (1.0 - p))
    }

    pub(crate) fn is_valid(&self, model: VolatilityModel) -> bool {
        let finite = self.omega.is_finite()
            && self.alpha.iter().all(|a| a.is_finite())
            && self.beta.iter().all(|b| b.is_finite());
        if !finite {
            return false;
        }
        match model {
            VolatilityModel::Garch => {
                self.omega > 0.0
                    && self.alpha.iter().all(|&a| a >= 0.0)
                    && self.beta.iter().all(|&b| b >= 0.0)
                    && self.persistence() < 1.0
            }
            VolatilityModel::Egarch => self.beta.iter().sum::<f64>().abs() < 1.0,
        }
    }
}

pub(crate) fn names(p: usize, q: usize) -> Vec<String> {
    std::iter::once("omega".to_string())
        .chain((1..=p).map(|i| format!("alpha[{i}]")))
        .chain((1..=q).map(|j| format!("beta[{j}]")))
        .collect()
}

/// Starting point for the optimizer: [ω, α.., β..].
pub(crate) fn starting_values(model: VolatilityModel, p: usize, q: usize, variance: f64) -> Vec<f64> {
    let variance = variance.max(MIN_VARIANCE);
    let (a_total, b_total) = match (model, p > 0, q > 0) {
        (VolatilityModel::Garch, true, true) => (0.05, 0.90),
        (VolatilityModel::Garch, true, false) => (0.20, 0.0),
        (VolatilityModel::Garch, false, true) => (0.0, 0.50),
        (VolatilityModel::Egarch, _, _) => (
            if p > 0 { 0.10 } else { 0.0 },
            if q > 0 { 0.95 } else { 0.0 },
        ),
        (_, false, false) => (0.0, 0.0),
    };
    let omega = match model {
        VolatilityModel::Garch => variance * (1.0 - a_total - b_total),
        VolatilityModel::Egarch => variance.ln() * (1.0 - b_total),
    };

    let mut v = Vec::with_capacity(1 + p + q);
    v.push(omega);
    v.extend(std::iter::repeat(a_total / p.max(1) as f64).take(p));
    v.extend(std::iter::repeat(b_total / q.max(1) as f64).take(q));
    v
}

/// σ̄² = mean(ε²), clamped to the variance bounds.
pub(crate) fn backcast(resid: &[f64]) -> f64 {
    if resid.is_empty() {
        return MIN_VARIANCE;
    }
    let m = resid.iter().map(|e| e * e).sum::<f64>() / resid.len() as f64;
    m.clamp(MIN_VARIANCE, MAX_VARIANCE)
}

/// Run the variance recursion over a residual series, return all σ²_t.
pub(crate) fn conditional_variance(
    model: VolatilityModel,
    vp: VolParams<'_>,
    resid: &[f64],
    backcast: f64,
) -> Vec<f64> {
    let n = resid.len();
    let mut sigma2 = Vec::with_capacity(n);

    match model {
        VolatilityModel::Garch => {
            for t in 0..n {
                let mut s = vp.omega;
                for (i, a) in vp.alpha.iter().enumerate() {
                    s += a * if t > i { resid[t - i - 1].powi(2) } else { backcast };
                }
                for (j, b) in vp.beta.iter().enumerate() {
                    s += b * if t > j { sigma2[t - j - 1] } else { backcast };
                }
                sigma2.push(s.clamp(MIN_VARIANCE, MAX_VARIANCE));
            }
        }
        VolatilityModel::Egarch => {
            let (lo, hi) = (MIN_VARIANCE.ln(), MAX_VARIANCE.ln());
            let mut ln_s2: Vec<f64> = Vec::with_capacity(n);
            for t in 0..n {
                let mut l = vp.omega;
                for (i, a) in vp.alpha.iter().enumerate() {
                    if t > i {
                        let k = t - i - 1;
                        l += a * (resid[k].abs() / sigma2[k].sqrt() - SQRT_2_OVER_PI);
                    }
                }
                for (j, b) in vp.beta.iter().enumerate() {
                    l += b * if t > j { ln_s2[t - j - 1] } else { backcast.ln() };
                }
                let l = l.clamp(lo, hi);
                ln_s2.push(l);
                sigma2.push(l.exp());
            }
        }
    }
    sigma2
}

/// Variance forecasts for steps 1..=horizon from information up to and
/// including observation `origin`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn forecast_variance(
    model: VolatilityModel,
    vp: VolParams<'_>,
    resid: &[f64],
    sigma2: &[f64],
    backcast: f64,
    origin: usize,
    horizon: usize,
    innovations: &Innovations,
) -> Vec<f64> {
    match model {
        VolatilityModel::Garch => garch_forecast(vp, resid, sigma2, backcast, origin, horizon),
        VolatilityModel::Egarch => {
            egarch_forecast(vp, resid, sigma2, backcast, origin, horizon, innovations)
        }
    }
}

fn garch_forecast(
    vp: VolParams<'_>,
    resid: &[f64],
    sigma2: &[f64],
    backcast: f64,
    origin: usize,
    horizon: usize,
) -> Vec<f64> {
    let o = origin as isize;
    let past_e2 = |t: isize| if t < 0 { backcast } else { resid[t as usize].powi(2) };
    let past_s2 = |t: isize| if t < 0 { backcast } else { sigma2[t as usize] };

    let mut fut: Vec<f64> = Vec::with_capacity(horizon);
    for k in 1..=horizon as isize {
        let t = o + k;
        let mut s = vp.omega;
        for (i, a) in vp.alpha.iter().enumerate() {
            let lag = t - i as isize - 1;
            // E[ε²_{t+k}] = σ²_{t+k} beyond the origin
            s += a * if lag > o { fut[(lag - o - 1) as usize] } else { past_e2(lag) };
        }
        for (j, b) in vp.beta.iter().enumerate() {
            let lag = t - j as isize - 1;
            s += b * if lag > o { fut[(lag - o - 1) as usize] } else { past_s2(lag) };
        }
        fut.push(s.clamp(MIN_VARIANCE, MAX_VARIANCE));
    }
    fut
}

fn egarch_forecast(
    vp: VolParams<'_>,
    resid: &[f64],
    sigma2: &[f64],
    backcast: f64,
    origin: usize,
    horizon: usize,
    innovations: &Innovations,
) -> Vec<f64> {
    let o = origin as isize;
    let (lo, hi) = (MIN_VARIANCE.ln(), MAX_VARIANCE.ln());
    let past_news = |t: isize| {
        if t < 0 {
            0.0
        } else {
            let t = t as usize;
            resid[t].abs() / sigma2[t].sqrt() - SQRT_2_OVER_PI
        }
    };
    let past_ln = |t: isize| if t < 0 { backcast.ln() } else { sigma2[t as usize].ln() };

    // Without news terms beyond step 1 every path is identical.
    let deterministic = horizon == 1 || vp.alpha.iter().all(|&a| a == 0.0);
    let paths = if deterministic { 1 } else { SIMULATIONS };
    let mut rng = StdRng::seed_from_u64(SIMULATION_SEED);

    let mut acc = vec![0.0; horizon];
    let mut news = vec![0.0; horizon];
    let mut ln_s2 = vec![0.0; horizon];
    for _ in 0..paths {
        for k in 0..horizon {
            let t = o + k as isize + 1;
            let mut l = vp.omega;
            for (i, a) in vp.alpha.iter().enumerate() {
                let lag = t - i as isize - 1;
                l += a * if lag > o { news[(lag - o - 1) as usize] } else { past_news(lag) };
            }
            for (j, b) in vp.beta.iter().enumerate() {
                let lag = t - j as isize - 1;
                l += b * if lag > o { ln_s2[(lag - o - 1) as usize] } else { past_ln(lag) };
            }
            let l = l.clamp(lo, hi);
            ln_s2[k] = l;
            acc[k] += l.exp();
            news[k] = if deterministic {
                0.0
            } else {
                innovations.sample(&mut rng).abs() - SQRT_2_OVER_PI
            };
        }
    }
    acc.into_iter().map(|s| s / paths as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OMEGA: f64 = 0.1;
    const ALPHA: [f64; 1] = [0.10];
    const BETA: [f64; 1] = [0.85];

    fn vp() -> VolParams<'static> {
        VolParams { omega: OMEGA, alpha: &ALPHA, beta: &BETA }
    }

    #[test]
    fn garch_stationarity() {
        let longrun = vp().long_run_variance().unwrap();
        assert!((longrun - OMEGA / (1.0 - 0.10 - 0.85)).abs() < 1e-12);
        assert!(vp().is_valid(VolatilityModel::Garch));

        let explosive = VolParams { omega: 0.1, alpha: &[0.3], beta: &[0.75] };
        assert!(!explosive.is_valid(VolatilityModel::Garch));
        assert!(explosive.long_run_variance().is_none());
    }

    #[test]
    fn garch_shock_raises_variance() {
        let calm = [0.1, -0.1, 0.1, -0.1];
        let shock = [0.1, -0.1, 0.1, 5.0];
        let bc = 1.0;
        let s_calm = conditional_variance(VolatilityModel::Garch, vp(), &calm, bc);
        let s_shock = conditional_variance(VolatilityModel::Garch, vp(), &shock, bc);
        let inn = Innovations::Normal;
        let f_calm = forecast_variance(VolatilityModel::Garch, vp(), &calm, &s_calm, bc, 3, 1, &inn);
        let f_shock = forecast_variance(VolatilityModel::Garch, vp(), &shock, &s_shock, bc, 3, 1, &inn);
        assert!(f_shock[0] > f_calm[0]);
    }

    #[test]
    fn garch11_recursion_matches_closed_form() {
        let resid = [0.5, -1.5, 2.0, -0.3];
        let bc = backcast(&resid);
        let s2 = conditional_variance(VolatilityModel::Garch, vp(), &resid, bc);
        let f = forecast_variance(VolatilityModel::Garch, vp(), &resid, &s2, bc, 3, 20, &Innovations::Normal);

        let longrun = vp().long_run_variance().unwrap();
        for (h, v) in f.iter().enumerate() {
            let expected = longrun + 0.95_f64.powi(h as i32) * (f[0] - longrun);
            assert!((v - expected).abs() < 1e-9, "h={} got {v} expected {expected}", h + 1);
        }
        // Decays toward σ²_∞
        assert!((f[19] - longrun).abs() < (f[0] - longrun).abs());
    }

    #[test]
    fn garch00_is_constant_variance() {
        let vp = VolParams { omega: 2.5, alpha: &[], beta: &[] };
        let resid = [1.0, -3.0, 0.2];
        let s2 = conditional_variance(VolatilityModel::Garch, vp, &resid, 1.0);
        assert!(s2.iter().all(|&s| (s - 2.5).abs() < 1e-12));
        let f = forecast_variance(VolatilityModel::Garch, vp, &resid, &s2, 1.0, 2, 4, &Innovations::Normal);
        assert_eq!(f, vec![2.5; 4]);
    }

    #[test]
    fn egarch_forecast_is_positive_and_reproducible() {
        let vp = VolParams { omega: 0.02, alpha: &[0.15], beta: &[0.9] };
        let resid = [0.4, -2.2, 1.1, 0.05, -0.7];
        let bc = backcast(&resid);
        let s2 = conditional_variance(VolatilityModel::Egarch, vp, &resid, bc);
        assert!(s2.iter().all(|&s| s > 0.0));

        let inn = Innovations::Normal;
        let a = forecast_variance(VolatilityModel::Egarch, vp, &resid, &s2, bc, 4, 5, &inn);
        let b = forecast_variance(VolatilityModel::Egarch, vp, &resid, &s2, bc, 4, 5, &inn);
        assert_eq!(a, b);
        assert!(a.iter().all(|&v| v > 0.0 && v.is_finite()));

        // Step 1 is exact.
        let one = forecast_variance(VolatilityModel::Egarch, vp, &resid, &s2, bc, 4, 1, &inn);
        assert!((one[0] - a[0]).abs() < 1e-12);
    }

    #[test]
    fn starting_values_are_feasible() {
        for (p, q) in [(1, 1), (2, 1), (1, 0), (0, 2), (0, 0)] {
            let v = starting_values(VolatilityModel::Garch, p, q, 1.3);
            let vp = VolParams { omega: v[0], alpha: &v[1..1 + p], beta: &v[1 + p..] };
            assert!(vp.is_valid(VolatilityModel::Garch), "GARCH({p},{q}) start {v:?}");
        }
        assert_eq!(names(2, 1), vec!["omega", "alpha[1]", "alpha[2]", "beta[1]"]);
    }
}
