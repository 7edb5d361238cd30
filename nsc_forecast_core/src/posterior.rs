use serde::{Deserialize, Serialize};

use crate::cfg::ForecastCfg;
use crate::influence::InfluenceItem;

/// Log-odds of `p`. Callers keep `p` inside (0, 1).
#[inline]
pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[inline]
pub fn clamp_probability(p: f64, eps: f64) -> f64 {
    p.clamp(eps, 1.0 - eps)
}

/// Result of one aggregation pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Posterior {
    /// `logit(p0) + Σ logLR`, before clamping.
    pub log_odds: f64,
    pub p_neutral: f64,
    pub p_aware: Option<f64>,
}

/// Sum discounted contributions in log-odds space and convert back.
///
/// Deterministic: summation follows the order of `influence`, so an unchanged
/// state always produces the same bits.
pub fn aggregate(
    p0: f64,
    influence: &[InfluenceItem],
    market_probability: Option<f64>,
    cfg: &ForecastCfg,
) -> Posterior {
    let eps = cfg.epsilon;
    let prior = clamp_probability(p0, eps);

    let mut log_odds = logit(prior);
    for item in influence {
        log_odds += item.log_lr;
    }

    let p_neutral = clamp_probability(sigmoid(log_odds), eps);
    let p_aware = market_probability
        .filter(|m| m.is_finite())
        .map(|m| blend_market(p_neutral, m, cfg.market_blend_weight, eps));

    Posterior {
        log_odds,
        p_neutral,
        p_aware,
    }
}

/// Weighted geometric mean in odds space: `(1-w)·logit(p) + w·logit(market)`.
pub fn blend_market(p_neutral: f64, market: f64, weight: f64, eps: f64) -> f64 {
    let w = weight.clamp(0.0, 1.0);
    let a = logit(clamp_probability(p_neutral, eps));
    let b = logit(clamp_probability(market, eps));
    clamp_probability(sigmoid((1.0 - w) * a + w * b), eps)
}
