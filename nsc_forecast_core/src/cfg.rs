use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};
use crate::evidence::EvidenceTier;

/// Descending multiplier per evidence tier.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierWeights {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 0.7,
            c: 0.45,
            d: 0.25,
        }
    }
}

impl TierWeights {
    #[inline]
    pub fn weight(&self, tier: EvidenceTier) -> f64 {
        match tier {
            EvidenceTier::A => self.a,
            EvidenceTier::B => self.b,
            EvidenceTier::C => self.c,
            EvidenceTier::D => self.d,
        }
    }
}

/// Model identifiers handed to service implementations. The engine itself never
/// talks to a model; these only travel with the session configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSet {
    pub primary: String,
    pub small: String,
    pub reasoning: String,
}

impl Default for ModelSet {
    fn default() -> Self {
        Self {
            primary: "deepseek-chat".to_string(),
            small: "deepseek-chat".to_string(),
            reasoning: "deepseek-reasoner".to_string(),
        }
    }
}

/// Session configuration. Fixed for the lifetime of one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastCfg {
    /// Critique cycles before the loop must finalize.
    pub max_iterations: u32,
    /// Posterior clamp: probabilities stay within [epsilon, 1 - epsilon].
    pub epsilon: f64,
    /// Weight of the market probability in the odds-space blend for `p_aware`.
    pub market_blend_weight: f64,
    /// Global scale on every log-likelihood ratio.
    pub llr_scale: f64,
    pub tier_weights: TierWeights,
    /// Per external call.
    pub call_timeout_ms: u64,
    /// Automatic retries per external call (0 or 1).
    pub call_retries: u32,
    pub max_follow_ups: usize,
    pub report_top_n: usize,
    pub models: ModelSet,
}

impl Default for ForecastCfg {
    fn default() -> Self {
        Self {
            max_iterations: 2,
            epsilon: 0.001,
            market_blend_weight: 0.5,
            llr_scale: 1.0,
            tier_weights: TierWeights::default(),
            call_timeout_ms: 30_000,
            call_retries: 1,
            max_follow_ups: 10,
            report_top_n: 12,
            models: ModelSet::default(),
        }
    }
}

impl ForecastCfg {
    /// Parse from TOML; missing keys take their defaults. The result is validated.
    pub fn from_toml_str(s: &str) -> ForecastResult<Self> {
        let cfg: ForecastCfg = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ForecastResult<()> {
        if self.max_iterations == 0 {
            return Err(ForecastError::Config("max_iterations must be at least 1".into()));
        }
        if !(self.epsilon > 0.0 && self.epsilon < 0.5) {
            return Err(ForecastError::Config(format!(
                "epsilon must be in (0, 0.5), got {}",
                self.epsilon
            )));
        }
        if !(0.0..=1.0).contains(&self.market_blend_weight) {
            return Err(ForecastError::Config(format!(
                "market_blend_weight must be in [0, 1], got {}",
                self.market_blend_weight
            )));
        }
        if !(self.llr_scale.is_finite() && self.llr_scale > 0.0) {
            return Err(ForecastError::Config(format!(
                "llr_scale must be positive, got {}",
                self.llr_scale
            )));
        }
        let w = self.tier_weights;
        for (name, v) in [("a", w.a), ("b", w.b), ("c", w.c), ("d", w.d)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(ForecastError::Config(format!(
                    "tier weight {} must be positive, got {}",
                    name, v
                )));
            }
        }
        if !(w.a >= w.b && w.b >= w.c && w.c >= w.d) {
            return Err(ForecastError::Config("tier weights must descend from A to D".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(ForecastError::Config("call_timeout_ms must be non-zero".into()));
        }
        if self.call_retries > 1 {
            return Err(ForecastError::Config(format!(
                "call_retries may be 0 or 1, got {}",
                self.call_retries
            )));
        }
        if self.max_follow_ups == 0 || self.max_follow_ups > crate::critique::MAX_FOLLOW_UPS {
            return Err(ForecastError::Config(format!(
                "max_follow_ups must be in 1..={}, got {}",
                crate::critique::MAX_FOLLOW_UPS,
                self.max_follow_ups
            )));
        }
        Ok(())
    }
}
