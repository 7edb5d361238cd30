use serde::{Deserialize, Serialize};

use crate::cfg::ForecastCfg;
use crate::cluster::ClusterSet;
use crate::error::{ForecastError, ForecastResult};
use crate::evidence::Evidence;

/// Contribution of one evidence item to the posterior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluenceItem {
    pub evidence_id: String,
    pub cluster_id: String,
    /// Discounted log-likelihood ratio. Additive in log-odds space.
    pub log_lr: f64,
    /// Probability shift this item alone would cause from the prior, as a fraction
    /// (0.05 = 5 pp). Reporting only; never summed into the posterior.
    pub delta_pp: f64,
}

/// Undiscounted log-likelihood ratio of one item.
///
/// `polarity × tier_weight × (0.5 + 0.5·verifiability) × (1 + ln(1 + corroborations)) × llr_scale`.
/// Every factor after polarity is strictly positive, so the sign always follows polarity.
pub fn base_log_lr(ev: &Evidence, cfg: &ForecastCfg) -> f64 {
    let tier = cfg.tier_weights.weight(ev.tier());
    let quality = 0.5 + 0.5 * ev.verifiability();
    let corroboration = 1.0 + (ev.corroborations_indep() as f64).ln_1p();
    ev.polarity() * tier * quality * corroboration * cfg.llr_scale
}

/// Single-item probability shift from `p0` (reporting approximation).
///
/// Equal to `sigmoid(logit(p0) + log_lr) - p0`, written as
/// `p0(1-p0)(e^L - 1) / (1 + p0(e^L - 1))`. The sign matches `log_lr` for any
/// non-zero `log_lr`, however small.
#[inline]
pub fn delta_pp(p0: f64, log_lr: f64) -> f64 {
    if log_lr == 0.0 {
        return 0.0;
    }
    let d = log_lr.exp_m1();
    if !d.is_finite() {
        // e^L overflowed: the posterior saturates at 1
        return 1.0 - p0;
    }
    p0 * (1.0 - p0) * d / (1.0 + p0 * d)
}

/// Compute one `InfluenceItem` per evidence item, each discounted by its cluster's
/// `m_eff / n`. Clustering must have run over the same evidence first.
pub fn compute_influence(
    evidence: &[Evidence],
    clusters: &ClusterSet,
    p0: f64,
    cfg: &ForecastCfg,
) -> ForecastResult<Vec<InfluenceItem>> {
    let mut out = Vec::with_capacity(evidence.len());
    for ev in evidence {
        let cluster = clusters
            .get(ev.origin_id())
            .filter(|c| c.members.iter().any(|m| m == ev.id()))
            .ok_or_else(|| ForecastError::MissingCluster {
                evidence_id: ev.id().to_string(),
                origin_id: ev.origin_id().to_string(),
            })?;

        let log_lr = base_log_lr(ev, cfg) * cluster.discount();
        out.push(InfluenceItem {
            evidence_id: ev.id().to_string(),
            cluster_id: cluster.cluster_id.clone(),
            log_lr,
            delta_pp: delta_pp(p0, log_lr),
        });
    }
    Ok(out)
}
