use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::evidence::Evidence;

// ---------------------------------------------------------------------
// Cluster engine: group evidence by shared origin and estimate how much
// of each group is redundant.
// ---------------------------------------------------------------------

/// Correlation group of evidence sharing an origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterMeta {
    /// Equal to the shared `origin_id`.
    pub cluster_id: String,
    /// Estimated pairwise correlation in [0,1].
    pub rho: f64,
    /// Effective independent count, in [1, n].
    pub m_eff: f64,
    /// Member evidence ids, in store order.
    pub members: Vec<String>,
    /// True when `rho` came from a critique override instead of member consistency.
    pub rho_overridden: bool,
}

impl ClusterMeta {
    /// Raw member count.
    pub fn n(&self) -> usize {
        self.members.len()
    }

    /// Share of undiscounted weight each member keeps: `m_eff / n`.
    pub fn discount(&self) -> f64 {
        let n = self.n();
        if n == 0 {
            return 1.0;
        }
        self.m_eff / n as f64
    }

    /// Replace rho and recompute m_eff. Applying the same value twice is a no-op.
    pub fn set_rho(&mut self, rho: f64) {
        self.rho = rho.clamp(0.0, 1.0);
        self.m_eff = effective_count(self.n(), self.rho);
        self.rho_overridden = true;
    }
}

/// `1 + (n - 1)(1 - rho)`, clamped to `[1, n]`.
///
/// Independent items (`rho = 0`) count fully; fully redundant ones (`rho = 1`) count once.
#[inline]
pub fn effective_count(n: usize, rho: f64) -> f64 {
    if n <= 1 {
        return 1.0;
    }
    let n_f = n as f64;
    let rho = if rho.is_finite() { rho.clamp(0.0, 1.0) } else { 0.0 };
    (1.0 + (n_f - 1.0) * (1.0 - rho)).clamp(1.0, n_f)
}

/// All clusters of a session, keyed by cluster id (deterministic order).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSet {
    clusters: BTreeMap<String, ClusterMeta>,
}

impl ClusterSet {
    pub fn get(&self, cluster_id: &str) -> Option<&ClusterMeta> {
        self.clusters.get(cluster_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClusterMeta> {
        self.clusters.values()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Override rho for named clusters and recompute their m_eff.
    /// Unknown cluster ids are ignored. Returns how many clusters were touched.
    pub fn apply_adjustments(&mut self, adjustments: &BTreeMap<String, f64>) -> usize {
        let mut applied = 0;
        for (cluster_id, rho) in adjustments {
            match self.clusters.get_mut(cluster_id) {
                Some(meta) => {
                    meta.set_rho(*rho);
                    applied += 1;
                }
                None => debug!(cluster_id = %cluster_id, "correlation adjustment names no cluster, ignored"),
            }
        }
        applied
    }
}

/// Group evidence by exact `origin_id`, estimate rho from member consistency,
/// then apply any rho overrides before m_eff is final.
pub fn cluster_evidence(evidence: &[Evidence], overrides: &BTreeMap<String, f64>) -> ClusterSet {
    let mut groups: BTreeMap<String, Vec<&Evidence>> = BTreeMap::new();
    for ev in evidence {
        groups.entry(ev.origin_id().to_string()).or_default().push(ev);
    }

    let mut set = ClusterSet::default();
    for (cluster_id, members) in groups {
        let n = members.len();
        let rho = if n >= 2 {
            let sum: f64 = members.iter().map(|e| e.consistency()).sum();
            (sum / n as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let meta = ClusterMeta {
            cluster_id: cluster_id.clone(),
            rho,
            m_eff: effective_count(n, rho),
            members: members.iter().map(|e| e.id().to_string()).collect(),
            rho_overridden: false,
        };
        set.clusters.insert(cluster_id, meta);
    }

    set.apply_adjustments(overrides);

    for meta in set.iter() {
        debug!(
            cluster_id = %meta.cluster_id,
            n = meta.n(),
            rho = meta.rho,
            m_eff = meta.m_eff,
            overridden = meta.rho_overridden,
            "cluster"
        );
    }
    set
}
