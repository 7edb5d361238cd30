use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cfg::ForecastCfg;
use crate::cluster::{cluster_evidence, ClusterSet};
use crate::critique::Critique;
use crate::decide::Phase;
use crate::error::{check_range, ForecastResult};
use crate::evidence::{Evidence, EvidenceStore};
use crate::influence::{compute_influence, InfluenceItem};
use crate::posterior::{aggregate, clamp_probability, Posterior};

/// Outcome of feeding externally gathered evidence into the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub added: usize,
    /// Id already present in the store.
    pub skipped_duplicate: usize,
    /// Id removed earlier by deduplication; it stays removed.
    pub skipped_removed: usize,
}

/// What applying one critique changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CritiqueEffect {
    pub removed: Vec<String>,
    pub overrides_changed: usize,
}

impl CritiqueEffect {
    /// True when clusters/influence are stale until the next clustering pass.
    pub fn needs_recluster(&self) -> bool {
        !self.removed.is_empty() || self.overrides_changed > 0
    }
}

/// Read-only session output, stable once the phase is `Finalized`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSnapshot {
    pub p0: f64,
    pub p_neutral: f64,
    pub p_aware: Option<f64>,
    pub evidence_count: usize,
    pub cluster_count: usize,
    pub iteration: u32,
    pub drivers: Vec<String>,
    pub confidence_issues: Vec<String>,
    pub phase: Phase,
}

/// Accumulated result of one forecasting session.
///
/// Owned by exactly one controller. Every mutation goes through the methods
/// below so the pipeline order (cluster, then influence, then posterior) holds.
#[derive(Clone, Debug)]
pub struct ForecastState {
    question: String,
    p0: f64,
    p_neutral: f64,
    p_aware: Option<f64>,
    market_probability: Option<f64>,
    store: EvidenceStore,
    clusters: ClusterSet,
    influence: Vec<InfluenceItem>,
    iteration: u32,
    drivers: Vec<String>,
    phase: Phase,
    rho_overrides: BTreeMap<String, f64>,
    removed_ids: BTreeSet<String>,
    confidence_issues: Vec<String>,
    critiques: Vec<Critique>,
    degraded_cycles: u32,
}

impl ForecastState {
    /// Start a session in `Gathering`. `p0` must be a probability; it is clamped
    /// into `[epsilon, 1 - epsilon]` so its log-odds stay finite.
    pub fn new(
        question: impl Into<String>,
        p0: f64,
        market_probability: Option<f64>,
        cfg: &ForecastCfg,
    ) -> ForecastResult<Self> {
        let p0 = clamp_probability(check_range("p0", p0, 0.0, 1.0)?, cfg.epsilon);
        let market_probability = match market_probability {
            Some(m) => Some(check_range("market_probability", m, 0.0, 1.0)?),
            None => None,
        };
        Ok(Self {
            question: question.into(),
            p0,
            p_neutral: p0,
            p_aware: None,
            market_probability,
            store: EvidenceStore::new(),
            clusters: ClusterSet::default(),
            influence: Vec::new(),
            iteration: 0,
            drivers: Vec::new(),
            phase: Phase::Gathering,
            rho_overrides: BTreeMap::new(),
            removed_ids: BTreeSet::new(),
            confidence_issues: Vec::new(),
            critiques: Vec::new(),
            degraded_cycles: 0,
        })
    }

    // ---- evidence -------------------------------------------------------

    /// Add one item; fails on a duplicate id.
    pub fn ingest(&mut self, ev: Evidence) -> ForecastResult<()> {
        self.store.add(ev)
    }

    /// Add externally gathered evidence. Re-found or previously removed ids are
    /// skipped instead of failing the session.
    pub fn ingest_gathered(&mut self, batch: Vec<Evidence>) -> IngestStats {
        let mut stats = IngestStats::default();
        for ev in batch {
            if self.removed_ids.contains(ev.id()) {
                stats.skipped_removed += 1;
                continue;
            }
            match self.store.add(ev) {
                Ok(()) => stats.added += 1,
                Err(e) => {
                    warn!(error = %e, "gathered evidence skipped");
                    stats.skipped_duplicate += 1;
                }
            }
        }
        stats
    }

    // ---- pipeline -------------------------------------------------------

    /// Recompute clusters from the current evidence and the accumulated rho overrides.
    pub fn recluster(&mut self) {
        self.clusters = cluster_evidence(self.store.items(), &self.rho_overrides);
    }

    /// Recompute influence and the posterior. Pure with respect to the current
    /// evidence and clusters: calling it twice yields identical results.
    pub fn aggregate(&mut self, cfg: &ForecastCfg) -> ForecastResult<Posterior> {
        self.influence = compute_influence(self.store.items(), &self.clusters, self.p0, cfg)?;
        let post = aggregate(self.p0, &self.influence, self.market_probability, cfg);
        self.p_neutral = post.p_neutral;
        self.p_aware = post.p_aware;
        Ok(post)
    }

    /// Record a completed critique cycle: drop flagged duplicates, remember
    /// correlation overrides for the next clustering pass, collect caveats.
    pub fn apply_critique(&mut self, critique: Critique, degraded: bool) -> CritiqueEffect {
        self.iteration += 1;
        if degraded {
            self.degraded_cycles += 1;
        }

        let mut effect = CritiqueEffect::default();
        for flag in &critique.duplication_flags {
            let store = &self.store;
            let doomed = flag.ids_to_remove(|id| store.contains(id));
            let removed = self.store.remove(&doomed);
            effect.removed.extend(removed);
        }
        if !effect.removed.is_empty() {
            let removed = &effect.removed;
            self.influence.retain(|i| !removed.contains(&i.evidence_id));
            self.removed_ids.extend(effect.removed.iter().cloned());
            debug!(removed = ?effect.removed, "duplicate evidence removed");
        }

        for (cluster_id, rho) in &critique.correlation_adjustments {
            if self.rho_overrides.insert(cluster_id.clone(), *rho) != Some(*rho) {
                effect.overrides_changed += 1;
            }
        }

        for issue in &critique.confidence_issues {
            if !self.confidence_issues.contains(issue) {
                self.confidence_issues.push(issue.clone());
            }
        }
        self.critiques.push(critique);
        effect
    }

    /// Move to `next` if the edge is legal. Returns false and leaves the phase
    /// unchanged otherwise.
    pub fn advance(&mut self, next: Phase) -> bool {
        if !self.phase.can_transition_to(next) {
            return false;
        }
        self.phase = next;
        true
    }

    /// Set the driver labels. Only the first call after finalization sticks.
    pub fn set_drivers(&mut self, drivers: Vec<String>) {
        if self.drivers.is_empty() {
            self.drivers = drivers;
        }
    }

    // ---- views ----------------------------------------------------------

    pub fn snapshot(&self) -> ForecastSnapshot {
        ForecastSnapshot {
            p0: self.p0,
            p_neutral: self.p_neutral,
            p_aware: self.p_aware,
            evidence_count: self.store.len(),
            cluster_count: self.clusters.len(),
            iteration: self.iteration,
            drivers: self.drivers.clone(),
            confidence_issues: self.confidence_issues.clone(),
            phase: self.phase,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn p0(&self) -> f64 {
        self.p0
    }

    pub fn p_neutral(&self) -> f64 {
        self.p_neutral
    }

    pub fn p_aware(&self) -> Option<f64> {
        self.p_aware
    }

    pub fn market_probability(&self) -> Option<f64> {
        self.market_probability
    }

    pub fn evidence(&self) -> &EvidenceStore {
        &self.store
    }

    pub fn clusters(&self) -> &ClusterSet {
        &self.clusters
    }

    pub fn influence(&self) -> &[InfluenceItem] {
        &self.influence
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn drivers(&self) -> &[String] {
        &self.drivers
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn rho_overrides(&self) -> &BTreeMap<String, f64> {
        &self.rho_overrides
    }

    pub fn removed_ids(&self) -> &BTreeSet<String> {
        &self.removed_ids
    }

    pub fn confidence_issues(&self) -> &[String] {
        &self.confidence_issues
    }

    pub fn critiques(&self) -> &[Critique] {
        &self.critiques
    }

    pub fn degraded_cycles(&self) -> u32 {
        self.degraded_cycles
    }
}
