use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterMeta;
use crate::state::ForecastState;

/// One ranked evidence line for the narrative report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub evidence_id: String,
    pub claim: String,
    pub polarity: f64,
    pub tier: String,
    pub delta_pp: f64,
    pub log_lr: f64,
    pub verifiability: f64,
    pub corroborations_indep: u32,
    pub consistency: f64,
    pub published_at: String,
    pub source_domain: String,
    pub cluster: Option<ClusterMeta>,
}

impl CatalogEntry {
    /// `- e12 | + | Type A | Δpp=5.12 | logLR=0.231 | ... | cluster=..., rho=..., mEff=...`
    pub fn line(&self) -> String {
        let sign = if self.polarity > 0.0 {
            '+'
        } else if self.polarity < 0.0 {
            '-'
        } else {
            '0'
        };
        let cluster = match &self.cluster {
            Some(c) => format!("cluster={}, rho={:.2}, mEff={:.2}", c.cluster_id, c.rho, c.m_eff),
            None => "cluster=n/a".to_string(),
        };
        format!(
            "- {} | {} | Type {} | Δpp={:.2} | logLR={:.3} | ver={:.2} | corrInd={} | cons={:.2} | date={} | src={} | {}\n  Claim: {}",
            self.evidence_id,
            sign,
            self.tier,
            self.delta_pp * 100.0,
            self.log_lr,
            self.verifiability,
            self.corroborations_indep,
            self.consistency,
            self.published_at,
            self.source_domain,
            cluster,
            self.claim,
        )
    }
}

/// Deterministic input for narrative generation, built from a finalized state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCatalog {
    pub question: String,
    pub p0: f64,
    pub p_neutral: f64,
    pub p_aware: Option<f64>,
    /// "YES" when `p_neutral > 0.5`, else "NO".
    pub direction: String,
    /// `|p_neutral - 0.5| × 200`, in percent.
    pub confidence: f64,
    pub drivers: Vec<String>,
    pub confidence_issues: Vec<String>,
    pub entries: Vec<CatalogEntry>,
}

impl ReportCatalog {
    /// Rank influence items by `delta_pp` (descending) and keep the top `top_n`.
    pub fn build(state: &ForecastState, top_n: usize) -> Self {
        let mut ranked: Vec<_> = state.influence().iter().collect();
        ranked.sort_by(|a, b| b.delta_pp.total_cmp(&a.delta_pp));
        ranked.truncate(top_n);

        let entries = ranked
            .into_iter()
            .filter_map(|item| {
                let ev = state.evidence().get(&item.evidence_id)?;
                Some(CatalogEntry {
                    evidence_id: item.evidence_id.clone(),
                    claim: ev.claim().to_string(),
                    polarity: ev.polarity(),
                    tier: ev.tier().to_string(),
                    delta_pp: item.delta_pp,
                    log_lr: item.log_lr,
                    verifiability: ev.verifiability(),
                    corroborations_indep: ev.corroborations_indep(),
                    consistency: ev.consistency(),
                    published_at: ev.published_label(),
                    source_domain: ev
                        .urls()
                        .first()
                        .and_then(|u| url_domain(u))
                        .unwrap_or_else(|| "unknown".to_string()),
                    cluster: state.clusters().get(&item.cluster_id).cloned(),
                })
            })
            .collect();

        let p = state.p_neutral();
        ReportCatalog {
            question: state.question().to_string(),
            p0: state.p0(),
            p_neutral: p,
            p_aware: state.p_aware(),
            direction: if p > 0.5 { "YES" } else { "NO" }.to_string(),
            confidence: (p - 0.5).abs() * 200.0,
            drivers: state.drivers().to_vec(),
            confidence_issues: state.confidence_issues().to_vec(),
            entries,
        }
    }

    /// Plain markdown rendering, used when no narrative generator is available.
    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## Forecast: {} ({:.1}%)", self.direction, self.p_neutral * 100.0);
        let _ = writeln!(out);
        let _ = writeln!(out, "Question: {}", self.question);
        let _ = writeln!(out, "- p_neutral = {:.1}%", self.p_neutral * 100.0);
        match self.p_aware {
            Some(p) => {
                let _ = writeln!(out, "- p_aware = {:.1}%", p * 100.0);
            }
            None => {
                let _ = writeln!(out, "- p_aware = (not computed)");
            }
        }
        let _ = writeln!(out, "- p0 = {:.1}%", self.p0 * 100.0);
        let _ = writeln!(out, "- confidence = {:.1}%", self.confidence);
        let drivers = if self.drivers.is_empty() {
            "none".to_string()
        } else {
            self.drivers.join("; ")
        };
        let _ = writeln!(out, "- drivers: {}", drivers);
        let _ = writeln!(out);
        let _ = writeln!(out, "## Evidence");
        for e in &self.entries {
            let _ = writeln!(out, "{}", e.line());
        }
        if !self.confidence_issues.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Caveats");
            for issue in &self.confidence_issues {
                let _ = writeln!(out, "- {}", issue);
            }
        }
        out
    }
}

/// Host part of an http(s) URL with a leading `www.` stripped.
fn url_domain(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, r)| r)?;
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.rsplit('@').next()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        return None;
    }
    let host = host.to_ascii_lowercase();
    let bare = host.strip_prefix("www.").map(str::to_string);
    Some(bare.unwrap_or(host))
}
