use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};

/// Upper bound on follow-up searches a single critique may request.
pub const MAX_FOLLOW_UPS: usize = 10;

/// Confidence caveat recorded whenever a critique cycle fell back to the default.
pub const DEGRADED_ANALYSIS_NOTE: &str = "Analysis may be incomplete: critique unavailable, default critique used";

/// Which side of the question a search targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SearchSide {
    For,
    Against,
    Neutral,
    Both,
}

impl fmt::Display for SearchSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchSide::For => "FOR",
            SearchSide::Against => "AGAINST",
            SearchSide::Neutral => "NEUTRAL",
            SearchSide::Both => "BOTH",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpSearch {
    pub query: String,
    #[serde(default)]
    pub rationale: String,
    pub side: SearchSide,
}

/// A group of evidence ids suspected to be redundant.
///
/// On the wire a flag is either a single string (`"e3"`, or `"e3, e7"`) or an
/// array of ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FlagWire", into = "Vec<String>")]
pub struct DuplicationFlag(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagWire {
    One(String),
    Many(Vec<String>),
}

impl From<FlagWire> for DuplicationFlag {
    fn from(w: FlagWire) -> Self {
        let raw = match w {
            FlagWire::One(s) => vec![s],
            FlagWire::Many(v) => v,
        };
        let ids = raw
            .iter()
            .flat_map(|s| s.split(|c: char| c == ',' || c == ';' || c.is_whitespace()))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        DuplicationFlag(ids)
    }
}

impl From<DuplicationFlag> for Vec<String> {
    fn from(f: DuplicationFlag) -> Self {
        f.0
    }
}

impl DuplicationFlag {
    pub fn single(id: impl Into<String>) -> Self {
        DuplicationFlag(vec![id.into()])
    }

    pub fn group<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DuplicationFlag(ids.into_iter().map(Into::into).collect())
    }

    /// Ids this flag asks to drop, given which ids are still present.
    ///
    /// A single-id flag drops that id. A group keeps its first present member
    /// and drops the other present members; a repeated id counts once.
    pub fn ids_to_remove<F>(&self, is_present: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let mut present: Vec<&String> = Vec::new();
        for id in &self.0 {
            if is_present(id) && !present.contains(&id) {
                present.push(id);
            }
        }
        if self.0.len() == 1 {
            return present.into_iter().cloned().collect();
        }
        present.into_iter().skip(1).cloned().collect()
    }
}

/// Structured feedback from the critic pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Critique {
    pub missing: Vec<String>,
    pub duplication_flags: Vec<DuplicationFlag>,
    pub data_concerns: Vec<String>,
    pub follow_up_searches: Vec<FollowUpSearch>,
    pub correlation_adjustments: BTreeMap<String, f64>,
    pub confidence_issues: Vec<String>,
}

impl Critique {
    /// Parse the critic's JSON and check it at the boundary.
    pub fn from_json(s: &str) -> ForecastResult<Self> {
        let c: Critique = serde_json::from_str(s)?;
        c.validate()?;
        Ok(c)
    }

    /// Enforce the critic contract: at most ten follow-ups with non-empty queries,
    /// and correlation adjustments inside [0,1].
    pub fn validate(&self) -> ForecastResult<()> {
        if self.follow_up_searches.len() > MAX_FOLLOW_UPS {
            return Err(ForecastError::InvalidCritique(format!(
                "{} follow-up searches, at most {} allowed",
                self.follow_up_searches.len(),
                MAX_FOLLOW_UPS
            )));
        }
        if let Some(f) = self.follow_up_searches.iter().find(|f| f.query.trim().is_empty()) {
            return Err(ForecastError::InvalidCritique(format!(
                "follow-up search with empty query (side {})",
                f.side
            )));
        }
        for (cluster_id, rho) in &self.correlation_adjustments {
            if !(rho.is_finite() && (0.0..=1.0).contains(rho)) {
                return Err(ForecastError::InvalidCritique(format!(
                    "correlation adjustment for {} is {}, expected [0, 1]",
                    cluster_id, rho
                )));
            }
        }
        Ok(())
    }

    /// Default critique substituted when the critic fails: no findings, one
    /// generic follow-up search, and a degraded-analysis caveat.
    pub fn fallback(question: &str) -> Self {
        Critique {
            follow_up_searches: vec![FollowUpSearch {
                query: format!("{} recent news", question.trim()),
                rationale: "General search for recent updates".to_string(),
                side: SearchSide::Both,
            }],
            confidence_issues: vec![DEGRADED_ANALYSIS_NOTE.to_string()],
            ..Critique::default()
        }
    }

    pub fn has_follow_ups(&self) -> bool {
        !self.follow_up_searches.is_empty()
    }
}
