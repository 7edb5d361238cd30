//nsc_forecast_core/decide.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{cfg::ForecastCfg, critique::Critique};

/// Phase of one forecasting session.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Phase {
    Gathering,
    Clustering,
    Aggregating,
    Critiquing,
    FollowupGathering,
    Finalized,
}

impl Phase {
    /// Legal edges of the critique loop.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Gathering, Clustering)
                | (Clustering, Aggregating)
                | (Aggregating, Critiquing)
                | (Critiquing, FollowupGathering)
                | (Critiquing, Finalized)
                | (FollowupGathering, Clustering)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Finalized
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Gathering => "GATHERING",
            Phase::Clustering => "CLUSTERING",
            Phase::Aggregating => "AGGREGATING",
            Phase::Critiquing => "CRITIQUING",
            Phase::FollowupGathering => "FOLLOWUP_GATHERING",
            Phase::Finalized => "FINALIZED",
        };
        f.write_str(s)
    }
}

/// Decide where the loop goes once a critique cycle has completed.
///
/// `completed_cycles` already counts the critique just handled. Follow-up
/// gathering needs at least one proposed search and an unexhausted budget.
pub fn decide_after_critique(critique: &Critique, completed_cycles: u32, cfg: &ForecastCfg) -> Phase {
    if critique.has_follow_ups() && completed_cycles < cfg.max_iterations {
        Phase::FollowupGathering
    } else {
        Phase::Finalized
    }
}
