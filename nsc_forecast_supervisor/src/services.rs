//! Contracts of the external collaborators.
//!
//! The engine never generates text itself. Searching, critiquing, picking
//! drivers and writing the narrative are behind these traits; implementations
//! wrap whatever model or API the product uses, and tests substitute canned
//! doubles.

use async_trait::async_trait;
use chrono::NaiveDate;
use nsc_forecast_core::{Critique, Evidence, ReportCatalog, SearchSide};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// One query against an evidence source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub side: SearchSide,
    pub start_date: Option<NaiveDate>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, side: SearchSide) -> Self {
        Self {
            query: query.into(),
            side,
            start_date: None,
        }
    }

    pub fn since(mut self, date: Option<NaiveDate>) -> Self {
        self.start_date = date;
        self
    }
}

/// What the critic sees: the question and the current pro/con evidence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CritiqueRequest {
    pub question: String,
    pub pro: Vec<Evidence>,
    pub con: Vec<Evidence>,
}

/// Market data known at session start.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub question: String,
    /// Base-rate prior. Falls back to the market probability, then 0.5.
    pub prior: Option<f64>,
    pub market_probability: Option<f64>,
    pub volume: Option<f64>,
    pub liquidity: Option<f64>,
}

impl MarketContext {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_prior(mut self, p: f64) -> Self {
        self.prior = Some(p);
        self
    }

    pub fn with_market_probability(mut self, p: f64) -> Self {
        self.market_probability = Some(p);
        self
    }

    pub fn with_volume(mut self, v: f64) -> Self {
        self.volume = Some(v);
        self
    }

    pub fn with_liquidity(mut self, l: f64) -> Self {
        self.liquidity = Some(l);
        self
    }

    pub fn p0(&self) -> f64 {
        self.prior.or(self.market_probability).unwrap_or(0.5)
    }
}

/// Input for driver selection, taken from the finalized session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverContext {
    pub market: MarketContext,
    pub p_neutral: f64,
    /// Claims of the strongest evidence items, strongest first.
    pub top_claims: Vec<String>,
}

#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Typed evidence for one query. Conversion from raw search hits happens upstream
    /// (see [`crate::adapter`] for a record-based implementation).
    async fn search(&self, req: &SearchRequest) -> Result<Vec<Evidence>, ServiceError>;
}

#[async_trait]
pub trait CriticService: Send + Sync {
    async fn critique(&self, req: &CritiqueRequest) -> Result<Critique, ServiceError>;
}

#[async_trait]
pub trait DriverGenerator: Send + Sync {
    /// 3–5 short labels for the factors most likely to move the outcome.
    async fn drivers(&self, ctx: &DriverContext) -> Result<Vec<String>, ServiceError>;
}

#[async_trait]
pub trait NarrativeReporter: Send + Sync {
    /// Markdown report explaining how the catalogued evidence moved the estimate.
    async fn report(&self, catalog: &ReportCatalog) -> Result<String, ServiceError>;
}
