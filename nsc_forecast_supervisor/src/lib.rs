//! nsc_forecast_supervisor
//!
//! Outside-world facing orchestration layer for `nsc_forecast_core`.
//!
//! Responsibilities:
//! - define the contracts of the external services (search, critic, drivers, report)
//! - convert raw search hits into typed `Evidence` via adapters
//! - bound every external call with a timeout and at most one retry
//! - run the critique-then-refine loop of one session to `Finalized`
//!
//! Non-goals:
//! - no model calls or prompt text
//! - no multi-question batching
//! - no math or policy logic (lives in core)

pub mod adapter;
pub mod controller;
pub mod error;
pub mod policy;
pub mod services;

pub use adapter::{
    BasicEvidenceBuilder,
    BasicKeys,
    EvidenceBuilder,
    Normalizer,
    RecordProvider,
    RecordSource,
    SearchRecord,
    build_evidence_batch,
    record_id,
};

pub use controller::CritiqueController;
pub use error::{ServiceError, SessionError, SessionResult};
pub use policy::{CallPolicy, call_with_policy};
pub use services::{
    CriticService,
    CritiqueRequest,
    DriverContext,
    DriverGenerator,
    EvidenceSource,
    MarketContext,
    NarrativeReporter,
    SearchRequest,
};
