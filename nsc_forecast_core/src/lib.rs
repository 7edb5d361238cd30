pub mod error;
pub mod evidence;
pub mod cfg;

pub mod cluster;
pub mod influence;
pub mod posterior;

pub mod critique;
pub mod decide;
pub mod state;

pub mod drivers;
pub mod report;

pub use error::{ForecastError, ForecastResult};
pub use evidence::{Evidence, EvidenceRecord, EvidenceStore, EvidenceTier, ProConView};
pub use cfg::{ForecastCfg, ModelSet, TierWeights};

pub use cluster::{ClusterMeta, ClusterSet, cluster_evidence, effective_count};
pub use influence::{InfluenceItem, base_log_lr, compute_influence, delta_pp};
pub use posterior::{Posterior, aggregate, blend_market, clamp_probability, logit, sigmoid};

pub use critique::{Critique, DuplicationFlag, FollowUpSearch, SearchSide, DEGRADED_ANALYSIS_NOTE, MAX_FOLLOW_UPS};
pub use decide::{Phase, decide_after_critique};
pub use state::{CritiqueEffect, ForecastSnapshot, ForecastState, IngestStats};

pub use drivers::{fallback_drivers, validate_drivers, MAX_DRIVERS, MIN_DRIVERS};
pub use report::{CatalogEntry, ReportCatalog};
