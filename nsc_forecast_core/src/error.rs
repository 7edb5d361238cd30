use thiserror::Error;

/// Errors raised by the deterministic core.
///
/// `DuplicateId` is fatal to the single `add` that raised it. `MissingCluster`
/// means the pipeline ran out of order and must abort the session.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("duplicate evidence id: {0}")]
    DuplicateId(String),

    #[error("evidence {evidence_id} has origin {origin_id} with no computed cluster (cluster before computing influence)")]
    MissingCluster {
        evidence_id: String,
        origin_id: String,
    },

    #[error("{field} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid critique: {0}")]
    InvalidCritique(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type ForecastResult<T> = Result<T, ForecastError>;

/// Check that `value` is finite and inside `[min, max]`.
pub(crate) fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> ForecastResult<f64> {
    if value.is_finite() && value >= min && value <= max {
        Ok(value)
    } else {
        Err(ForecastError::OutOfRange { field, value, min, max })
    }
}
