use nsc_forecast_core::{ForecastError, Phase};
use thiserror::Error;

/// Failure of one external call. Always absorbed by a fallback; never fails a session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("{service} call failed: {message}")]
    CallFailed { service: &'static str, message: String },

    #[error("{service} timed out after {after_ms}ms")]
    Timeout { service: &'static str, after_ms: u64 },

    #[error("{service} returned a malformed response: {reason}")]
    Malformed { service: &'static str, reason: String },
}

impl ServiceError {
    pub fn failed(service: &'static str, message: impl Into<String>) -> Self {
        ServiceError::CallFailed {
            service,
            message: message.into(),
        }
    }

    pub fn malformed(service: &'static str, reason: impl Into<String>) -> Self {
        ServiceError::Malformed {
            service,
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Timeout { .. })
    }
}

/// Errors that abort a session. Only internal invariant violations end up here.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] ForecastError),

    #[error("illegal phase transition: {from} -> {to}")]
    IllegalTransition { from: Phase, to: Phase },

    #[error("operation requires phase {expected}, session is in {actual}")]
    WrongPhase { expected: Phase, actual: Phase },
}

pub type SessionResult<T> = Result<T, SessionError>;
