use std::future::Future;
use std::time::Duration;

use nsc_forecast_core::ForecastCfg;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ServiceError;

/// Timeout and retry budget applied to every external call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    /// 0 or 1.
    pub retries: u32,
}

impl CallPolicy {
    pub fn from_cfg(cfg: &ForecastCfg) -> Self {
        Self {
            timeout: Duration::from_millis(cfg.call_timeout_ms),
            retries: cfg.call_retries.min(1),
        }
    }
}

/// Run `call` under the policy: each attempt is bounded by the timeout, and a
/// failed or timed-out attempt is retried at most once.
pub async fn call_with_policy<T, F, Fut>(
    service: &'static str,
    policy: CallPolicy,
    mut call: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let retries = policy.retries.min(1);
    let mut attempt = 0;
    loop {
        let err = match timeout(policy.timeout, call()).await {
            Ok(Ok(v)) => return Ok(v),
            Ok(Err(e)) => e,
            Err(_) => ServiceError::Timeout {
                service,
                after_ms: policy.timeout.as_millis() as u64,
            },
        };
        if attempt >= retries {
            return Err(err);
        }
        attempt += 1;
        debug!(service, attempt, error = %err, "retrying external call");
    }
}
