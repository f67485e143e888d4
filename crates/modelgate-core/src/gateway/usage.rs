//! Usage/quota enforcement against the external Usage Oracle.
//!
//! The oracle is the only globally consistent piece of the admission
//! path; everything here re-fetches per request. Strategy is
//! check-then-increment: `admit` only reads allowance, and the pipeline
//! fires a detached increment after upstream success.

use std::sync::Arc;
use std::time::Duration;

use crate::error::OracleError;
use crate::external::{UsageOracle, UsageStatus};
use crate::gateway::admission_key::AdmissionKey;
use crate::gateway::error_map::{classify, ErrorCode, ErrorPayload};
use crate::gateway::timeout::with_timeout;

/// Outcome of the usage pre-check.
#[derive(Debug)]
pub enum Admission {
    Admitted { usage: UsageStatus },
    Denied(ErrorPayload),
}

pub struct UsageGuard {
    oracle: Arc<dyn UsageOracle>,
    /// Deadline on the oracle round-trip.
    oracle_timeout: Duration,
}

impl UsageGuard {
    pub fn new(oracle: Arc<dyn UsageOracle>, oracle_timeout: Duration) -> Self {
        Self { oracle, oracle_timeout }
    }

    /// Check whether `key` may spend `units` now. Denials carry the full
    /// wire payload; admission carries the usage snapshot for the
    /// observability headers.
    pub async fn admit(&self, key: &AdmissionKey, units: i64) -> Admission {
        let oracle = Arc::clone(&self.oracle);
        let owned_key = key.clone();
        let checked = with_timeout(self.oracle_timeout, async move {
            oracle.check(&owned_key, units).await
        })
        .await;

        let status = match checked {
            Err(elapsed) => {
                tracing::warn!(key = %key, "usage oracle exceeded deadline");
                return Admission::Denied(ErrorPayload::new(
                    classify(&elapsed),
                    "Usage check timed out, please retry",
                ));
            }
            Ok(Err(e)) => return Admission::Denied(Self::map_oracle_error(key, &e)),
            Ok(Ok(status)) => status,
        };

        // Burst exhaustion first: the more actionable, transient denial.
        if status.burst_remaining < units {
            tracing::warn!(key = %key, burst_limit = status.burst_limit, "burst quota exhausted");
            return Admission::Denied(ErrorPayload::new(
                ErrorCode::RateLimited,
                format!(
                    "Burst limit reached ({} per window). Please slow down.",
                    status.burst_limit
                ),
            ));
        }
        if status.remaining < units {
            tracing::warn!(key = %key, limit = status.limit, "daily quota exhausted");
            return Admission::Denied(ErrorPayload::new(
                ErrorCode::QuotaExceeded,
                format!("Daily limit of {} requests reached.", status.limit),
            ));
        }

        Admission::Admitted { usage: status }
    }

    fn map_oracle_error(key: &AdmissionKey, e: &OracleError) -> ErrorPayload {
        match e {
            OracleError::Status { status, message } => {
                let code = match status {
                    401 => ErrorCode::Unauthorized,
                    429 => {
                        // The oracle folds burst and daily denials into one
                        // status; its message tells them apart.
                        if is_burst_message(message) {
                            ErrorCode::RateLimited
                        } else {
                            ErrorCode::QuotaExceeded
                        }
                    }
                    503 => ErrorCode::ServiceUnavailable,
                    _ => ErrorCode::UsageUnavailable,
                };
                tracing::warn!(key = %key, status, code = ?code, "usage oracle denied request");
                ErrorPayload::new(code, message.clone())
            }
            OracleError::Timeout => {
                ErrorPayload::new(ErrorCode::Timeout, "Usage check timed out, please retry")
            }
            OracleError::Transport(msg) => {
                let code = classify(e);
                tracing::warn!(key = %key, "usage oracle unreachable: {}", msg);
                if code == ErrorCode::Timeout {
                    ErrorPayload::new(ErrorCode::Timeout, "Usage check timed out, please retry")
                } else {
                    ErrorPayload::new(
                        ErrorCode::UsageUnavailable,
                        "Usage service is temporarily unavailable",
                    )
                }
            }
        }
    }
}

fn is_burst_message(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("burst") || msg.contains("per minute") || msg.contains("slow down")
}
