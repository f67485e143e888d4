//! Collaborator seams.
//!
//! The gateway treats authentication, settings, the usage ledger and the
//! AI vendors as black boxes behind these traits. HTTP-backed
//! implementations live in [`crate::clients`]; tests substitute their
//! own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuthError, OracleError, SettingsError, VendorError};
use crate::gateway::admission_key::AdmissionKey;

/// Successful credential verification.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedCaller {
    pub user_id: String,
}

/// AI defaults held by the settings store. `provider` may be absent or
/// carry an identifier the gateway does not know; both fall through to
/// the hard default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AiDefaults {
    pub provider: Option<String>,
}

/// Authoritative usage snapshot from the ledger. Never cached across
/// requests: it is safety-critical and mutated by concurrent callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStatus {
    pub membership: String,
    pub remaining: i64,
    pub limit: i64,
    #[serde(rename = "burstRemaining")]
    pub burst_remaining: i64,
    #[serde(rename = "burstLimit")]
    pub burst_limit: i64,
}

/// External credential verifier.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, bearer: &str) -> Result<VerifiedCaller, AuthError>;
}

/// External settings store.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn ai_defaults(&self) -> Result<AiDefaults, SettingsError>;
}

/// External usage ledger: the source of truth for remaining allowance.
#[async_trait]
pub trait UsageOracle: Send + Sync {
    /// Read the caller's allowance for a request costing `units`.
    async fn check(&self, key: &AdmissionKey, units: i64) -> Result<UsageStatus, OracleError>;

    /// Record consumption after a successful upstream call. Callers
    /// invoke this fire-and-forget; errors are logged and discarded.
    async fn increment(&self, key: &AdmissionKey, units: i64) -> Result<(), OracleError>;
}

/// One upstream AI vendor.
#[async_trait]
pub trait Vendor: Send + Sync {
    async fn call(&self, model: &str, input: Value) -> Result<Value, VendorError>;
}
