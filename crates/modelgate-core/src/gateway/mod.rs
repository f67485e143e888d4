//! Admission-control gateway.
//!
//! Everything an AI-backed endpoint runs before (and after) forwarding a
//! request upstream: key resolution, rate limiting, quota enforcement,
//! provider resolution, deadline-bounded execution and failure
//! normalization.

pub mod admission_key;
pub mod error_map;
pub mod pipeline;
pub mod provider;
pub mod rate_limit;
pub mod timeout;
pub mod usage;

pub use admission_key::{client_ip, resolve_key, AdmissionKey, KeyScope};
pub use error_map::{classify, classify_text, ErrorCode, ErrorPayload};
pub use pipeline::{Gateway, GatewayOutcome, GenerateRequest};
pub use provider::{ProviderResolver, ResolutionSource};
pub use rate_limit::{RateDecision, RateLimiter};
pub use timeout::{with_timeout, Elapsed, MIN_TIMEOUT};
pub use usage::{Admission, UsageGuard};
