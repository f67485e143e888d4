//! Modelgate Core - admission-control gateway for AI-backed endpoints.
//!
//! The gateway sits between an inbound HTTP request and the upstream AI
//! vendors: per-caller rate limiting, quota enforcement against the
//! external usage ledger, provider resolution with override precedence,
//! timeout-bounded execution and a normalized failure taxonomy.

pub mod clients;
pub mod config;
pub mod error;
pub mod external;
pub mod gateway;

pub use config::{GatewayConfig, Provider};
pub use gateway::{ErrorCode, ErrorPayload, Gateway, GenerateRequest};
