//! Boundary error types for Modelgate Core.
//!
//! Each external collaborator gets its own closed error enum, converted
//! once at the boundary into the wire taxonomy (`gateway::error_map`).
//! Downstream code matches on variants, never on message text.

use thiserror::Error;

/// Errors raised by the external Auth Verifier.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AuthError {
    /// The verifier could not be reached or answered garbage.
    #[error("auth verifier transport error: {0}")]
    Transport(String),

    /// The verifier answered and rejected the credential.
    #[error("credential rejected: {0}")]
    Rejected(String),
}

/// Errors raised by the Settings Store.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("settings store transport error: {0}")]
    Transport(String),

    /// The store answered but carried no AI defaults.
    #[error("settings value missing")]
    Missing,

    /// The store answered with a value we cannot interpret.
    #[error("malformed settings value: {0}")]
    Malformed(String),
}

/// Errors raised by the Usage Oracle.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum OracleError {
    /// The oracle answered with an HTTP-like failure status.
    #[error("usage oracle rejected: {status} {message}")]
    Status { status: u16, message: String },

    #[error("usage oracle transport error: {0}")]
    Transport(String),

    #[error("usage oracle call timed out")]
    Timeout,
}

/// Errors raised by an upstream AI vendor call.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum VendorError {
    /// The vendor answered with a failure status and an error body.
    #[error("vendor returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("vendor transport error: {0}")]
    Transport(String),

    #[error("vendor call timed out")]
    Timeout,
}

impl From<reqwest::Error> for VendorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            VendorError::Timeout
        } else {
            VendorError::Transport(e.to_string())
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            OracleError::Timeout
        } else {
            OracleError::Transport(e.to_string())
        }
    }
}
