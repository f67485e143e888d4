//! Admission key derivation: authenticated user id, else caller IP.
//!
//! An admission system must never end up without a key, so every failure
//! path degrades to the network address rather than rejecting or
//! skipping limiting.

use axum::http::{header, HeaderMap};
use std::net::SocketAddr;

use crate::external::AuthVerifier;

/// Sentinel bearer value treated as "no credential".
const GUEST_SENTINEL: &str = "guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    User,
    Ip,
}

/// A stable per-caller admission key. Invariant: never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionKey {
    pub scope: KeyScope,
    pub value: String,
}

impl AdmissionKey {
    pub fn user(id: impl Into<String>) -> Self {
        Self { scope: KeyScope::User, value: id.into() }
    }

    pub fn ip(addr: impl Into<String>) -> Self {
        Self { scope: KeyScope::Ip, value: addr.into() }
    }
}

impl std::fmt::Display for AdmissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.scope {
            KeyScope::User => write!(f, "user:{}", self.value),
            KeyScope::Ip => write!(f, "ip:{}", self.value),
        }
    }
}

/// Extract the bearer credential from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Best-effort client IP: first x-forwarded-for entry, then x-real-ip,
/// then the raw socket address, defaulting to `"unknown"`.
pub fn client_ip(headers: &HeaderMap, socket: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .or_else(|| socket.map(|a| a.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Resolve the admission key for a request.
///
/// No bearer (or the guest sentinel) keys by IP. A verified credential
/// keys by user id. A credential the verifier rejects (or a verifier
/// failure) falls back to the IP key: invalid-credential traffic is
/// still rate limited.
pub async fn resolve_key(
    verifier: &dyn AuthVerifier,
    headers: &HeaderMap,
    socket: Option<SocketAddr>,
) -> AdmissionKey {
    let ip = client_ip(headers, socket);

    let Some(bearer) = bearer_token(headers) else {
        return AdmissionKey::ip(ip);
    };
    if bearer == GUEST_SENTINEL {
        return AdmissionKey::ip(ip);
    }

    match verifier.verify(&bearer).await {
        Ok(caller) => AdmissionKey::user(caller.user_id),
        Err(e) => {
            tracing::debug!("credential verification failed, keying by ip: {}", e);
            AdmissionKey::ip(ip)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::external::VerifiedCaller;
    use async_trait::async_trait;

    struct FixedVerifier(Result<&'static str, ()>);

    #[async_trait]
    impl AuthVerifier for FixedVerifier {
        async fn verify(&self, _bearer: &str) -> Result<VerifiedCaller, AuthError> {
            match self.0 {
                Ok(id) => Ok(VerifiedCaller { user_id: id.to_string() }),
                Err(()) => Err(AuthError::Rejected("bad token".to_string())),
            }
        }
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                v.parse().unwrap(),
            );
        }
        h
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for_first_entry() {
        let h = headers(&[("x-forwarded-for", "203.0.113.5, 10.0.0.1"), ("x-real-ip", "9.9.9.9")]);
        assert_eq!(client_ip(&h, None), "203.0.113.5");
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip_then_socket() {
        let h = headers(&[("x-real-ip", "198.51.100.7")]);
        assert_eq!(client_ip(&h, None), "198.51.100.7");

        let socket: SocketAddr = "192.0.2.1:443".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), Some(socket)), "192.0.2.1");
    }

    #[test]
    fn test_client_ip_never_throws() {
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }

    #[tokio::test]
    async fn test_guest_fallback_resolves_to_ip_key() {
        let verifier = FixedVerifier(Ok("u1"));
        let h = headers(&[("x-forwarded-for", "203.0.113.5")]);
        let key = resolve_key(&verifier, &h, None).await;
        assert_eq!(key, AdmissionKey::ip("203.0.113.5"));
        assert_eq!(key.to_string(), "ip:203.0.113.5");
    }

    #[tokio::test]
    async fn test_guest_sentinel_skips_verification() {
        let verifier = FixedVerifier(Ok("u1"));
        let h = headers(&[("authorization", "Bearer guest"), ("x-real-ip", "203.0.113.9")]);
        let key = resolve_key(&verifier, &h, None).await;
        assert_eq!(key, AdmissionKey::ip("203.0.113.9"));
    }

    #[tokio::test]
    async fn test_verified_credential_keys_by_user() {
        let verifier = FixedVerifier(Ok("user-42"));
        let h = headers(&[("authorization", "Bearer tok"), ("x-real-ip", "1.1.1.1")]);
        let key = resolve_key(&verifier, &h, None).await;
        assert_eq!(key, AdmissionKey::user("user-42"));
        assert_eq!(key.to_string(), "user:user-42");
    }

    #[tokio::test]
    async fn test_rejected_credential_falls_back_to_ip() {
        let verifier = FixedVerifier(Err(()));
        let h = headers(&[("authorization", "Bearer forged"), ("x-real-ip", "2.2.2.2")]);
        let key = resolve_key(&verifier, &h, None).await;
        assert_eq!(key, AdmissionKey::ip("2.2.2.2"));
    }
}
