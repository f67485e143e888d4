//! Upstream provider resolution.
//!
//! Precedence on every call: env override (read fresh, never cached) >
//! settings-store value cached for a bounded TTL > hard default. Any
//! store failure fails open to the default: provider selection is never
//! a hard failure point.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::Provider;
use crate::external::SettingsStore;

/// Where the resolved provider came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Env,
    SettingsStore,
    Default,
}

#[derive(Debug, Clone, Copy)]
struct CachedValue {
    provider: Provider,
    fetched_at: Instant,
}

pub struct ProviderResolver {
    store: Arc<dyn SettingsStore>,
    default: Provider,
    ttl: Duration,
    override_var: String,
    // Single shared pair; concurrent refreshes race last-write-wins,
    // which is fine since the value is idempotent within the TTL.
    cache: Mutex<Option<CachedValue>>,
}

impl ProviderResolver {
    pub fn new(store: Arc<dyn SettingsStore>, default: Provider, ttl: Duration) -> Self {
        Self::with_override_var(store, default, ttl, crate::config::PROVIDER_OVERRIDE_VAR)
    }

    /// Same as [`ProviderResolver::new`] with a custom override variable
    /// name. Tests use per-test variable names since the process
    /// environment is global.
    pub fn with_override_var(
        store: Arc<dyn SettingsStore>,
        default: Provider,
        ttl: Duration,
        override_var: impl Into<String>,
    ) -> Self {
        Self {
            store,
            default,
            ttl,
            override_var: override_var.into(),
            cache: Mutex::new(None),
        }
    }

    pub async fn resolve(&self) -> Provider {
        self.resolve_with_source().await.0
    }

    pub async fn resolve_with_source(&self) -> (Provider, ResolutionSource) {
        // 1. Break-glass env override: always wins, never cached.
        if let Some(p) =
            std::env::var(&self.override_var).ok().and_then(|s| Provider::parse(&s))
        {
            return (p, ResolutionSource::Env);
        }

        // 2. Cached settings value within TTL.
        let now = Instant::now();
        if let Some(cached) = *self.cache.lock().expect("provider cache poisoned") {
            if now.duration_since(cached.fetched_at) < self.ttl {
                return (cached.provider, ResolutionSource::SettingsStore);
            }
        }

        // Cache miss or expiry: one store read, failing open.
        match self.store.ai_defaults().await {
            Ok(defaults) => {
                if let Some(p) = defaults.provider.as_deref().and_then(Provider::parse) {
                    *self.cache.lock().expect("provider cache poisoned") =
                        Some(CachedValue { provider: p, fetched_at: now });
                    return (p, ResolutionSource::SettingsStore);
                }
                tracing::debug!("settings store has no usable provider, using default");
            }
            Err(e) => {
                tracing::warn!("settings store read failed, using default provider: {}", e);
            }
        }

        // 3. Hard default.
        (self.default, ResolutionSource::Default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SettingsError;
    use crate::external::AiDefaults;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        value: Result<Option<&'static str>, ()>,
        reads: AtomicUsize,
    }

    impl CountingStore {
        fn returning(value: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self { value: Ok(value), reads: AtomicUsize::new(0) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { value: Err(()), reads: AtomicUsize::new(0) })
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SettingsStore for CountingStore {
        async fn ai_defaults(&self) -> Result<AiDefaults, SettingsError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.value {
                Ok(v) => Ok(AiDefaults { provider: v.map(str::to_string) }),
                Err(()) => Err(SettingsError::Transport("store unreachable".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_override_always_wins() {
        let var = "MODELGATE_TEST_OVERRIDE_WINS";
        std::env::set_var(var, "anthropic");

        let store = CountingStore::returning(Some("openai"));
        let resolver = ProviderResolver::with_override_var(
            store.clone(),
            Provider::Gemini,
            Duration::from_secs(60),
            var,
        );

        let (provider, source) = resolver.resolve_with_source().await;
        assert_eq!(provider, Provider::Anthropic);
        assert_eq!(source, ResolutionSource::Env);
        // Override short-circuits before any store read.
        assert_eq!(store.reads(), 0);

        // Removing the override surfaces the store value; removing the
        // store value would surface the default.
        std::env::remove_var(var);
        let (provider, source) = resolver.resolve_with_source().await;
        assert_eq!(provider, Provider::OpenAi);
        assert_eq!(source, ResolutionSource::SettingsStore);
    }

    #[tokio::test]
    async fn test_unknown_override_value_is_ignored() {
        let var = "MODELGATE_TEST_OVERRIDE_UNKNOWN";
        std::env::set_var(var, "not-a-provider");

        let store = CountingStore::returning(None);
        let resolver = ProviderResolver::with_override_var(
            store,
            Provider::Gemini,
            Duration::from_secs(60),
            var,
        );

        let (provider, source) = resolver.resolve_with_source().await;
        assert_eq!(provider, Provider::Gemini);
        assert_eq!(source, ResolutionSource::Default);
        std::env::remove_var(var);
    }

    #[tokio::test]
    async fn test_cache_ttl_single_reread() {
        let store = CountingStore::returning(Some("openai"));
        let resolver = ProviderResolver::with_override_var(
            store.clone(),
            Provider::Gemini,
            Duration::from_secs(60),
            "MODELGATE_TEST_OVERRIDE_UNSET_TTL",
        );

        assert_eq!(resolver.resolve().await, Provider::OpenAi);
        assert_eq!(resolver.resolve().await, Provider::OpenAi);
        // Second resolution within the TTL served from cache.
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn test_expired_cache_triggers_exactly_one_reread() {
        let store = CountingStore::returning(Some("openai"));
        let resolver = ProviderResolver::with_override_var(
            store.clone(),
            Provider::Gemini,
            Duration::ZERO,
            "MODELGATE_TEST_OVERRIDE_UNSET_EXPIRY",
        );

        assert_eq!(resolver.resolve().await, Provider::OpenAi);
        assert_eq!(store.reads(), 1);
        assert_eq!(resolver.resolve().await, Provider::OpenAi);
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn test_fail_open_on_store_error() {
        let store = CountingStore::failing();
        let resolver = ProviderResolver::with_override_var(
            store,
            Provider::Gemini,
            Duration::from_secs(60),
            "MODELGATE_TEST_OVERRIDE_UNSET_FAILOPEN",
        );

        let (provider, source) = resolver.resolve_with_source().await;
        assert_eq!(provider, Provider::Gemini);
        assert_eq!(source, ResolutionSource::Default);
    }

    #[tokio::test]
    async fn test_missing_store_value_uses_default() {
        let store = CountingStore::returning(None);
        let resolver = ProviderResolver::with_override_var(
            store,
            Provider::Anthropic,
            Duration::from_secs(60),
            "MODELGATE_TEST_OVERRIDE_UNSET_MISSING",
        );

        assert_eq!(resolver.resolve().await, Provider::Anthropic);
    }
}
