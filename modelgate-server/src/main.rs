//! Modelgate Server - Headless Daemon
//!
//! A pure Rust HTTP server that runs the AI admission-control gateway:
//! rate limiting, quota enforcement, provider resolution and failure
//! normalization in front of the upstream AI vendors.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use modelgate_core::clients::{HttpAuthVerifier, HttpSettingsStore, HttpUsageOracle, HttpVendor};
use modelgate_core::external::Vendor;
use modelgate_core::gateway::Gateway;
use modelgate_core::{GatewayConfig, Provider};

mod api;
mod cli;
mod router;
mod state;

use cli::Cli;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let config = GatewayConfig::from_env();
    info!(
        default_provider = %config.default_provider,
        rate_max = config.rate_limit.max_count,
        "starting modelgate on port {}...",
        cli.port
    );

    let verifier = Arc::new(HttpAuthVerifier::new(env_or(
        "MODELGATE_AUTH_VERIFY_URL",
        "http://127.0.0.1:8790/auth/verify",
    )));
    let store = Arc::new(HttpSettingsStore::new(env_or(
        "MODELGATE_SETTINGS_URL",
        "http://127.0.0.1:8790/settings/ai-defaults",
    )));
    let oracle = Arc::new(HttpUsageOracle::new(env_or(
        "MODELGATE_USAGE_URL",
        "http://127.0.0.1:8790",
    )));

    let mut vendors: HashMap<Provider, Arc<dyn Vendor>> = HashMap::new();
    for (provider, key_var) in [
        (Provider::Gemini, "GEMINI_API_KEY"),
        (Provider::OpenAi, "OPENAI_API_KEY"),
        (Provider::Anthropic, "ANTHROPIC_API_KEY"),
    ] {
        let api_key = std::env::var(key_var).unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("{} is not set; {} calls will fail", key_var, provider);
        }
        vendors.insert(provider, Arc::new(HttpVendor::new(provider, api_key)));
    }

    let gateway = Arc::new(Gateway::new(config, verifier, store, oracle, vendors));
    let app = router::build_router(AppState::new(gateway));

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("gateway listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}
