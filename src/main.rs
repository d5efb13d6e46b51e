//! Maya gateway server entry point.

use anyhow::Context;
use dotenvy::dotenv;
use mimalloc::MiMalloc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use maya_gateway::AppState;
use maya_gateway::config::AppConfig;
use maya_gateway::server::start_server;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env before clap so env fallbacks see it
    let _ = dotenv();

    let config = AppConfig::load().context("loading configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log.json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }

    if config.generation.api_key.is_none() {
        tracing::warn!(
            name: "generation.key.missing",
            "No generation API key configured; chat replies will fail"
        );
    }

    let state = AppState::from_config(config)
        .await
        .context("initializing application state")?;

    start_server(state).await
}
