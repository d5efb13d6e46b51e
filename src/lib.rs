//! Maya banking assistant gateway
//!
//! An HTTP service that answers free-text financial questions by selecting
//! backend tools with keyword rules, calling them over MCP, and grounding a
//! text-generation call in their results.
//!
//! # Architecture
//!
//! - **Server**: Axum routes for chat, plans, dashboard data, login and history
//! - **Classifier**: declarative keyword rules mapping messages to tool calls
//! - **MCP Client**: JSON-RPC over HTTP with lazy, per-request sessions
//! - **Generation**: Gemini or OpenAI-compatible drivers behind one trait
//!
//! # Modules
//!
//! - [`classifier`]: intent classification and scenario argument derivation
//! - [`mcp`]: remote tool invocation
//! - [`context`]: grounding context and prompt assembly
//! - [`llm`]: generation drivers and the request orchestrator
//! - [`history`]: per-user chat history stores

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod auth;
pub mod classifier;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod history;
pub mod llm;
pub mod mcp;
pub mod payload;
pub mod plan;
pub mod rate_limit;
pub mod server;

use std::sync::Arc;

use anyhow::Context;

use crate::config::{AppConfig, HistoryProvider};
use crate::history::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
use crate::llm::{Orchestrator, build_driver};
use crate::mcp::{McpClient, McpSession};
use crate::rate_limit::TokenBucket;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Chat pipeline: classifier, MCP calls, generation.
    pub orchestrator: Arc<Orchestrator>,
    /// Per-user chat history.
    pub history: Arc<dyn HistoryStore>,
    /// Session used by the raw JSON-RPC proxy endpoint.
    pub proxy: Arc<McpSession>,
    /// Global rate limiter
    pub rate_limiter: Arc<TokenBucket>,
    /// Global configuration
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let mcp = McpClient::new(config.mcp_settings()).context("building MCP client")?;
        let driver =
            build_driver(config.generation_settings()).context("building generation driver")?;

        let history: Arc<dyn HistoryStore> = match config.history.provider {
            HistoryProvider::Memory => Arc::new(MemoryHistoryStore::new()),
            HistoryProvider::File => Arc::new(
                FileHistoryStore::open(&config.history.dir)
                    .await
                    .with_context(|| {
                        format!("opening history dir {}", config.history.dir.display())
                    })?,
            ),
        };

        let proxy = Arc::new(mcp.session());
        let rate_limiter = Arc::new(TokenBucket::new(
            config.resilience.requests_per_second,
            config.resilience.burst_size,
        ));
        let orchestrator = Arc::new(Orchestrator::new(mcp, driver, config.history.max_messages));

        Ok(Self {
            orchestrator,
            history,
            proxy,
            rate_limiter,
            config: Arc::new(config),
        })
    }
}
