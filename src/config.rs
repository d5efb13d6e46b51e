use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::llm::{GenerationSettings, Provider};
use crate::mcp::McpSettings;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (YAML)
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the MCP financial backend
    #[arg(long, env = "MCP_SERVER_URL")]
    pub mcp_url: Option<String>,

    /// Base URL of the text generation API
    #[arg(long, env = "GENERATION_BASE_URL")]
    pub generation_url: Option<String>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub mcp: McpConfig,
    pub generation: GenerationConfig,
    pub resilience: ResilienceConfig,
    pub history: HistoryConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct McpConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    /// `auto`, `gemini` or `openai`.
    pub provider: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub timeout_disabled: bool,
    pub requests_per_second: f32,
    pub burst_size: f32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryProvider {
    Memory,
    File,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    pub provider: HistoryProvider,
    pub dir: PathBuf,
    /// Messages kept per user and sent back as conversation context.
    pub max_messages: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        // 1. Defaults
        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("mcp.base_url", "http://localhost:8080")?
            .set_default("mcp.timeout_secs", 30)?
            .set_default("generation.base_url", "https://generativelanguage.googleapis.com")?
            .set_default("generation.model", "gemini-2.0-flash")?
            .set_default("generation.provider", "auto")?
            .set_default("generation.temperature", 0.7)?
            .set_default("generation.top_k", 40)?
            .set_default("generation.top_p", 0.95)?
            .set_default("generation.max_output_tokens", 1024)?
            .set_default("generation.timeout_secs", 60)?
            .set_default("resilience.rate_limit_enabled", true)?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.requests_per_second", 5.0)?
            .set_default("resilience.burst_size", 10.0)?
            .set_default("resilience.request_timeout_secs", 90)?
            .set_default("history.provider", "memory")?
            .set_default("history.dir", "./data/history")?
            .set_default("history.max_messages", 20)?
            .set_default("log.json", false)?;

        // 2. Config file: explicit path must exist, ./config.yaml is optional
        match &cli.config {
            Some(path) => builder = builder.add_source(File::with_name(path).required(true)),
            None => {
                if Path::new("config.yaml").exists() {
                    builder = builder.add_source(File::with_name("config.yaml").required(false));
                }
            }
        }

        // 3. MAYA_ prefixed environment, e.g. MAYA_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("MAYA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. Credentials under their conventional names
        if let Some(key) = ["GENERATION_API_KEY", "GEMINI_API_KEY"]
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
        {
            builder = builder.set_override("generation.api_key", key)?;
        }

        // 5. CLI flags (clap also reads their env fallbacks)
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(url) = cli.mcp_url {
            builder = builder.set_override("mcp.base_url", url)?;
        }
        if let Some(url) = cli.generation_url {
            builder = builder.set_override("generation.base_url", url)?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }
        if let Some(json) = cli.log_json {
            builder = builder.set_override("log.json", json)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn mcp_settings(&self) -> McpSettings {
        McpSettings {
            base_url: self.mcp.base_url.clone(),
            timeout: Duration::from_secs(self.mcp.timeout_secs),
            ..McpSettings::default()
        }
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        let g = &self.generation;
        GenerationSettings {
            base_url: g.base_url.clone(),
            model: g.model.clone(),
            api_key: g.api_key.clone().filter(|k| !k.trim().is_empty()),
            provider: Provider::from_setting(&g.provider, &g.base_url),
            temperature: g.temperature,
            top_k: g.top_k,
            top_p: g.top_p,
            max_output_tokens: g.max_output_tokens,
            timeout: Duration::from_secs(g.timeout_secs),
        }
    }
}
