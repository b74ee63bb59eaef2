//! Configuration parsing and validation for the relay
//!
//! This module handles command-line argument parsing and validation using clap. Every option can
//! also be set through a `RELAY_*` environment variable.
use anthropic_relay::client::PoolConfig;
use anthropic_relay::upstream::{
    ANTHROPIC_MESSAGES_URL, ANTHROPIC_VERSION, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, Upstream,
};
use anyhow::anyhow;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The port on which the relay will listen.
    #[arg(short = 'p', long, env = "RELAY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// The port on which the metrics server will listen.
    #[arg(long, env = "RELAY_METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Whether to enable the metrics endpoint.
    #[arg(short = 'm', long, env = "RELAY_METRICS", default_value_t = true, action = clap::ArgAction::Set)]
    pub metrics: bool,

    /// The prefix to use for metrics.
    #[arg(long, env = "RELAY_METRICS_PREFIX", default_value = "relay")]
    pub metrics_prefix: String,

    /// JSON file listing callers and configuration parameters.
    /// Without one, no caller can authenticate.
    #[arg(short = 'f', long, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Whether we should continue watching the config file for changes
    #[arg(short = 'w', long, env = "RELAY_WATCH", default_value_t = true, action = clap::ArgAction::Set)]
    pub watch: bool,

    /// The Messages API endpoint calls are forwarded to.
    #[arg(long, env = "RELAY_UPSTREAM_URL", default_value = ANTHROPIC_MESSAGES_URL)]
    pub upstream_url: Url,

    /// Model sent with every forwarded call.
    #[arg(long, env = "RELAY_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Token cap sent with every forwarded call.
    #[arg(long, env = "RELAY_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    /// Value of the `anthropic-version` header.
    #[arg(long, env = "RELAY_ANTHROPIC_VERSION", default_value = ANTHROPIC_VERSION)]
    pub anthropic_version: String,

    /// How long (in seconds) to wait for the upstream before failing the call.
    #[arg(long, env = "RELAY_UPSTREAM_TIMEOUT_SECS", default_value_t = 60)]
    pub upstream_timeout_secs: u64,

    /// Maximum number of idle HTTP connections to keep alive per upstream host.
    #[arg(long, env = "RELAY_POOL_MAX_IDLE_PER_HOST", default_value_t = 100)]
    pub pool_max_idle_per_host: usize,

    /// How long (in seconds) to keep idle HTTP connections alive.
    #[arg(long, env = "RELAY_POOL_IDLE_TIMEOUT_SECS", default_value_t = 90)]
    pub pool_idle_timeout_secs: u64,

    /// Route GET /test_claude_api, which sends a fixed request upstream without authentication.
    #[arg(long, env = "RELAY_DIAGNOSTICS", default_value_t = false)]
    pub diagnostics: bool,
}

impl Config {
    pub fn validate(self) -> Result<Self, anyhow::Error> {
        if let Some(path) = &self.config
            && !path.exists()
        {
            return Err(anyhow!("Config file '{}' does not exist", path.display()));
        }
        if self.max_tokens == 0 {
            return Err(anyhow!("--max-tokens must be greater than zero"));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(anyhow!("--upstream-timeout-secs must be greater than zero"));
        }
        Ok(self)
    }

    pub fn upstream(&self) -> Upstream {
        Upstream::builder()
            .url(self.upstream_url.clone())
            .model(self.model.clone())
            .max_tokens(self.max_tokens)
            .api_version(self.anthropic_version.clone())
            .timeout(Duration::from_secs(self.upstream_timeout_secs))
            .build()
    }

    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            max_idle_per_host: self.pool_max_idle_per_host,
            idle_timeout: Duration::from_secs(self.pool_idle_timeout_secs),
        }
    }
}
