//! Configuration module for the x402-charge demo server.

use clap::Parser;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Paths the demo server serves without charging.
const RESERVED_PATHS: [&str; 2] = ["/", "/health"];

/// CLI arguments for the demo server.
#[derive(Parser, Debug)]
#[command(name = "x402-charge")]
#[command(about = "Pay-per-request HTTP server gated by x402-charge")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = config_defaults::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

/// Server configuration.
///
/// Fields use serde defaults that fall back to environment variables,
/// then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default)]
    payment_service: PaymentServiceConfig,
    #[serde(default = "config_defaults::default_network")]
    network: String,
    #[serde(default = "config_defaults::default_verifications_per_minute")]
    verifications_per_minute: usize,
    #[serde(default = "config_defaults::default_replay_capacity")]
    replay_capacity: usize,
    #[serde(default = "config_defaults::default_routes")]
    routes: Vec<RouteConfig>,
}

/// Where and how to reach the payment service.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentServiceConfig {
    #[serde(default = "config_defaults::default_payment_service_url")]
    url: String,
    /// Bearer credential. Never leaves the server.
    #[serde(default = "config_defaults::default_payment_service_api_key")]
    api_key: String,
    #[serde(default = "config_defaults::default_timeout_secs")]
    timeout_secs: u64,
}

impl Default for PaymentServiceConfig {
    fn default() -> Self {
        Self {
            url: config_defaults::default_payment_service_url(),
            api_key: config_defaults::default_payment_service_api_key(),
            timeout_secs: config_defaults::default_timeout_secs(),
        }
    }
}

impl PaymentServiceConfig {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One protected route.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    pub path: String,
    /// Price in joules. Must be positive.
    pub amount: u64,
    /// Recipient handle, e.g. `@merchant`.
    pub recipient: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};

    use super::RouteConfig;

    pub const DEFAULT_CONFIG_PATH: &str = "config.json";
    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    pub const DEFAULT_PAYMENT_SERVICE_URL: &str = "http://localhost:4000/api/payments";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

    /// Returns the default port value with fallback: $PORT env var -> 3000
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HOST)
    }

    /// $PAYMENT_SERVICE_URL -> local payment service
    pub fn default_payment_service_url() -> String {
        env::var("PAYMENT_SERVICE_URL").unwrap_or_else(|_| DEFAULT_PAYMENT_SERVICE_URL.to_string())
    }

    /// $PAYMENT_SERVICE_API_KEY -> empty
    pub fn default_payment_service_api_key() -> String {
        env::var("PAYMENT_SERVICE_API_KEY").unwrap_or_default()
    }

    pub fn default_timeout_secs() -> u64 {
        DEFAULT_TIMEOUT_SECS
    }

    /// $X402_NETWORK -> "joule-ledger"
    pub fn default_network() -> String {
        env::var("X402_NETWORK")
            .unwrap_or_else(|_| x402_charge_types::proto::DEFAULT_NETWORK.to_string())
    }

    pub fn default_verifications_per_minute() -> usize {
        x402_charge_axum::rate_limit::RateWindow::DEFAULT_LIMIT
    }

    pub fn default_replay_capacity() -> usize {
        x402_charge_axum::replay_cache::ReplayCache::DEFAULT_CAPACITY
    }

    /// A single `/premium` route paying 100 joules to $RECIPIENT (or `@merchant`).
    pub fn default_routes() -> Vec<RouteConfig> {
        vec![RouteConfig {
            path: "/premium".to_string(),
            amount: 100,
            recipient: env::var("RECIPIENT").unwrap_or_else(|_| "@merchant".to_string()),
            description: Some("Premium content".to_string()),
        }]
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Route {path:?}: {reason}")]
    InvalidRoute { path: String, reason: &'static str },
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn payment_service(&self) -> &PaymentServiceConfig {
        &self.payment_service
    }

    /// Network tag advertised in `402` bodies.
    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn verifications_per_minute(&self) -> usize {
        self.verifications_per_minute
    }

    pub fn replay_capacity(&self) -> usize {
        self.replay_capacity
    }

    pub fn routes(&self) -> &[RouteConfig] {
        &self.routes
    }

    /// Load configuration from CLI arguments and JSON file.
    ///
    /// The config file path is determined by:
    /// 1. `--config <path>` CLI argument or `$CONFIG`
    /// 2. `./config.json`
    ///
    /// A missing `./config.json` is not an error: every value then comes from
    /// environment variables or defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        if cli_args.config == Path::new(config_defaults::DEFAULT_CONFIG_PATH)
            && !cli_args.config.exists()
        {
            return Self::from_json("{}");
        }
        Self::load_from_path(cli_args.config)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        Self::from_json(&content)
    }

    fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for route in &self.routes {
            let invalid = |reason| ConfigError::InvalidRoute {
                path: route.path.clone(),
                reason,
            };
            if !route.path.starts_with('/') {
                return Err(invalid("path must start with '/'"));
            }
            if RESERVED_PATHS.contains(&route.path.as_str()) {
                return Err(invalid("path is served for free"));
            }
            if !seen.insert(route.path.as_str()) {
                return Err(invalid("path is configured twice"));
            }
            if route.amount == 0 {
                return Err(invalid("amount must be positive"));
            }
            if x402_charge_types::recipient::normalize_handle(&route.recipient).is_empty() {
                return Err(invalid("recipient must not be empty"));
            }
        }
        Ok(())
    }
}
