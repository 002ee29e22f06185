// Configuration management for the test proxy

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub cert_file: String,
    pub key_file: String,
    #[serde(default)]
    pub log_private: bool,
    #[serde(default)]
    pub log_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KrakenConfig {
    #[serde(default = "default_url_private")]
    pub url_private: String,
    #[serde(default = "default_url_public")]
    pub url_public: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl KrakenConfig {
    /// Deadline applied to every upstream send and receive
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn url(&self, private: bool) -> &str {
        if private {
            &self.url_private
        } else {
            &self.url_public
        }
    }
}

/// Substring rule deciding whether a relayed message is written to the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub match_on: String,
    #[serde(default)]
    pub filter_out: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeInterceptConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_fee_ratio")]
    pub fee_ratio: f64,
    /// Fill against the simulated book instead of on the add_order ack
    #[serde(default)]
    pub match_order_book: bool,
    #[serde(default)]
    pub log_filters: Vec<LogFilter>,
}

impl Default for TradeInterceptConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            fee_ratio: default_fee_ratio(),
            match_order_book: false,
            log_filters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderbookConfig {
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub kraken: KrakenConfig,
    #[serde(default)]
    pub trade_intercept: TradeInterceptConfig,
    #[serde(default)]
    pub orderbook: OrderbookConfig,
}

// Default value functions
fn default_listen_addr() -> String { "0.0.0.0:8443".to_string() }
fn default_url_private() -> String { "wss://ws-auth.kraken.com/v2".to_string() }
fn default_url_public() -> String { "wss://ws.kraken.com/v2".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_fee_ratio() -> f64 { 0.0026 }
fn default_enabled() -> bool { true }

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                listen_addr: default_listen_addr(),
                cert_file: "${HOME}/.kraken-proxy/proxy.crt".to_string(),
                key_file: "${HOME}/.kraken-proxy/proxy.key".to_string(),
                log_private: true,
                log_public: false,
            },
            kraken: KrakenConfig {
                url_private: default_url_private(),
                url_public: default_url_public(),
                timeout_secs: default_timeout_secs(),
            },
            trade_intercept: TradeInterceptConfig {
                log_filters: vec![LogFilter {
                    match_on: "\"channel\":\"heartbeat\"".to_string(),
                    filter_out: true,
                }],
                ..TradeInterceptConfig::default()
            },
            orderbook: OrderbookConfig {
                symbols: vec!["BTC/USD".to_string()],
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        Self::from_toml_str(&content)
    }

    /// Parse, expand and validate configuration held in memory
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.expand()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            info!("Created default config file: {}", path.as_ref().display());
            Self::from_file(path)
        }
    }

    /// Substitute `$VAR` / `${VAR}` references in paths and URLs
    fn expand(&mut self) -> Result<(), ConfigError> {
        self.server.cert_file = expand_env(&self.server.cert_file)?;
        self.server.key_file = expand_env(&self.server.key_file)?;
        self.kraken.url_private = expand_env(&self.kraken.url_private)?;
        self.kraken.url_public = expand_env(&self.kraken.url_public)?;
        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_addr.is_empty() {
            return Err(ConfigError::Validation("listen_addr must not be empty".to_string()));
        }

        if self.kraken.url_private.is_empty() || self.kraken.url_public.is_empty() {
            return Err(ConfigError::Validation("kraken urls must not be empty".to_string()));
        }

        if self.kraken.timeout_secs == 0 {
            return Err(ConfigError::Validation("timeout_secs must be greater than 0".to_string()));
        }

        let fee_ratio = self.trade_intercept.fee_ratio;
        if !(0.0..1.0).contains(&fee_ratio) {
            return Err(ConfigError::Validation("fee_ratio must be in [0, 1)".to_string()));
        }

        if self.trade_intercept.match_order_book && self.orderbook.symbols.is_empty() {
            return Err(ConfigError::Validation(
                "match_order_book needs at least one symbol in [orderbook]".to_string()
            ));
        }

        if let Some(filter) = self.trade_intercept.log_filters.iter().find(|f| f.match_on.is_empty()) {
            return Err(ConfigError::Validation(format!(
                "log filter with filter_out = {} has an empty match_on",
                filter.filter_out
            )));
        }

        for symbol in &self.orderbook.symbols {
            if symbol.split_once('/').is_none() {
                return Err(ConfigError::Validation(format!(
                    "symbol '{}' is not in BASE/QUOTE form",
                    symbol
                )));
            }
        }

        Ok(())
    }
}

fn expand_env(value: &str) -> Result<String, ConfigError> {
    shellexpand::env(value)
        .map(|expanded| expanded.into_owned())
        .map_err(|e| ConfigError::Validation(format!("cannot expand '{}': {}", value, e)))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
