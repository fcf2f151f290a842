//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::common::errors::{ClientError, Result};
use crate::strategy::types::TradeConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Venue endpoint and credentials
    #[serde(default)]
    pub deriv: DerivConfig,
    /// Parameters for each trading cycle
    #[serde(default)]
    pub trading: TradeConfig,
    /// Markets the bot may trade
    #[serde(default = "default_markets")]
    pub markets: Vec<MarketConfig>,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            deriv: DerivConfig::default(),
            trading: TradeConfig::default(),
            markets: default_markets(),
            settings: AppSettings::default(),
        }
    }
}

impl AppConfig {
    /// Look up a configured market by symbol
    pub fn market(&self, symbol: &str) -> Option<&MarketConfig> {
        self.markets.iter().find(|m| m.symbol == symbol)
    }
}

/// Deriv platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivConfig {
    /// WebSocket URL for the API
    #[serde(default = "default_deriv_ws_url")]
    pub websocket_url: String,
    /// Registered application id, sent as a query parameter
    #[serde(default = "default_app_id")]
    pub app_id: u32,
    /// API token used to authorize the session
    #[serde(default)]
    pub api_token: Option<String>,
}

impl DerivConfig {
    /// Connection URL with the `app_id` query parameter
    pub fn endpoint(&self) -> Result<String> {
        let app_id = self.app_id.to_string();
        Url::parse_with_params(&self.websocket_url, &[("app_id", app_id.as_str())])
            .map(String::from)
            .map_err(|e| ClientError::Configuration(format!("invalid websocket_url: {}", e)))
    }
}

impl Default for DerivConfig {
    fn default() -> Self {
        Self {
            websocket_url: default_deriv_ws_url(),
            app_id: default_app_id(),
            api_token: None,
        }
    }
}

fn default_deriv_ws_url() -> String {
    "wss://ws.derivws.com/websockets/v3".to_string()
}

fn default_app_id() -> u32 {
    1089
}

/// Static description of a tradable market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub symbol: String,
    pub display_name: String,
    pub pip_size: Decimal,
    pub min_barrier: Decimal,
    pub max_barrier: Decimal,
    pub min_stake: Decimal,
    pub max_stake: Decimal,
}

impl MarketConfig {
    fn volatility_index(level: u32, pip_size: Decimal) -> Self {
        Self {
            symbol: format!("R_{}", level),
            display_name: format!("Volatility {} Index", level),
            pip_size,
            min_barrier: dec!(0.1),
            max_barrier: dec!(10.0),
            min_stake: dec!(0.35),
            max_stake: dec!(2000),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self::volatility_index(100, dec!(0.01))
    }
}

fn default_markets() -> Vec<MarketConfig> {
    vec![
        MarketConfig::volatility_index(10, dec!(0.001)),
        MarketConfig::volatility_index(25, dec!(0.001)),
        MarketConfig::volatility_index(50, dec!(0.0001)),
        MarketConfig::volatility_index(75, dec!(0.0001)),
        MarketConfig::volatility_index(100, dec!(0.01)),
    ]
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Bound on opening the transport
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Bound on waiting for a correlated reply
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Interval between keep-alive pings
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_seconds: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Reconnect attempt `n` waits this many milliseconds times `2^n`
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            connect_timeout_seconds: default_connect_timeout(),
            request_timeout_seconds: default_request_timeout(),
            keepalive_interval_seconds: default_keepalive_interval(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_keepalive_interval() -> u64 {
    30
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay() -> u64 {
    1000
}
