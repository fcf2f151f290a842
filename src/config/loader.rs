//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{ClientError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP__)
/// 2. Deriv environment variables (DERIV_API_TOKEN, DERIV_APP_ID, ...)
/// 3. Configuration file (TOML format)
/// 4. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(deriv_env_source()?);

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ClientError::Configuration(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ClientError::Configuration(e.to_string()))?;
    app_config.trading.validate()?;
    Ok(app_config)
}

/// The conventional `DERIV_*` variables, mapped onto the `deriv` table
fn deriv_env_source() -> Result<Config> {
    let env = |name: &str| std::env::var(name).ok();
    Config::builder()
        .set_override_option("deriv.websocket_url", env("DERIV_WS_URL"))
        .and_then(|b| b.set_override_option("deriv.app_id", env("DERIV_APP_ID")))
        .and_then(|b| b.set_override_option("deriv.api_token", env("DERIV_API_TOKEN")))
        .and_then(|b| b.build())
        .map_err(|e| ClientError::Configuration(e.to_string()))
}

/// Load configuration from environment variables only
pub fn load_from_env() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut app_config = AppConfig::default();
    if let Ok(url) = std::env::var("DERIV_WS_URL") {
        app_config.deriv.websocket_url = url;
    }
    if let Ok(app_id) = std::env::var("DERIV_APP_ID") {
        app_config.deriv.app_id = app_id
            .parse()
            .map_err(|_| ClientError::Configuration(format!("invalid DERIV_APP_ID: {}", app_id)))?;
    }
    app_config.deriv.api_token = std::env::var("DERIV_API_TOKEN").ok();
    if let Ok(symbol) = std::env::var("DERIV_SYMBOL") {
        app_config.trading.symbol = symbol;
    }

    app_config.trading.validate()?;
    Ok(app_config)
}
