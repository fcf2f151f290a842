//! Error types for the application

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Main error type for client and engine operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// The transport never opened (refused, errored or timed out)
    #[error("WebSocket connection error: {0}")]
    Connect(String),

    /// Automatic reconnection gave up
    #[error("Reconnection abandoned after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// No reply carrying the request's correlation id arrived in time
    #[error("Request {req_id} timed out after {timeout:?}")]
    RequestTimeout { req_id: u64, timeout: Duration },

    /// The venue rejected the request
    #[error("Remote error {code}: {message}")]
    Remote { code: String, message: String },

    /// The connection went away while a call was outstanding, or was never open
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Authorization or the initial balance fetch failed
    #[error("Initialization failed: {0}")]
    Init(String),

    /// The venue does not offer the requested symbol
    #[error("Market unavailable: {0}")]
    MarketUnavailable(String),

    /// Operation attempted without the required prior state
    #[error("Not ready: {0}")]
    NotReady(String),

    /// The available balance does not cover both legs of the next pair
    #[error("Insufficient available balance: {required} needed, {available} available")]
    InsufficientBalance { required: Decimal, available: Decimal },

    /// One or both legs of a pair failed to price or buy
    #[error("Trade submission failed: {0}")]
    TradeSubmissionFailed(String),

    /// A trading cycle is already running
    #[error("Auto-trading is already running")]
    AlreadyTrading,

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}
