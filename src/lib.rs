//! DualBarrierTrader Library
//!
//! Trades paired higher/lower barrier contracts on the Deriv WebSocket API:
//! a protocol client with request correlation and reconnection, a trade
//! engine running the auto-trading loop, and martingale risk sizing.

pub mod common;
pub mod config;
pub mod deriv;
pub mod engine;
pub mod strategy;

// Re-export commonly used types
pub use common::channels::{ChannelKind, Subscription, SubscriptionKey};
pub use common::errors::{ClientError, Result};
pub use common::traits::TradingApi;
pub use common::types::{
    AccountInfo, ConnectionStatus, ContractSide, MarketData, PairStatus, SessionStats,
    SettlementOutcome, Trade, TradePair, TradeStatus, TradingState,
};
pub use config::types::{AppConfig, AppSettings, DerivConfig, MarketConfig};
pub use deriv::{ConnectionSettings, DerivClient, DerivWebSocketClient};
pub use engine::TradeEngine;

// Strategy types
pub use strategy::{
    can_execute_trade, leg_stake, martingale_stake, recommended_stake, validate_barriers, BarrierValidation,
    BarrierViolation, RiskCalculation, TradeConfig,
};
