//! Deriv module - Protocol client for the Deriv WebSocket API

pub mod client;
pub mod messages;
pub mod websocket;

pub use client::DerivClient;
pub use websocket::{ConnectionSettings, DerivWebSocketClient};
