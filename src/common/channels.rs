//! Channel type definitions for push delivery and state snapshots

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use tokio::sync::{mpsc, watch};
use tracing::warn;

use super::types::{ConnectionStatus, TradingState};

/// Class of unsolicited push messages, keyed by the venue's `msg_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Tick,
    Balance,
    Portfolio,
    ProposalOpenContract,
}

impl ChannelKind {
    pub fn from_msg_type(msg_type: &str) -> Option<Self> {
        match msg_type {
            "tick" => Some(ChannelKind::Tick),
            "balance" => Some(ChannelKind::Balance),
            "portfolio" => Some(ChannelKind::Portfolio),
            "proposal_open_contract" => Some(ChannelKind::ProposalOpenContract),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Tick => write!(f, "tick"),
            ChannelKind::Balance => write!(f, "balance"),
            ChannelKind::Portfolio => write!(f, "portfolio"),
            ChannelKind::ProposalOpenContract => write!(f, "proposal_open_contract"),
        }
    }
}

/// Subscriptions are keyed by kind and an optional sub-key (symbol, contract id).
///
/// A key without a sub-key receives every push of its kind that no keyed
/// subscription claimed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub kind: ChannelKind,
    pub sub_key: Option<String>,
}

impl SubscriptionKey {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind, sub_key: None }
    }

    pub fn with_sub_key(kind: ChannelKind, sub_key: impl Into<String>) -> Self {
        Self {
            kind,
            sub_key: Some(sub_key.into()),
        }
    }

    pub fn ticks(symbol: &str) -> Self {
        Self::with_sub_key(ChannelKind::Tick, symbol)
    }

    /// The kind-wide key this key falls back to
    pub fn wildcard(&self) -> Self {
        Self::new(self.kind)
    }

    /// Classify an inbound frame, if it is a push kind we route
    pub fn from_message(message: &Value) -> Option<Self> {
        let kind = ChannelKind::from_msg_type(message.get("msg_type")?.as_str()?)?;
        let sub_key = match kind {
            ChannelKind::Tick => message
                .pointer("/tick/symbol")
                .and_then(Value::as_str)
                .map(str::to_owned),
            ChannelKind::ProposalOpenContract => message
                .pointer("/proposal_open_contract/contract_id")
                .and_then(Value::as_u64)
                .map(|id| id.to_string()),
            ChannelKind::Balance | ChannelKind::Portfolio => None,
        };
        Some(Self { kind, sub_key })
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sub_key {
            Some(sub_key) => write!(f, "{}:{}", self.kind, sub_key),
            None => write!(f, "{}:*", self.kind),
        }
    }
}

/// Typed view over a subscription's push messages
#[derive(Debug)]
pub struct Subscription<T> {
    key: SubscriptionKey,
    subscription_id: Option<String>,
    receiver: mpsc::UnboundedReceiver<Value>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
    pub fn new(
        key: SubscriptionKey,
        subscription_id: Option<String>,
        receiver: mpsc::UnboundedReceiver<Value>,
    ) -> Self {
        Self {
            key,
            subscription_id,
            receiver,
            _payload: PhantomData,
        }
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Venue-side subscription id, used to `forget` the stream
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    /// Next push that deserializes into `T`.
    ///
    /// Returns `None` once the subscription is replaced, removed or the
    /// client is disconnected.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let message = self.receiver.recv().await?;
            match serde_json::from_value(message) {
                Ok(payload) => return Some(payload),
                Err(e) => warn!(key = %self.key, error = %e, "Skipping unparseable push message"),
            }
        }
    }
}

/// Create the channel the engine publishes state snapshots on.
///
/// Holds only the latest state; a slow observer skips intermediate snapshots.
pub fn create_snapshot_channel() -> (watch::Sender<TradingState>, watch::Receiver<TradingState>) {
    watch::channel(TradingState::default())
}

/// Create the channel the protocol client publishes connection status on
pub fn create_status_channel() -> (
    mpsc::UnboundedSender<ConnectionStatus>,
    mpsc::UnboundedReceiver<ConnectionStatus>,
) {
    mpsc::unbounded_channel()
}
