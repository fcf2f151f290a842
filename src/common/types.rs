//! Account, market and trade state shared between the engine and its observers

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::types::MarketConfig;
use crate::strategy::analytics;

/// Which way a leg of a pair bets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractSide {
    Higher,
    Lower,
}

impl ContractSide {
    /// Venue contract type for this side
    pub fn contract_type(&self) -> &'static str {
        match self {
            ContractSide::Higher => "CALL",
            ContractSide::Lower => "PUT",
        }
    }

    /// Apply this side's sign to a barrier magnitude
    pub fn signed_barrier(&self, magnitude: Decimal) -> Decimal {
        match self {
            ContractSide::Higher => magnitude.abs(),
            ContractSide::Lower => -magnitude.abs(),
        }
    }
}

impl std::fmt::Display for ContractSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractSide::Higher => write!(f, "higher"),
            ContractSide::Lower => write!(f, "lower"),
        }
    }
}

/// Lifecycle of a single leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Active,
    Won,
    Lost,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeStatus::Won | TradeStatus::Lost)
    }
}

/// Lifecycle of a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairStatus {
    Pending,
    Active,
    Completed,
}

/// Account snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: Decimal,
    pub currency: String,
    pub login_id: String,
    /// `balance - locked_balance`, never below zero
    pub available_balance: Decimal,
    pub locked_balance: Decimal,
}

impl AccountInfo {
    pub fn new(balance: Decimal, currency: impl Into<String>, login_id: impl Into<String>) -> Self {
        let mut account = Self {
            balance,
            currency: currency.into(),
            login_id: login_id.into(),
            available_balance: Decimal::ZERO,
            locked_balance: Decimal::ZERO,
        };
        account.recompute_available();
        account
    }

    pub fn update_balance(&mut self, balance: Decimal) {
        self.balance = balance;
        self.recompute_available();
    }

    /// Negative amounts lock nothing
    pub fn set_locked_balance(&mut self, amount: Decimal) {
        self.locked_balance = amount.max(Decimal::ZERO);
        self.recompute_available();
    }

    fn recompute_available(&mut self) {
        self.available_balance = (self.balance - self.locked_balance).max(Decimal::ZERO);
    }
}

/// The market currently being watched and traded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: String,
    pub display_name: String,
    pub pip_size: Decimal,
    pub current_price: Option<Decimal>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub min_barrier: Decimal,
    pub max_barrier: Decimal,
    pub min_stake: Decimal,
    pub max_stake: Decimal,
}

impl MarketData {
    pub fn from_config(config: &MarketConfig, current_price: Option<Decimal>) -> Self {
        Self {
            symbol: config.symbol.clone(),
            display_name: config.display_name.clone(),
            pip_size: config.pip_size,
            current_price,
            last_tick_at: current_price.map(|_| Utc::now()),
            min_barrier: config.min_barrier,
            max_barrier: config.max_barrier,
            min_stake: config.min_stake,
            max_stake: config.max_stake,
        }
    }

    /// Clamp a barrier magnitude into this market's accepted range
    pub fn clamp_barrier(&self, magnitude: Decimal) -> Decimal {
        magnitude.abs().max(self.min_barrier).min(self.max_barrier)
    }

    pub fn apply_tick(&mut self, quote: Decimal, at: DateTime<Utc>) {
        self.current_price = Some(quote);
        self.last_tick_at = Some(at);
    }
}

/// One leg of a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub side: ContractSide,
    pub stake: Decimal,
    /// Positive for `higher`, negative for `lower`
    pub barrier: Decimal,
    pub symbol: String,
    pub status: TradeStatus,
    pub payout: Option<Decimal>,
    pub profit: Option<Decimal>,
    pub contract_id: Option<u64>,
}

impl Trade {
    pub fn pending(
        side: ContractSide,
        stake: Decimal,
        barrier_magnitude: Decimal,
        symbol: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at,
            side,
            stake,
            barrier: side.signed_barrier(barrier_magnitude),
            symbol: symbol.into(),
            status: TradeStatus::Pending,
            payout: None,
            profit: None,
            contract_id: None,
        }
    }

    /// Record the venue's confirmation of the buy
    pub fn activate(&mut self, contract_id: u64, payout: Decimal) {
        self.contract_id = Some(contract_id);
        self.payout = Some(payout);
        self.status = TradeStatus::Active;
    }
}

/// What happened when a settlement was applied to a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegSettlement {
    /// The leg was already terminal
    Ignored,
    /// The leg settled, the other leg is still open
    Recorded,
    /// Both legs are now terminal; carries the combined profit
    Completed(Decimal),
}

/// Two legs placed together on the same market and duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePair {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub higher: Trade,
    pub lower: Trade,
    pub total_stake: Decimal,
    pub total_profit: Option<Decimal>,
    pub status: PairStatus,
}

impl TradePair {
    /// Build a pending pair with both legs sharing one timestamp
    pub fn pending(
        symbol: &str,
        stake: Decimal,
        positive_barrier: Decimal,
        negative_barrier: Decimal,
    ) -> Self {
        let created_at = Utc::now();
        let higher = Trade::pending(ContractSide::Higher, stake, positive_barrier, symbol, created_at);
        let lower = Trade::pending(ContractSide::Lower, stake, negative_barrier, symbol, created_at);
        Self {
            id: Uuid::new_v4(),
            created_at,
            total_stake: higher.stake + lower.stake,
            higher,
            lower,
            total_profit: None,
            status: PairStatus::Pending,
        }
    }

    pub fn contains(&self, contract_id: u64) -> bool {
        self.higher.contract_id == Some(contract_id) || self.lower.contract_id == Some(contract_id)
    }

    pub fn mark_active(&mut self) {
        if self.higher.status == TradeStatus::Active && self.lower.status == TradeStatus::Active {
            self.status = PairStatus::Active;
        }
    }

    /// Settle the leg holding `contract_id`.
    ///
    /// The pair completes exactly once, when both legs are terminal, and its
    /// total profit is fixed at that moment.
    pub fn settle_leg(&mut self, contract_id: u64, profit: Decimal, won: bool) -> LegSettlement {
        let leg = if self.higher.contract_id == Some(contract_id) {
            &mut self.higher
        } else if self.lower.contract_id == Some(contract_id) {
            &mut self.lower
        } else {
            return LegSettlement::Ignored;
        };

        if leg.status.is_terminal() {
            return LegSettlement::Ignored;
        }
        leg.status = if won { TradeStatus::Won } else { TradeStatus::Lost };
        leg.profit = Some(profit);

        if self.status == PairStatus::Completed
            || !self.higher.status.is_terminal()
            || !self.lower.status.is_terminal()
        {
            return LegSettlement::Recorded;
        }

        let total = self.higher.profit.unwrap_or_default() + self.lower.profit.unwrap_or_default();
        self.total_profit = Some(total);
        self.status = PairStatus::Completed;
        LegSettlement::Completed(total)
    }
}

/// Result of routing a settlement event through the trading state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    UnknownContract,
    AlreadySettled,
    LegSettled,
    PairCompleted { total_profit: Decimal },
}

/// Connection status for the protocol client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Successfully connected
    Connected,
    /// Disconnected (with optional reason)
    Disconnected(Option<String>),
    /// Waiting `delay` before reconnect attempt `attempt`
    Reconnecting {
        attempt: u32,
        delay: std::time::Duration,
    },
    /// Automatic reconnection gave up
    ReconnectExhausted { attempts: u32 },
}

/// Aggregate counters derived from trade history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub completed_pairs: usize,
    pub winning_pairs: usize,
    pub losing_pairs: usize,
    pub win_rate: Decimal,
    pub net_profit: Decimal,
}

/// The single mutable aggregate owned by the trade engine.
///
/// Observers receive a clone of it after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingState {
    pub is_connected: bool,
    pub is_trading: bool,
    pub account: Option<AccountInfo>,
    pub market: Option<MarketData>,
    /// Most recent first
    pub trade_pairs: Vec<TradePair>,
    pub total_profit: Decimal,
    pub total_loss: Decimal,
    pub consecutive_losses: u32,
    /// Why the auto-trading loop last stopped itself
    pub last_error: Option<String>,
}

impl TradingState {
    pub fn record_pair(&mut self, pair: TradePair) {
        self.trade_pairs.insert(0, pair);
    }

    /// Apply a settlement to whichever pair owns `contract_id`.
    ///
    /// Completing a pair is the only place the loss streak changes.
    pub fn apply_settlement(&mut self, contract_id: u64, profit: Decimal, won: bool) -> SettlementOutcome {
        let Some(pair) = self.trade_pairs.iter_mut().find(|p| p.contains(contract_id)) else {
            return SettlementOutcome::UnknownContract;
        };

        match pair.settle_leg(contract_id, profit, won) {
            LegSettlement::Ignored => SettlementOutcome::AlreadySettled,
            LegSettlement::Recorded => SettlementOutcome::LegSettled,
            LegSettlement::Completed(total) => {
                if total >= Decimal::ZERO {
                    self.consecutive_losses = 0;
                    self.total_profit += total;
                } else {
                    self.consecutive_losses += 1;
                    self.total_loss += total.abs();
                }
                SettlementOutcome::PairCompleted { total_profit: total }
            }
        }
    }

    pub fn stats(&self) -> SessionStats {
        let completed: Vec<Decimal> = self
            .trade_pairs
            .iter()
            .filter(|p| p.status == PairStatus::Completed)
            .filter_map(|p| p.total_profit)
            .collect();
        let winning = completed.iter().filter(|p| **p >= Decimal::ZERO).count();

        SessionStats {
            completed_pairs: completed.len(),
            winning_pairs: winning,
            losing_pairs: completed.len() - winning,
            win_rate: analytics::win_rate(winning, completed.len()),
            net_profit: self.total_profit - self.total_loss,
        }
    }
}
