//! Risk sizing inputs and outputs

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::common::errors::{ClientError, Result};

/// Shortest contract the venue accepts, in seconds
pub const MIN_DURATION_SECONDS: u32 = 15;
/// Longest contract duration we allow, in seconds
pub const MAX_DURATION_SECONDS: u32 = 86_400;

/// Parameters for one trading cycle.
///
/// Barriers are magnitudes; the engine applies the sign per leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeConfig {
    /// Per-leg base stake
    pub stake: Decimal,
    pub martingale_multiplier: Decimal,
    pub duration_seconds: u32,
    pub positive_barrier: Decimal,
    pub negative_barrier: Decimal,
    pub symbol: String,
    /// Share of available balance to risk, 0 to 100
    pub risk_percentage: Decimal,
    pub locked_balance: Decimal,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            stake: dec!(1.00),
            martingale_multiplier: dec!(2.0),
            duration_seconds: MIN_DURATION_SECONDS,
            positive_barrier: dec!(0.5),
            negative_barrier: dec!(0.5),
            symbol: "R_100".to_string(),
            risk_percentage: dec!(2),
            locked_balance: Decimal::ZERO,
        }
    }
}

impl TradeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stake <= Decimal::ZERO {
            return Err(ClientError::Configuration(format!(
                "stake must be positive, got {}",
                self.stake
            )));
        }
        if self.martingale_multiplier < Decimal::ONE {
            return Err(ClientError::Configuration(format!(
                "martingale multiplier must be at least 1, got {}",
                self.martingale_multiplier
            )));
        }
        if !(MIN_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(&self.duration_seconds) {
            return Err(ClientError::Configuration(format!(
                "duration must be within {}..={} seconds, got {}",
                MIN_DURATION_SECONDS, MAX_DURATION_SECONDS, self.duration_seconds
            )));
        }
        if self.positive_barrier <= Decimal::ZERO || self.negative_barrier <= Decimal::ZERO {
            return Err(ClientError::Configuration(
                "barrier magnitudes must be positive".to_string(),
            ));
        }
        if self.risk_percentage < Decimal::ZERO || self.risk_percentage > dec!(100) {
            return Err(ClientError::Configuration(format!(
                "risk percentage must be within 0..=100, got {}",
                self.risk_percentage
            )));
        }
        if self.symbol.trim().is_empty() {
            return Err(ClientError::Configuration("symbol must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Stake recommendation for an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCalculation {
    /// Per-leg stake
    pub recommended_stake: Decimal,
    pub max_risk_amount: Decimal,
    pub available_balance: Decimal,
    pub risk_percentage: Decimal,
    /// Whether the account covers the stake on both legs
    pub can_trade: bool,
}

/// One broken barrier constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BarrierViolation {
    PositiveNotAboveZero(Decimal),
    NegativeNotBelowZero(Decimal),
    PositiveOutOfRange { value: Decimal, min: Decimal, max: Decimal },
    NegativeOutOfRange { value: Decimal, min: Decimal, max: Decimal },
}

impl std::fmt::Display for BarrierViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BarrierViolation::PositiveNotAboveZero(v) => {
                write!(f, "positive barrier must be greater than 0, got {}", v)
            }
            BarrierViolation::NegativeNotBelowZero(v) => {
                write!(f, "negative barrier must be less than 0, got {}", v)
            }
            BarrierViolation::PositiveOutOfRange { value, min, max } => {
                write!(f, "positive barrier {} outside [{}, {}]", value, min, max)
            }
            BarrierViolation::NegativeOutOfRange { value, min, max } => {
                write!(f, "negative barrier magnitude {} outside [{}, {}]", value, min, max)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarrierValidation {
    pub is_valid: bool,
    pub errors: Vec<BarrierViolation>,
}

impl BarrierValidation {
    pub fn from_violations(errors: Vec<BarrierViolation>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}
