//! Stake sizing and trade affordability
//!
//! Pure functions; nothing here holds state, so callers may use them from any
//! task without synchronization.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::common::types::AccountInfo;
use crate::strategy::types::{
    BarrierValidation, BarrierViolation, RiskCalculation, TradeConfig,
};

/// Hard ceiling on an escalated stake, as a multiple of the base stake
pub const DEFAULT_MARTINGALE_CAP: Decimal = dec!(10);
/// Smallest stake the venue accepts
pub const MIN_STAKE: Decimal = dec!(0.35);
/// Largest per-leg stake we ever recommend
pub const MAX_STAKE: Decimal = dec!(2000);

/// Levels of a losing streak the risk budget must survive
const SEQUENCE_LEVELS: usize = 5;
/// Stop summing the series once a term grows past this multiple of the base
const SEQUENCE_TERM_BOUND: Decimal = dec!(32);

/// Stake after `consecutive_losses` losing pairs.
///
/// Never exceeds `base * cap` and never decreases as losses grow. A
/// multiplier below 1 is treated as 1.
pub fn martingale_stake(
    base: Decimal,
    consecutive_losses: u32,
    multiplier: Decimal,
    cap: Decimal,
) -> Decimal {
    let ceiling = base * cap;
    if consecutive_losses == 0 {
        return base.min(ceiling);
    }

    let multiplier = multiplier.max(Decimal::ONE);
    if multiplier == Decimal::ONE {
        return base.min(ceiling);
    }
    let mut stake = base;
    for _ in 0..consecutive_losses {
        stake = match stake.checked_mul(multiplier) {
            Some(next) if next < ceiling => next,
            _ => return ceiling,
        };
    }
    stake
}

/// Worst-case cumulative stake of a losing streak, in units of the base stake
fn sequence_risk_factor(multiplier: Decimal) -> Decimal {
    let multiplier = multiplier.max(Decimal::ONE);
    let mut factor = Decimal::ZERO;
    let mut term = Decimal::ONE;
    for _ in 0..SEQUENCE_LEVELS {
        if term > SEQUENCE_TERM_BOUND {
            break;
        }
        factor += term;
        term *= multiplier;
    }
    factor
}

/// Per-leg stake that keeps a full losing streak within the risk budget.
///
/// The result lies in `[0.35, min(2000, available / 4)]`, except that the
/// 0.35 venue minimum wins when a quarter of the balance is smaller.
pub fn recommended_stake(
    account: &AccountInfo,
    risk_percentage: Decimal,
    martingale_multiplier: Decimal,
) -> RiskCalculation {
    let available = account.available_balance.max(Decimal::ZERO);
    let risk_percentage = risk_percentage.max(Decimal::ZERO).min(dec!(100));
    let max_risk_amount = available * risk_percentage / dec!(100);

    // Both legs are staked identically
    let raw = max_risk_amount / (sequence_risk_factor(martingale_multiplier) * dec!(2));
    let upper = MAX_STAKE.min(available / dec!(4));
    let recommended = raw
        .min(upper)
        .round_dp_with_strategy(2, RoundingStrategy::ToZero)
        .max(MIN_STAKE);

    RiskCalculation {
        recommended_stake: recommended,
        max_risk_amount,
        available_balance: available,
        risk_percentage,
        can_trade: available >= recommended * dec!(2),
    }
}

/// Whether the account covers both legs at the escalated stake
pub fn can_execute_trade(account: &AccountInfo, config: &TradeConfig, consecutive_losses: u32) -> bool {
    account.available_balance >= leg_stake(config, consecutive_losses) * dec!(2)
}

/// Per-leg stake the next pair is placed with, truncated to cents
pub fn leg_stake(config: &TradeConfig, consecutive_losses: u32) -> Decimal {
    martingale_stake(
        config.stake,
        consecutive_losses,
        config.martingale_multiplier,
        DEFAULT_MARTINGALE_CAP,
    )
    .round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Check signed barriers against a market's magnitude bounds.
///
/// Reports every violated constraint.
pub fn validate_barriers(
    positive: Decimal,
    negative: Decimal,
    min: Decimal,
    max: Decimal,
) -> BarrierValidation {
    let mut errors = Vec::new();

    if positive <= Decimal::ZERO {
        errors.push(BarrierViolation::PositiveNotAboveZero(positive));
    }
    if negative >= Decimal::ZERO {
        errors.push(BarrierViolation::NegativeNotBelowZero(negative));
    }
    if positive.abs() < min || positive.abs() > max {
        errors.push(BarrierViolation::PositiveOutOfRange {
            value: positive,
            min,
            max,
        });
    }
    if negative.abs() < min || negative.abs() > max {
        errors.push(BarrierViolation::NegativeOutOfRange {
            value: negative.abs(),
            min,
            max,
        });
    }

    BarrierValidation::from_violations(errors)
}
