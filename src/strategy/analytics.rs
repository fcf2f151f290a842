//! Display-only account ratios

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Winning share as a percentage
pub fn win_rate(wins: usize, total: usize) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(wins) * dec!(100) / Decimal::from(total)
}

/// Fall from peak balance as a percentage of the peak
pub fn drawdown_percentage(peak: Decimal, current: Decimal) -> Decimal {
    if peak <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    ((peak - current) / peak * dec!(100)).max(Decimal::ZERO)
}

pub fn profit_loss_percentage(initial: Decimal, current: Decimal) -> Decimal {
    if initial.is_zero() {
        return Decimal::ZERO;
    }
    (current - initial) / initial * dec!(100)
}

/// Suggested risk percentage by account size tier
pub fn optimal_risk_percentage(balance: Decimal) -> Decimal {
    if balance < dec!(50) {
        dec!(1)
    } else if balance < dec!(500) {
        dec!(2)
    } else if balance < dec!(5000) {
        dec!(3)
    } else {
        dec!(5)
    }
}

/// Periods needed to double at `rate_percent` growth per period.
///
/// Infinite when the rate is not positive.
pub fn time_to_double(rate_percent: Decimal) -> f64 {
    let rate = rate_percent.to_f64().unwrap_or(0.0) / 100.0;
    if rate <= 0.0 {
        return f64::INFINITY;
    }
    2f64.ln() / (1.0 + rate).ln()
}
