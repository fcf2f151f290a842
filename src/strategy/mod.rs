//! Risk sizing for dual-barrier trading
//!
//! Everything here is a pure function of its inputs:
//!
//! ```text
//!   AccountInfo ──┐
//!                 ├─► recommended_stake() ─► RiskCalculation
//!   risk %  ──────┘
//!
//!   base stake, losses ─► martingale_stake() ─► per-leg stake (≤ 10× base)
//! ```
//!
//! # Components
//!
//! - [`martingale_stake`]: escalates the stake after losing pairs
//! - [`recommended_stake`]: sizes a stake from the account's risk budget
//! - [`can_execute_trade`]: affordability check used by the auto-trading loop
//! - [`validate_barriers`]: reports every barrier constraint a pair breaks
//! - [`analytics`]: ratios for display

pub mod analytics;
pub mod size_calculator;
pub mod types;

pub use size_calculator::{
    can_execute_trade, leg_stake, martingale_stake, recommended_stake, validate_barriers,
    DEFAULT_MARTINGALE_CAP, MAX_STAKE, MIN_STAKE,
};

pub use types::{BarrierValidation, BarrierViolation, RiskCalculation, TradeConfig};
