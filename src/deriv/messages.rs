//! Deriv-specific message types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::types::ContractSide;

// ============================================================================
// Outbound Requests
// ============================================================================

/// Keep-alive frame
#[derive(Debug, Clone, Serialize)]
pub struct PingRequest {
    pub ping: u8,
}

impl Default for PingRequest {
    fn default() -> Self {
        Self { ping: 1 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeRequest {
    pub authorize: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceRequest {
    pub balance: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<u8>,
}

impl BalanceRequest {
    pub fn subscribe() -> Self {
        Self {
            balance: 1,
            subscribe: Some(1),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TicksRequest {
    pub ticks: String,
    pub subscribe: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractsForRequest {
    pub contracts_for: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub product_type: String,
}

impl ContractsForRequest {
    pub fn basic(symbol: &str) -> Self {
        Self {
            contracts_for: symbol.to_string(),
            currency: None,
            product_type: "basic".to_string(),
        }
    }
}

/// Terms of a single barrier contract
#[derive(Debug, Clone, PartialEq)]
pub struct ContractTerms {
    pub side: ContractSide,
    pub stake: Decimal,
    pub currency: String,
    pub duration_seconds: u32,
    pub symbol: String,
    /// Signed offset from the entry spot
    pub barrier: Decimal,
}

impl ContractTerms {
    /// Relative barrier as the venue expects it, e.g. `+0.50` or `-0.50`
    pub fn barrier_offset(&self) -> String {
        if self.barrier.is_sign_negative() {
            self.barrier.to_string()
        } else {
            format!("+{}", self.barrier)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalRequest {
    pub proposal: u8,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub basis: String,
    pub contract_type: String,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
    pub symbol: String,
    pub barrier: String,
}

impl From<&ContractTerms> for ProposalRequest {
    fn from(terms: &ContractTerms) -> Self {
        Self {
            proposal: 1,
            amount: terms.stake,
            basis: "stake".to_string(),
            contract_type: terms.side.contract_type().to_string(),
            currency: terms.currency.clone(),
            duration: terms.duration_seconds,
            duration_unit: "s".to_string(),
            symbol: terms.symbol.clone(),
            barrier: terms.barrier_offset(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuyRequest {
    pub buy: String,
    /// Maximum price we accept to pay
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// Sell at market
#[derive(Debug, Clone, Serialize)]
pub struct SellRequest {
    pub sell: u64,
    pub price: u8,
}

impl SellRequest {
    pub fn at_market(contract_id: u64) -> Self {
        Self {
            sell: contract_id,
            price: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ForgetRequest {
    pub forget: String,
}

/// Stream updates for every open contract on the account
#[derive(Debug, Clone, Serialize)]
pub struct OpenContractsRequest {
    pub proposal_open_contract: u8,
    pub subscribe: u8,
}

impl Default for OpenContractsRequest {
    fn default() -> Self {
        Self {
            proposal_open_contract: 1,
            subscribe: 1,
        }
    }
}

/// One-off lookup of a single contract
#[derive(Debug, Clone, Serialize)]
pub struct OpenContractRequest {
    pub proposal_open_contract: u8,
    pub contract_id: u64,
}

impl OpenContractRequest {
    pub fn for_contract(contract_id: u64) -> Self {
        Self {
            proposal_open_contract: 1,
            contract_id,
        }
    }
}

// ============================================================================
// Inbound Replies and Pushes
// ============================================================================

/// Error payload carried by a rejected request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// Subscription handle echoed by streaming replies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub authorize: AuthorizeDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeDetails {
    pub balance: Decimal,
    pub currency: String,
    pub loginid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub is_virtual: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: BalanceDetails,
    #[serde(default)]
    pub subscription: Option<SubscriptionInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceDetails {
    pub balance: Decimal,
    pub currency: String,
    #[serde(default)]
    pub loginid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickResponse {
    pub tick: TickDetails,
    #[serde(default)]
    pub subscription: Option<SubscriptionInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickDetails {
    pub symbol: String,
    pub quote: Decimal,
    pub epoch: i64,
    #[serde(default)]
    pub pip_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsForResponse {
    pub contracts_for: ContractsForDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractsForDetails {
    #[serde(default)]
    pub available: Vec<AvailableContract>,
    #[serde(default)]
    pub spot: Option<Decimal>,
}

impl ContractsForDetails {
    /// Whether the symbol offers both contract types a pair needs
    pub fn offers_barrier_pair(&self) -> bool {
        [ContractSide::Higher, ContractSide::Lower].iter().all(|side| {
            self.available
                .iter()
                .any(|c| c.contract_type == side.contract_type() && c.barriers > 0)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableContract {
    pub contract_type: String,
    #[serde(default)]
    pub barriers: u8,
    #[serde(default)]
    pub min_contract_duration: Option<String>,
    #[serde(default)]
    pub max_contract_duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub proposal: ProposalDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalDetails {
    pub id: String,
    pub ask_price: Decimal,
    pub payout: Decimal,
    #[serde(default)]
    pub spot: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyResponse {
    pub buy: BuyDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyDetails {
    pub contract_id: u64,
    pub buy_price: Decimal,
    pub payout: Decimal,
    pub transaction_id: u64,
    #[serde(default)]
    pub longcode: Option<String>,
    #[serde(default)]
    pub start_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellResponse {
    pub sell: SellDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellDetails {
    pub sold_for: Decimal,
    pub transaction_id: u64,
    #[serde(default)]
    pub contract_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgetResponse {
    pub forget: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenContractResponse {
    pub proposal_open_contract: OpenContractDetails,
    #[serde(default)]
    pub subscription: Option<SubscriptionInfo>,
}

/// Open contract update; empty when the account holds no open contracts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenContractDetails {
    #[serde(default)]
    pub contract_id: Option<u64>,
    #[serde(default)]
    pub is_sold: Option<u8>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub profit: Option<Decimal>,
    #[serde(default)]
    pub buy_price: Option<Decimal>,
    #[serde(default)]
    pub sell_price: Option<Decimal>,
}

impl OpenContractDetails {
    pub fn is_settled(&self) -> bool {
        self.is_sold == Some(1)
    }

    pub fn is_won(&self) -> bool {
        match self.status.as_deref() {
            Some("won") => true,
            Some("lost") => false,
            _ => self.profit.map(|p| p > Decimal::ZERO).unwrap_or(false),
        }
    }
}
