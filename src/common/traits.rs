//! Trait definitions for the venue seam

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use super::channels::{Subscription, SubscriptionKey};
use super::errors::Result;
use super::types::ConnectionStatus;
use crate::deriv::messages::{
    AuthorizeDetails, BalanceDetails, BalanceResponse, BuyDetails, ContractTerms,
    ContractsForDetails, OpenContractDetails, OpenContractResponse, ProposalDetails, SellDetails,
    TickDetails, TickResponse,
};

/// Venue operations the trade engine depends on.
///
/// `DerivClient` implements this over the WebSocket protocol client; tests
/// substitute a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradingApi: Send + Sync {
    /// Authorize the session with an API token
    async fn authorize(&self, token: &str) -> Result<AuthorizeDetails>;

    /// Fetch the current balance and keep receiving balance pushes
    async fn subscribe_balance(&self) -> Result<(BalanceDetails, Subscription<BalanceResponse>)>;

    /// Contract metadata offered for a symbol
    async fn contracts_for(&self, symbol: &str) -> Result<ContractsForDetails>;

    /// Latest tick for a symbol plus the tick stream that follows it
    async fn subscribe_ticks(&self, symbol: &str) -> Result<(TickDetails, Subscription<TickResponse>)>;

    /// Stop delivering a subscription locally and, given its id, at the venue
    async fn unsubscribe(&self, key: SubscriptionKey, subscription_id: Option<String>) -> Result<()>;

    /// Price quote for contract terms
    async fn proposal(&self, terms: &ContractTerms) -> Result<ProposalDetails>;

    /// Buy a quoted contract, paying at most `price`
    async fn buy(&self, proposal_id: &str, price: Decimal) -> Result<BuyDetails>;

    /// Sell an open contract at market
    async fn sell(&self, contract_id: u64) -> Result<SellDetails>;

    /// Stream updates for every open contract
    async fn subscribe_open_contracts(&self) -> Result<Subscription<OpenContractResponse>>;

    /// Current state of one contract
    async fn open_contract(&self, contract_id: u64) -> Result<OpenContractDetails>;

    /// Transport status changes; replaces any earlier receiver
    async fn status_events(&self) -> mpsc::UnboundedReceiver<ConnectionStatus>;

    /// Close the connection
    async fn disconnect(&self) -> Result<()>;
}
