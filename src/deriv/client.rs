//! Typed Deriv operations over the WebSocket protocol client

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use super::messages::{
    AuthorizeDetails, AuthorizeRequest, AuthorizeResponse, BalanceDetails, BalanceRequest,
    BalanceResponse, BuyDetails, BuyRequest, BuyResponse, ContractTerms, ContractsForDetails,
    ContractsForRequest, ContractsForResponse, ForgetRequest, OpenContractDetails,
    OpenContractRequest, OpenContractResponse, OpenContractsRequest, ProposalDetails, ProposalRequest, ProposalResponse, SellDetails,
    SellRequest, SellResponse, TickDetails, TickResponse, TicksRequest,
};
use super::websocket::{ConnectionSettings, DerivWebSocketClient};
use crate::common::channels::{ChannelKind, Subscription, SubscriptionKey};
use crate::common::errors::{ClientError, Result};
use crate::common::traits::TradingApi;
use crate::common::types::ConnectionStatus;
use crate::config::types::DerivConfig;

/// Deriv venue client
#[derive(Clone)]
pub struct DerivClient {
    ws: Arc<DerivWebSocketClient>,
}

impl DerivClient {
    pub fn new(ws: Arc<DerivWebSocketClient>) -> Self {
        Self { ws }
    }

    /// Build an unconnected client for the configured endpoint
    pub fn from_config(config: &DerivConfig, settings: ConnectionSettings) -> Result<Self> {
        let endpoint = config.endpoint()?;
        Ok(Self::new(Arc::new(DerivWebSocketClient::new(endpoint, settings))))
    }

    /// The underlying protocol client
    pub fn websocket(&self) -> &Arc<DerivWebSocketClient> {
        &self.ws
    }

    pub async fn connect(&self) -> Result<()> {
        self.ws.connect().await
    }

    async fn request<R: Serialize, T: DeserializeOwned>(&self, request: &R) -> Result<T> {
        let reply = self.ws.call(request).await?;
        decode(reply)
    }

    /// Issue a subscribing request with its push route already in place
    async fn open_stream<R, T, P>(&self, key: SubscriptionKey, request: &R) -> Result<(T, Subscription<P>)>
    where
        R: Serialize,
        T: DeserializeOwned,
        P: DeserializeOwned,
    {
        let receiver = self.ws.subscribe(key.clone()).await;
        let reply = match self.ws.call(request).await {
            Ok(reply) => reply,
            Err(e) => {
                self.ws.unsubscribe(&key).await;
                return Err(e);
            }
        };

        let subscription_id = reply
            .pointer("/subscription/id")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let first = match decode(reply) {
            Ok(first) => first,
            Err(e) => {
                self.ws.unsubscribe(&key).await;
                return Err(e);
            }
        };
        debug!(key = %key, id = ?subscription_id, "Subscription opened");
        Ok((first, Subscription::new(key, subscription_id, receiver)))
    }
}

fn decode<T: DeserializeOwned>(reply: Value) -> Result<T> {
    serde_json::from_value(reply).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl TradingApi for DerivClient {
    #[instrument(skip(self, token))]
    async fn authorize(&self, token: &str) -> Result<AuthorizeDetails> {
        let response: AuthorizeResponse = self
            .request(&AuthorizeRequest {
                authorize: token.to_string(),
            })
            .await?;
        info!(login_id = %response.authorize.loginid, "Authorized");
        Ok(response.authorize)
    }

    #[instrument(skip(self))]
    async fn subscribe_balance(&self) -> Result<(BalanceDetails, Subscription<BalanceResponse>)> {
        let key = SubscriptionKey::new(ChannelKind::Balance);
        let (first, subscription): (BalanceResponse, _) =
            self.open_stream(key, &BalanceRequest::subscribe()).await?;
        Ok((first.balance, subscription))
    }

    #[instrument(skip(self))]
    async fn contracts_for(&self, symbol: &str) -> Result<ContractsForDetails> {
        let response: ContractsForResponse =
            self.request(&ContractsForRequest::basic(symbol)).await?;
        Ok(response.contracts_for)
    }

    #[instrument(skip(self))]
    async fn subscribe_ticks(&self, symbol: &str) -> Result<(TickDetails, Subscription<TickResponse>)> {
        let request = TicksRequest {
            ticks: symbol.to_string(),
            subscribe: 1,
        };
        let (first, subscription): (TickResponse, _) =
            self.open_stream(SubscriptionKey::ticks(symbol), &request).await?;
        Ok((first.tick, subscription))
    }

    #[instrument(skip(self))]
    async fn unsubscribe(&self, key: SubscriptionKey, subscription_id: Option<String>) -> Result<()> {
        self.ws.unsubscribe(&key).await;
        if let Some(id) = subscription_id {
            self.ws.call(&ForgetRequest { forget: id }).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn proposal(&self, terms: &ContractTerms) -> Result<ProposalDetails> {
        let response: ProposalResponse = self.request(&ProposalRequest::from(terms)).await?;
        Ok(response.proposal)
    }

    #[instrument(skip(self))]
    async fn buy(&self, proposal_id: &str, price: Decimal) -> Result<BuyDetails> {
        let response: BuyResponse = self
            .request(&BuyRequest {
                buy: proposal_id.to_string(),
                price,
            })
            .await?;
        Ok(response.buy)
    }

    #[instrument(skip(self))]
    async fn sell(&self, contract_id: u64) -> Result<SellDetails> {
        let response: SellResponse = self.request(&SellRequest::at_market(contract_id)).await?;
        Ok(response.sell)
    }

    #[instrument(skip(self))]
    async fn subscribe_open_contracts(&self) -> Result<Subscription<OpenContractResponse>> {
        let key = SubscriptionKey::new(ChannelKind::ProposalOpenContract);
        let (_first, subscription): (OpenContractResponse, _) =
            self.open_stream(key, &OpenContractsRequest::default()).await?;
        Ok(subscription)
    }

    #[instrument(skip(self))]
    async fn open_contract(&self, contract_id: u64) -> Result<OpenContractDetails> {
        let response: OpenContractResponse = self
            .request(&OpenContractRequest::for_contract(contract_id))
            .await?;
        Ok(response.proposal_open_contract)
    }

    async fn status_events(&self) -> mpsc::UnboundedReceiver<ConnectionStatus> {
        self.ws.status_events().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.ws.disconnect().await;
        Ok(())
    }
}
