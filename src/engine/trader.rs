//! Trade orchestration engine
//!
//! Owns the single [`TradingState`] of a session. Every mutation goes through
//! one mutex-guarded path and publishes a snapshot to observers, so balance
//! pushes, tick pushes, settlements and the auto-trading loop never interleave
//! inside a state change.
//!
//! The engine also follows the transport's connection status. A lost
//! connection clears `is_connected`; a new one re-authorizes and rebuilds the
//! balance, tick and settlement streams, since the venue forgets them.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::settlement::{self, SettlementFeed};
use crate::common::channels::{create_snapshot_channel, SubscriptionKey};
use crate::common::errors::{ClientError, Result};
use crate::common::traits::TradingApi;
use crate::common::types::{
    AccountInfo, ConnectionStatus, ContractSide, MarketData, PairStatus, SettlementOutcome,
    TradePair, TradeStatus, TradingState,
};
use crate::config::types::MarketConfig;
use crate::deriv::messages::{BuyDetails, ContractTerms};
use crate::strategy::{
    can_execute_trade, leg_stake, recommended_stake, validate_barriers, RiskCalculation,
    TradeConfig,
};

/// Shortest pause between two auto-traded pairs
pub const MIN_CYCLE_INTERVAL: Duration = Duration::from_secs(10);

/// Pause after a pair so its contracts can settle first
pub fn cycle_interval(duration_seconds: u32) -> Duration {
    Duration::from_secs(u64::from(duration_seconds)).max(MIN_CYCLE_INTERVAL)
}

struct AutoTrader {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct TickFeed {
    key: SubscriptionKey,
    subscription_id: Option<String>,
    task: JoinHandle<()>,
}

/// What it takes to rebuild the venue-side session on a new connection
#[derive(Default)]
struct Session {
    token: Option<String>,
    market: Option<MarketConfig>,
}

struct EngineInner {
    api: Arc<dyn TradingApi>,
    state: Mutex<TradingState>,
    snapshots: watch::Sender<TradingState>,
    session: Mutex<Session>,
    auto_trader: Mutex<Option<AutoTrader>>,
    balance_feed: Mutex<Option<JoinHandle<()>>>,
    tick_feed: Mutex<Option<TickFeed>>,
    settlement_feed: Mutex<Option<SettlementFeed>>,
    connection_feed: Mutex<Option<JoinHandle<()>>>,
}

impl EngineInner {
    /// Apply `f` to the state and publish the result
    async fn mutate<R>(&self, f: impl FnOnce(&mut TradingState) -> R) -> R {
        let mut state = self.state.lock().await;
        let result = f(&mut state);
        self.publish(&state);
        result
    }

    fn publish(&self, state: &TradingState) {
        self.snapshots.send_replace(state.clone());
    }
}

/// Drives paired higher/lower trades against a [`TradingApi`]
#[derive(Clone)]
pub struct TradeEngine {
    inner: Arc<EngineInner>,
}

/// Non-owning engine handle for background feeds
#[derive(Clone)]
pub(crate) struct WeakTradeEngine(Weak<EngineInner>);

impl WeakTradeEngine {
    pub(crate) fn upgrade(&self) -> Option<TradeEngine> {
        self.0.upgrade().map(|inner| TradeEngine { inner })
    }
}

impl TradeEngine {
    /// Create an engine and the receiver its latest state is published on
    pub fn new(api: Arc<dyn TradingApi>) -> (Self, watch::Receiver<TradingState>) {
        let (snapshots, receiver) = create_snapshot_channel();
        let engine = Self {
            inner: Arc::new(EngineInner {
                api,
                state: Mutex::new(TradingState::default()),
                snapshots,
                session: Mutex::new(Session::default()),
                auto_trader: Mutex::new(None),
                balance_feed: Mutex::new(None),
                tick_feed: Mutex::new(None),
                settlement_feed: Mutex::new(None),
                connection_feed: Mutex::new(None),
            }),
        };
        (engine, receiver)
    }

    pub fn api(&self) -> Arc<dyn TradingApi> {
        self.inner.api.clone()
    }

    pub(crate) fn downgrade(&self) -> WeakTradeEngine {
        WeakTradeEngine(Arc::downgrade(&self.inner))
    }

    /// Current state
    pub async fn state(&self) -> TradingState {
        self.inner.state.lock().await.clone()
    }

    #[cfg(test)]
    pub(crate) async fn state_mut(&self) -> tokio::sync::MutexGuard<'_, TradingState> {
        self.inner.state.lock().await
    }

    /// Authorize, load the account and follow its balance.
    ///
    /// On failure the session stays disconnected. On success the engine also
    /// starts following the connection status.
    #[instrument(skip(self, token))]
    pub async fn initialize(&self, token: &str) -> Result<AccountInfo> {
        let account = self.open_session(token).await?;
        self.watch_connection().await;
        Ok(account)
    }

    async fn open_session(&self, token: &str) -> Result<AccountInfo> {
        let api = &self.inner.api;
        let details = api
            .authorize(token)
            .await
            .map_err(|e| ClientError::Init(format!("authorization failed: {}", e)))?;
        let (balance, mut subscription) = api
            .subscribe_balance()
            .await
            .map_err(|e| ClientError::Init(format!("balance fetch failed: {}", e)))?;

        let account = self
            .inner
            .mutate(|state| {
                let mut account = AccountInfo::new(balance.balance, balance.currency, details.loginid);
                if let Some(previous) = state.account.as_ref() {
                    account.set_locked_balance(previous.locked_balance);
                }
                state.account = Some(account.clone());
                state.is_connected = true;
                account
            })
            .await;
        info!(
            login_id = %account.login_id,
            balance = %account.balance,
            currency = %account.currency,
            "Session initialized"
        );

        let inner = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(update) = subscription.recv().await {
                let Some(inner) = inner.upgrade() else { break };
                debug!(balance = %update.balance.balance, "Balance update");
                inner
                    .mutate(|state| {
                        if let Some(account) = state.account.as_mut() {
                            account.update_balance(update.balance.balance);
                        }
                    })
                    .await;
            }
            debug!("Balance feed ended");
        });
        if let Some(previous) = self.inner.balance_feed.lock().await.replace(task) {
            previous.abort();
        }

        self.inner.session.lock().await.token = Some(token.to_string());
        Ok(account)
    }

    /// Validate a market with the venue and start watching its ticks.
    ///
    /// Replaces whatever market was watched before.
    #[instrument(skip(self, config), fields(symbol = %config.symbol))]
    pub async fn set_market(&self, config: &MarketConfig) -> Result<MarketData> {
        self.watch_market(config, true).await
    }

    async fn watch_market(&self, config: &MarketConfig, forget_previous: bool) -> Result<MarketData> {
        let api = &self.inner.api;
        let symbol = config.symbol.as_str();
        let mut tick_feed = self.inner.tick_feed.lock().await;

        let contracts = api
            .contracts_for(symbol)
            .await
            .map_err(|e| ClientError::MarketUnavailable(format!("{}: {}", symbol, e)))?;
        if !contracts.offers_barrier_pair() {
            return Err(ClientError::MarketUnavailable(format!(
                "{} offers no higher/lower barrier contracts",
                symbol
            )));
        }

        if let Some(previous) = tick_feed.take() {
            previous.task.abort();
            // Ids from an earlier connection mean nothing to the venue
            let subscription_id = previous.subscription_id.filter(|_| forget_previous);
            if let Err(e) = api.unsubscribe(previous.key, subscription_id).await {
                warn!(error = %e, "Failed to forget previous tick stream");
            }
        }

        let (tick, mut subscription) = api
            .subscribe_ticks(symbol)
            .await
            .map_err(|e| ClientError::MarketUnavailable(format!("{}: {}", symbol, e)))?;

        let market = MarketData::from_config(config, Some(tick.quote).or(contracts.spot));
        self.inner
            .mutate(|state| state.market = Some(market.clone()))
            .await;
        self.inner.session.lock().await.market = Some(config.clone());
        info!(price = ?market.current_price, "Market selected");

        let key = subscription.key().clone();
        let subscription_id = subscription.subscription_id().map(str::to_owned);
        let inner: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(update) = subscription.recv().await {
                let Some(inner) = inner.upgrade() else { break };
                inner
                    .mutate(|state| {
                        if let Some(market) = state.market.as_mut() {
                            if market.symbol == update.tick.symbol {
                                market.apply_tick(update.tick.quote, Utc::now());
                            }
                        }
                    })
                    .await;
            }
            debug!("Tick feed ended");
        });
        *tick_feed = Some(TickFeed {
            key,
            subscription_id,
            task,
        });

        Ok(market)
    }

    /// Report sold contracts to [`update_trade_result`](Self::update_trade_result).
    ///
    /// Replaces any earlier settlement feed and is restarted after reconnects.
    #[instrument(skip(self))]
    pub async fn follow_settlements(&self) -> Result<()> {
        let mut feed = self.inner.settlement_feed.lock().await;
        *feed = Some(SettlementFeed::start(self).await?);
        Ok(())
    }

    pub async fn is_following_settlements(&self) -> bool {
        self.inner
            .settlement_feed
            .lock()
            .await
            .as_ref()
            .is_some_and(SettlementFeed::is_running)
    }

    /// Place one higher and one lower contract concurrently.
    ///
    /// The stake and the affordability check read the same loss streak. If
    /// only one leg is bought, it is sold back at market and nothing is
    /// recorded.
    #[instrument(skip(self, config), fields(symbol = %config.symbol))]
    pub async fn execute_trade_pair(&self, config: &TradeConfig) -> Result<TradePair> {
        let (account, market, consecutive_losses) = {
            let state = self.inner.state.lock().await;
            (state.account.clone(), state.market.clone(), state.consecutive_losses)
        };
        let account = account.ok_or_else(|| ClientError::NotReady("account not initialized".into()))?;
        let market = market.ok_or_else(|| ClientError::NotReady("no market selected".into()))?;

        let stake = leg_stake(config, consecutive_losses);
        if !can_execute_trade(&account, config, consecutive_losses) {
            return Err(ClientError::InsufficientBalance {
                required: stake * Decimal::TWO,
                available: account.available_balance,
            });
        }

        let positive = market.clamp_barrier(config.positive_barrier);
        let negative = market.clamp_barrier(config.negative_barrier);
        let barriers = validate_barriers(
            ContractSide::Higher.signed_barrier(positive),
            ContractSide::Lower.signed_barrier(negative),
            market.min_barrier,
            market.max_barrier,
        );
        if !barriers.is_valid {
            let reasons: Vec<String> = barriers.errors.iter().map(ToString::to_string).collect();
            return Err(ClientError::Configuration(reasons.join("; ")));
        }

        let mut pair = TradePair::pending(&market.symbol, stake, positive, negative);
        let terms = |side: ContractSide, barrier: Decimal| ContractTerms {
            side,
            stake,
            currency: account.currency.clone(),
            duration_seconds: config.duration_seconds,
            symbol: market.symbol.clone(),
            barrier,
        };
        let higher_terms = terms(ContractSide::Higher, pair.higher.barrier);
        let lower_terms = terms(ContractSide::Lower, pair.lower.barrier);

        info!(
            pair_id = %pair.id,
            %stake,
            consecutive_losses,
            higher = %higher_terms.barrier_offset(),
            lower = %lower_terms.barrier_offset(),
            "Submitting trade pair"
        );

        let (higher, lower) = tokio::join!(self.place_leg(&higher_terms), self.place_leg(&lower_terms));

        match (higher, lower) {
            (Ok(higher), Ok(lower)) => {
                pair.higher.activate(higher.contract_id, higher.payout);
                pair.lower.activate(lower.contract_id, lower.payout);
                pair.mark_active();
                self.inner.mutate(|state| state.record_pair(pair.clone())).await;
                info!(
                    pair_id = %pair.id,
                    higher_contract = higher.contract_id,
                    lower_contract = lower.contract_id,
                    "Trade pair active"
                );
                Ok(pair)
            }
            (Ok(bought), Err(e)) | (Err(e), Ok(bought)) => {
                warn!(pair_id = %pair.id, error = %e, "One leg failed, unwinding the other");
                Err(ClientError::TradeSubmissionFailed(
                    self.unwind(bought.contract_id, &e).await,
                ))
            }
            (Err(higher), Err(lower)) => Err(ClientError::TradeSubmissionFailed(format!(
                "higher leg: {}; lower leg: {}",
                higher, lower
            ))),
        }
    }

    /// Price then buy one leg
    async fn place_leg(&self, terms: &ContractTerms) -> Result<BuyDetails> {
        let proposal = self.inner.api.proposal(terms).await?;
        debug!(side = %terms.side, proposal_id = %proposal.id, ask = %proposal.ask_price, "Quoted");
        self.inner.api.buy(&proposal.id, proposal.ask_price).await
    }

    /// Sell the surviving leg of a half-placed pair; returns the failure description.
    ///
    /// A leg that cannot be sold stays open at the venue untracked, so it is
    /// kept in `last_error`.
    async fn unwind(&self, contract_id: u64, cause: &ClientError) -> String {
        match self.inner.api.sell(contract_id).await {
            Ok(sold) => {
                info!(contract_id, sold_for = %sold.sold_for, "Sold surviving leg");
                format!("one leg failed and contract {} was sold back: {}", contract_id, cause)
            }
            Err(e) => {
                let reason = format!(
                    "one leg failed ({}) and contract {} is still open: sell failed: {}",
                    cause, contract_id, e
                );
                error!(contract_id, %reason, "Failed to sell surviving leg");
                self.inner
                    .mutate(|state| state.last_error = Some(reason.clone()))
                    .await;
                reason
            }
        }
    }

    /// Record a settled contract.
    ///
    /// Completing a pair is the only place the loss streak changes.
    #[instrument(skip(self))]
    pub async fn update_trade_result(&self, contract_id: u64, profit: Decimal, won: bool) -> SettlementOutcome {
        let mut state = self.inner.state.lock().await;
        let outcome = state.apply_settlement(contract_id, profit, won);
        match outcome {
            SettlementOutcome::UnknownContract => {
                debug!("Settlement for unknown contract");
                return outcome;
            }
            SettlementOutcome::AlreadySettled => return outcome,
            SettlementOutcome::LegSettled => debug!(%profit, won, "Leg settled"),
            SettlementOutcome::PairCompleted { total_profit } => info!(
                %total_profit,
                consecutive_losses = state.consecutive_losses,
                "Pair completed"
            ),
        }
        self.inner.publish(&state);
        outcome
    }

    /// Start the auto-trading loop
    #[instrument(skip(self, config))]
    pub async fn start_auto_trading(&self, config: TradeConfig) -> Result<()> {
        config.validate()?;
        let mut auto_trader = self.inner.auto_trader.lock().await;

        let already_trading = self
            .inner
            .mutate(|state| {
                if state.is_trading {
                    return true;
                }
                state.is_trading = true;
                state.last_error = None;
                false
            })
            .await;
        if already_trading {
            return Err(ClientError::AlreadyTrading);
        }

        let (cancel, cancelled) = watch::channel(false);
        let task = tokio::spawn(run_auto_trading(self.clone(), config, cancelled));
        // A previous loop that stopped itself has already finished
        *auto_trader = Some(AutoTrader { cancel, task });
        info!("Auto-trading started");
        Ok(())
    }

    /// Stop the auto-trading loop. Idempotent.
    ///
    /// Waits for an in-flight pair to finish; once this returns no further
    /// pair is submitted.
    #[instrument(skip(self))]
    pub async fn stop_auto_trading(&self) {
        let auto_trader = self.inner.auto_trader.lock().await.take();
        if let Some(AutoTrader { cancel, task }) = auto_trader {
            let _ = cancel.send(true);
            if let Err(e) = task.await {
                warn!(error = %e, "Auto-trading task ended abnormally");
            }
            info!("Auto-trading stopped");
        }
        self.inner
            .mutate(|state| state.is_trading = false)
            .await;
    }

    /// Protect part of the balance from being wagered
    pub async fn set_locked_balance(&self, amount: Decimal) -> Result<AccountInfo> {
        let mut state = self.inner.state.lock().await;
        let account = state
            .account
            .as_mut()
            .ok_or_else(|| ClientError::NotReady("account not initialized".into()))?;
        account.set_locked_balance(amount);
        let account = account.clone();
        self.inner.publish(&state);
        Ok(account)
    }

    /// Stake recommendation for the current account
    pub async fn risk_calculation(&self, config: &TradeConfig) -> Result<RiskCalculation> {
        let state = self.inner.state.lock().await;
        let account = state
            .account
            .as_ref()
            .ok_or_else(|| ClientError::NotReady("account not initialized".into()))?;
        Ok(recommended_stake(
            account,
            config.risk_percentage,
            config.martingale_multiplier,
        ))
    }

    /// Stop trading and close the venue connection.
    ///
    /// Trade history, account and market are kept.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        self.stop_auto_trading().await;

        if let Some(task) = self.inner.connection_feed.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.inner.balance_feed.lock().await.take() {
            task.abort();
        }
        if let Some(feed) = self.inner.tick_feed.lock().await.take() {
            feed.task.abort();
        }
        drop(self.inner.settlement_feed.lock().await.take());
        if let Err(e) = self.inner.api.disconnect().await {
            warn!(error = %e, "Error while disconnecting");
        }

        self.inner
            .mutate(|state| {
                state.is_connected = false;
                state.is_trading = false;
            })
            .await;
        info!("Engine disconnected");
    }

    /// Clear the trading flag after the loop stopped itself
    async fn halt_auto_trading(&self, reason: String) {
        error!(%reason, "Auto-trading halted");
        self.inner
            .mutate(|state| {
                state.is_trading = false;
                state.last_error = Some(reason);
            })
            .await;
    }

    /// Start following connection status once per engine
    async fn watch_connection(&self) {
        let mut feed = self.inner.connection_feed.lock().await;
        if feed.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let events = self.inner.api.status_events().await;
        *feed = Some(tokio::spawn(follow_connection(self.downgrade(), events)));
    }

    /// Rebuild authorization and streams on a fresh connection
    #[instrument(skip(self))]
    async fn resume_session(&self) {
        let (token, market) = {
            let session = self.inner.session.lock().await;
            (session.token.clone(), session.market.clone())
        };
        let Some(token) = token else { return };

        info!("Restoring session on new connection");
        if let Err(e) = self.restore_session(&token, market.as_ref()).await {
            self.stop_auto_trading().await;
            let reason = format!("session not restored after reconnect: {}", e);
            error!(%reason, "Session restore failed");
            self.inner
                .mutate(|state| state.last_error = Some(reason))
                .await;
        }
    }

    async fn restore_session(&self, token: &str, market: Option<&MarketConfig>) -> Result<()> {
        self.open_session(token).await?;
        if let Some(market) = market {
            self.watch_market(market, false).await?;
        }
        let following = self.inner.settlement_feed.lock().await.is_some();
        if following {
            self.follow_settlements().await?;
            self.reconcile_open_contracts().await;
        }
        info!("Session restored");
        Ok(())
    }

    /// Look up contracts still open in history; they may have settled while
    /// no settlement feed was listening
    async fn reconcile_open_contracts(&self) {
        let open: Vec<u64> = {
            let state = self.inner.state.lock().await;
            state
                .trade_pairs
                .iter()
                .filter(|pair| pair.status == PairStatus::Active)
                .flat_map(|pair| [&pair.higher, &pair.lower])
                .filter(|leg| leg.status == TradeStatus::Active)
                .filter_map(|leg| leg.contract_id)
                .collect()
        };

        for contract_id in open {
            match self.inner.api.open_contract(contract_id).await {
                Ok(mut contract) => {
                    contract.contract_id.get_or_insert(contract_id);
                    settlement::apply_update(self, contract).await;
                }
                Err(e) => warn!(contract_id, error = %e, "Failed to look up open contract"),
            }
        }
    }
}

async fn follow_connection(engine: WeakTradeEngine, mut events: mpsc::UnboundedReceiver<ConnectionStatus>) {
    while let Some(status) = events.recv().await {
        let Some(engine) = engine.upgrade() else { break };
        match status {
            ConnectionStatus::Connected => engine.resume_session().await,
            ConnectionStatus::Disconnected(reason) => {
                warn!(reason = ?reason, "Venue connection lost");
                engine
                    .inner
                    .mutate(|state| state.is_connected = false)
                    .await;
            }
            ConnectionStatus::Reconnecting { attempt, delay } => {
                info!(attempt, ?delay, "Reconnecting to venue")
            }
            ConnectionStatus::ReconnectExhausted { attempts } => {
                engine.stop_auto_trading().await;
                let reason = ClientError::ReconnectExhausted { attempts }.to_string();
                error!(%reason, "Venue connection abandoned");
                engine
                    .inner
                    .mutate(|state| {
                        state.is_connected = false;
                        state.last_error = Some(reason);
                    })
                    .await;
            }
        }
    }
    debug!("Connection feed ended");
}

async fn run_auto_trading(engine: TradeEngine, config: TradeConfig, mut cancelled: watch::Receiver<bool>) {
    let interval = cycle_interval(config.duration_seconds);

    loop {
        if *cancelled.borrow() {
            break;
        }

        // Sit out cycles while the transport recovers; an account that never
        // existed is still an error
        let waiting_for_connection = {
            let state = engine.inner.state.lock().await;
            state.account.is_some() && !state.is_connected
        };
        if waiting_for_connection {
            debug!("Venue connection down, skipping cycle");
        } else if let Err(e) = engine.execute_trade_pair(&config).await {
            engine.halt_auto_trading(e.to_string()).await;
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancelled.changed() => break,
        }
    }
    debug!("Auto-trading loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::channels::{ChannelKind, Subscription};
    use crate::common::traits::MockTradingApi;
    use crate::deriv::messages::{
        AuthorizeDetails, AvailableContract, BalanceDetails, BalanceResponse, ContractsForDetails,
        OpenContractDetails, OpenContractResponse, ProposalDetails, SellDetails, TickDetails,
        TickResponse,
    };
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn quoting_api(api: &mut MockTradingApi) -> Arc<AtomicU64> {
        let next_contract = Arc::new(AtomicU64::new(100));
        api.expect_proposal().returning(|terms| {
            Ok(ProposalDetails {
                id: format!("prop-{}", terms.side),
                ask_price: terms.stake,
                payout: terms.stake * dec!(1.9),
                spot: None,
            })
        });
        let counter = next_contract.clone();
        api.expect_buy().returning(move |_id, price| {
            Ok(BuyDetails {
                contract_id: counter.fetch_add(1, Ordering::SeqCst),
                buy_price: price,
                payout: price * dec!(1.9),
                transaction_id: 1,
                longcode: None,
                start_time: None,
            })
        });
        next_contract
    }

    async fn seed(engine: &TradeEngine, balance: Decimal) {
        let mut state = engine.inner.state.lock().await;
        state.account = Some(AccountInfo::new(balance, "USD", "VRTC1"));
        state.market = Some(MarketData::from_config(&MarketConfig::default(), Some(dec!(1000))));
        state.is_connected = true;
    }

    fn authorized() -> AuthorizeDetails {
        AuthorizeDetails {
            balance: dec!(100),
            currency: "USD".to_string(),
            loginid: "VRTC1".to_string(),
            email: None,
            fullname: None,
            is_virtual: Some(1),
        }
    }

    /// Balance stream whose pushes have already ended
    fn balance_stream() -> Result<(BalanceDetails, Subscription<BalanceResponse>)> {
        let balance = BalanceDetails {
            balance: dec!(100),
            currency: "USD".to_string(),
            loginid: Some("VRTC1".to_string()),
        };
        let key = SubscriptionKey::new(ChannelKind::Balance);
        Ok((balance, Subscription::new(key, None, mpsc::unbounded_channel().1)))
    }

    fn tick_stream(symbol: &str) -> Result<(TickDetails, Subscription<TickResponse>)> {
        let tick = TickDetails {
            symbol: symbol.to_string(),
            quote: dec!(1000),
            epoch: 1,
            pip_size: Some(2),
        };
        let key = SubscriptionKey::ticks(symbol);
        Ok((tick, Subscription::new(key, Some("tick-1".to_string()), mpsc::unbounded_channel().1)))
    }

    fn contracts_with_pair() -> ContractsForDetails {
        let contract = |kind: &str| AvailableContract {
            contract_type: kind.to_string(),
            barriers: 1,
            min_contract_duration: Some("15s".to_string()),
            max_contract_duration: Some("1d".to_string()),
        };
        ContractsForDetails {
            available: vec![contract("CALL"), contract("PUT")],
            spot: Some(dec!(1000)),
        }
    }

    #[tokio::test]
    async fn test_execute_requires_account_and_market() {
        let (engine, _rx) = TradeEngine::new(Arc::new(MockTradingApi::new()));
        let result = engine.execute_trade_pair(&TradeConfig::default()).await;
        assert!(matches!(result, Err(ClientError::NotReady(_))));

        engine.inner.state.lock().await.account = Some(AccountInfo::new(dec!(100), "USD", "X"));
        let result = engine.execute_trade_pair(&TradeConfig::default()).await;
        assert!(matches!(result, Err(ClientError::NotReady(_))));
    }

    #[tokio::test]
    async fn test_execute_places_signed_legs() {
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        let (engine, mut snapshots) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(100)).await;

        let config = TradeConfig {
            positive_barrier: dec!(0.5),
            negative_barrier: dec!(25),
            ..Default::default()
        };
        let pair = engine.execute_trade_pair(&config).await.unwrap();

        assert_eq!(pair.status, PairStatus::Active);
        assert_eq!(pair.higher.barrier, dec!(0.5));
        // Clamped to the market's max barrier and negated
        assert_eq!(pair.lower.barrier, dec!(-10));
        assert_eq!(pair.total_stake, dec!(2));
        assert_eq!(pair.higher.status, TradeStatus::Active);
        assert_eq!(pair.higher.contract_id, Some(100));
        assert_eq!(pair.lower.contract_id, Some(101));

        let snapshot = snapshots.borrow_and_update().clone();
        assert_eq!(snapshot.trade_pairs.len(), 1);
        assert_eq!(snapshot.trade_pairs[0].id, pair.id);
    }

    #[tokio::test]
    async fn test_stake_escalates_after_two_losses() {
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(1000)).await;

        engine.inner.state.lock().await.consecutive_losses = 2;
        let pair = engine.execute_trade_pair(&TradeConfig::default()).await.unwrap();
        assert_eq!(pair.higher.stake, dec!(4.0));
        assert_eq!(pair.lower.stake, dec!(4.0));

        engine.inner.state.lock().await.consecutive_losses = 12;
        let pair = engine.execute_trade_pair(&TradeConfig::default()).await.unwrap();
        assert_eq!(pair.higher.stake, dec!(10.0));
    }

    #[tokio::test]
    async fn test_partial_failure_sells_surviving_leg() {
        let mut api = MockTradingApi::new();
        api.expect_proposal().returning(|terms| {
            Ok(ProposalDetails {
                id: format!("prop-{}", terms.side),
                ask_price: terms.stake,
                payout: terms.stake * dec!(1.9),
                spot: None,
            })
        });
        api.expect_buy().returning(|id, price| {
            if id == "prop-lower" {
                return Err(ClientError::Remote {
                    code: "InsufficientBalance".to_string(),
                    message: "Your account balance is insufficient".to_string(),
                });
            }
            Ok(BuyDetails {
                contract_id: 555,
                buy_price: price,
                payout: price * dec!(1.9),
                transaction_id: 9,
                longcode: None,
                start_time: None,
            })
        });
        api.expect_sell()
            .withf(|contract_id| *contract_id == 555)
            .times(1)
            .returning(|contract_id| {
                Ok(SellDetails {
                    sold_for: dec!(0.9),
                    transaction_id: 10,
                    contract_id: Some(contract_id),
                })
            });

        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(100)).await;

        let result = engine.execute_trade_pair(&TradeConfig::default()).await;
        assert!(matches!(result, Err(ClientError::TradeSubmissionFailed(_))));
        assert!(engine.state().await.trade_pairs.is_empty());
    }

    #[tokio::test]
    async fn test_settlement_completes_pair_and_tracks_streak() {
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(100)).await;
        let pair = engine.execute_trade_pair(&TradeConfig::default()).await.unwrap();
        let (higher, lower) = (pair.higher.contract_id.unwrap(), pair.lower.contract_id.unwrap());

        assert_eq!(engine.update_trade_result(999, dec!(1), true).await, SettlementOutcome::UnknownContract);
        assert_eq!(engine.update_trade_result(higher, dec!(-1), false).await, SettlementOutcome::LegSettled);
        assert_eq!(engine.state().await.consecutive_losses, 0);
        assert_eq!(
            engine.update_trade_result(lower, dec!(-1), false).await,
            SettlementOutcome::PairCompleted { total_profit: dec!(-2) }
        );
        assert_eq!(engine.update_trade_result(lower, dec!(5), true).await, SettlementOutcome::AlreadySettled);

        let state = engine.state().await;
        assert_eq!(state.consecutive_losses, 1);
        assert_eq!(state.total_loss, dec!(2));
        assert_eq!(state.trade_pairs[0].total_profit, Some(dec!(-2)));
        assert_eq!(state.trade_pairs[0].status, PairStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_trading_cycles_until_stopped() {
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(1000)).await;

        engine.start_auto_trading(TradeConfig::default()).await.unwrap();
        assert!(engine.state().await.is_trading);

        // Pairs at t = 0s, 15s and 30s
        tokio::time::sleep(Duration::from_secs(40)).await;
        engine.stop_auto_trading().await;
        assert_eq!(engine.state().await.trade_pairs.len(), 3);
        assert!(!engine.state().await.is_trading);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(engine.state().await.trade_pairs.len(), 3);

        // Stopping again is harmless
        engine.stop_auto_trading().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_trading_reads_current_loss_streak() {
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(1000)).await;

        engine.start_auto_trading(TradeConfig::default()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let first = engine.state().await.trade_pairs[0].clone();
        engine.update_trade_result(first.higher.contract_id.unwrap(), dec!(-1), false).await;
        engine.update_trade_result(first.lower.contract_id.unwrap(), dec!(-1), false).await;

        tokio::time::sleep(Duration::from_secs(15)).await;
        engine.stop_auto_trading().await;

        let state = engine.state().await;
        assert_eq!(state.trade_pairs.len(), 2);
        assert_eq!(state.trade_pairs[0].higher.stake, dec!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(1000)).await;

        engine.start_auto_trading(TradeConfig::default()).await.unwrap();
        let second = engine.start_auto_trading(TradeConfig::default()).await;
        assert!(matches!(second, Err(ClientError::AlreadyTrading)));
        engine.stop_auto_trading().await;

        // Restarting after a stop is allowed
        engine.start_auto_trading(TradeConfig::default()).await.unwrap();
        engine.stop_auto_trading().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_halts_when_unaffordable() {
        let mut api = MockTradingApi::new();
        api.expect_proposal().times(0);
        api.expect_buy().times(0);
        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(1.5)).await;

        engine.start_auto_trading(TradeConfig::default()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let state = engine.state().await;
        assert!(!state.is_trading);
        assert!(state.last_error.is_some());
        assert!(state.trade_pairs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_halts_on_submission_error() {
        let mut api = MockTradingApi::new();
        api.expect_proposal().returning(|_| {
            Err(ClientError::Remote {
                code: "MarketIsClosed".to_string(),
                message: "This market is presently closed.".to_string(),
            })
        });
        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(100)).await;

        engine.start_auto_trading(TradeConfig::default()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let state = engine.state().await;
        assert!(!state.is_trading);
        assert!(state.last_error.unwrap().contains("MarketIsClosed"));
    }

    #[tokio::test]
    async fn test_locked_balance_requires_account() {
        let (engine, mut snapshots) = TradeEngine::new(Arc::new(MockTradingApi::new()));
        assert!(matches!(
            engine.set_locked_balance(dec!(10)).await,
            Err(ClientError::NotReady(_))
        ));

        seed(&engine, dec!(100)).await;
        let account = engine.set_locked_balance(dec!(30)).await.unwrap();
        assert_eq!(account.available_balance, dec!(70));
        let snapshot = snapshots.borrow().clone();
        assert_eq!(snapshot.account.unwrap().locked_balance, dec!(30));

        let account = engine.set_locked_balance(dec!(500)).await.unwrap();
        assert_eq!(account.available_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_initialize_follows_balance_pushes() {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let subscription = Subscription::new(
            SubscriptionKey::new(ChannelKind::Balance),
            Some("bal-1".to_string()),
            push_rx,
        );

        let mut api = MockTradingApi::new();
        api.expect_authorize().returning(|_| {
            Ok(AuthorizeDetails {
                balance: dec!(100),
                currency: "USD".to_string(),
                loginid: "VRTC1".to_string(),
                email: None,
                fullname: None,
                is_virtual: Some(1),
            })
        });
        api.expect_subscribe_balance().return_once(move || {
            Ok((
                BalanceDetails {
                    balance: dec!(100),
                    currency: "USD".to_string(),
                    loginid: Some("VRTC1".to_string()),
                },
                subscription,
            ))
        });

        api.expect_status_events()
            .times(1)
            .returning(|| mpsc::unbounded_channel().1);

        let (engine, mut snapshots) = TradeEngine::new(Arc::new(api));
        let account = engine.initialize("token").await.unwrap();
        assert_eq!(account.balance, dec!(100));
        assert!(engine.state().await.is_connected);

        push_tx
            .send(json!({"msg_type": "balance", "balance": {"balance": 150.25, "currency": "USD"}}))
            .unwrap();
        let updated = snapshots
            .wait_for(|s| s.account.as_ref().map(|a| a.balance) == Some(dec!(150.25)))
            .await
            .unwrap()
            .clone();
        assert_eq!(updated.account.unwrap().available_balance, dec!(150.25));
    }

    #[tokio::test]
    async fn test_initialize_failure_stays_disconnected() {
        let mut api = MockTradingApi::new();
        api.expect_authorize().returning(|_| {
            Err(ClientError::Remote {
                code: "InvalidToken".to_string(),
                message: "The token is invalid.".to_string(),
            })
        });
        let (engine, _rx) = TradeEngine::new(Arc::new(api));

        let result = engine.initialize("bad").await;
        assert!(matches!(result, Err(ClientError::Init(_))));
        let state = engine.state().await;
        assert!(!state.is_connected);
        assert!(state.account.is_none());
    }

    #[tokio::test]
    async fn test_set_market_rejects_symbol_without_barriers() {
        let mut api = MockTradingApi::new();
        api.expect_contracts_for().returning(|_| {
            Ok(ContractsForDetails {
                available: vec![],
                spot: None,
            })
        });
        api.expect_subscribe_ticks().times(0);
        let (engine, _rx) = TradeEngine::new(Arc::new(api));

        let result = engine.set_market(&MarketConfig::default()).await;
        assert!(matches!(result, Err(ClientError::MarketUnavailable(_))));
        assert!(engine.state().await.market.is_none());
    }

    #[tokio::test]
    async fn test_set_market_tracks_ticks() {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let subscription = Subscription::new(SubscriptionKey::ticks("R_100"), Some("tick-1".to_string()), tick_rx);

        let mut api = MockTradingApi::new();
        api.expect_contracts_for().returning(|_| Ok(contracts_with_pair()));
        api.expect_subscribe_ticks().return_once(move |symbol| {
            Ok((
                TickDetails {
                    symbol: symbol.to_string(),
                    quote: dec!(1001.5),
                    epoch: 1,
                    pip_size: Some(2),
                },
                subscription,
            ))
        });
        let (engine, mut snapshots) = TradeEngine::new(Arc::new(api));

        let market = engine.set_market(&MarketConfig::default()).await.unwrap();
        assert_eq!(market.current_price, Some(dec!(1001.5)));

        tick_tx
            .send(json!({"msg_type": "tick", "tick": {"symbol": "R_100", "quote": 1002.25, "epoch": 2}}))
            .unwrap();
        let updated = snapshots
            .wait_for(|s| s.market.as_ref().and_then(|m| m.current_price) == Some(dec!(1002.25)))
            .await
            .unwrap()
            .clone();
        assert!(updated.market.unwrap().last_tick_at.is_some());
    }

    #[tokio::test]
    async fn test_disconnect_keeps_history() {
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        api.expect_disconnect().times(1).returning(|| Ok(()));
        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(100)).await;
        engine.execute_trade_pair(&TradeConfig::default()).await.unwrap();

        engine.disconnect().await;
        let state = engine.state().await;
        assert!(!state.is_connected);
        assert!(!state.is_trading);
        assert_eq!(state.trade_pairs.len(), 1);
        assert!(state.account.is_some());
    }

    #[tokio::test]
    async fn test_risk_calculation_uses_account() {
        let (engine, _rx) = TradeEngine::new(Arc::new(MockTradingApi::new()));
        assert!(engine.risk_calculation(&TradeConfig::default()).await.is_err());

        seed(&engine, dec!(100)).await;
        let config = TradeConfig {
            risk_percentage: dec!(50),
            ..Default::default()
        };
        let calc = engine.risk_calculation(&config).await.unwrap();
        assert_eq!(calc.recommended_stake, dec!(0.80));
    }

    #[tokio::test]
    async fn test_execute_checks_balance_against_escalated_stake() {
        let mut api = MockTradingApi::new();
        api.expect_proposal().times(0);
        api.expect_buy().times(0);
        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(5)).await;
        engine.inner.state.lock().await.consecutive_losses = 2;

        match engine.execute_trade_pair(&TradeConfig::default()).await {
            Err(ClientError::InsufficientBalance { required, available }) => {
                assert_eq!(required, dec!(8));
                assert_eq!(available, dec!(5));
            }
            other => panic!("Expected insufficient balance, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_settled_between_cycles_is_rechecked() {
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(5)).await;
        engine.inner.state.lock().await.consecutive_losses = 1;

        engine.start_auto_trading(TradeConfig::default()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let first = engine.state().await.trade_pairs[0].clone();
        assert_eq!(first.higher.stake, dec!(2));

        // The streak grows to 2 while the loop waits: 2 x 4 no longer fits in 5
        engine.update_trade_result(first.higher.contract_id.unwrap(), dec!(-2), false).await;
        engine.update_trade_result(first.lower.contract_id.unwrap(), dec!(-2), false).await;
        tokio::time::sleep(Duration::from_secs(15)).await;

        let state = engine.state().await;
        assert_eq!(state.trade_pairs.len(), 1);
        assert!(!state.is_trading);
        assert!(state.last_error.unwrap().contains("Insufficient available balance"));
    }

    #[tokio::test]
    async fn test_failed_unwind_is_reported() {
        let mut api = MockTradingApi::new();
        api.expect_proposal().returning(|terms| {
            Ok(ProposalDetails {
                id: format!("prop-{}", terms.side),
                ask_price: terms.stake,
                payout: terms.stake * dec!(1.9),
                spot: None,
            })
        });
        api.expect_buy().returning(|id, price| {
            if id == "prop-higher" {
                return Err(ClientError::Remote {
                    code: "ContractBuyValidationError".to_string(),
                    message: "Barrier is out of range".to_string(),
                });
            }
            Ok(BuyDetails {
                contract_id: 777,
                buy_price: price,
                payout: price * dec!(1.9),
                transaction_id: 3,
                longcode: None,
                start_time: None,
            })
        });
        api.expect_sell()
            .times(1)
            .returning(|_| Err(ClientError::Disconnected("connection closed".to_string())));

        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(100)).await;

        match engine.execute_trade_pair(&TradeConfig::default()).await {
            Err(ClientError::TradeSubmissionFailed(reason)) => {
                assert!(reason.contains("contract 777 is still open"));
            }
            other => panic!("Expected submission failure, got {:?}", other),
        }
        let state = engine.state().await;
        assert!(state.trade_pairs.is_empty());
        assert!(state.last_error.unwrap().contains("777"));
    }

    #[tokio::test]
    async fn test_engine_runs_without_observers() {
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        let (engine, snapshots) = TradeEngine::new(Arc::new(api));
        drop(snapshots);
        seed(&engine, dec!(100)).await;

        engine.set_locked_balance(dec!(10)).await.unwrap();
        engine.execute_trade_pair(&TradeConfig::default()).await.unwrap();
        assert_eq!(engine.state().await.trade_pairs.len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_restores_session() {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        api.expect_status_events().times(1).return_once(move || status_rx);
        api.expect_authorize().times(2).returning(|_| Ok(authorized()));
        api.expect_subscribe_balance().times(2).returning(balance_stream);
        api.expect_contracts_for().times(2).returning(|_| Ok(contracts_with_pair()));
        api.expect_subscribe_ticks().times(2).returning(tick_stream);
        // The stale tick stream is only dropped locally
        api.expect_unsubscribe()
            .withf(|_, subscription_id| subscription_id.is_none())
            .times(1)
            .returning(|_, _| Ok(()));

        let open_streams = Arc::new(std::sync::Mutex::new(Vec::new()));
        let streams = open_streams.clone();
        api.expect_subscribe_open_contracts().times(2).returning(move || {
            let (tx, rx) = mpsc::unbounded_channel();
            streams.lock().unwrap().push(tx);
            Ok(Subscription::<OpenContractResponse>::new(
                SubscriptionKey::new(ChannelKind::ProposalOpenContract),
                None,
                rx,
            ))
        });
        // Both legs settled while no feed was listening
        api.expect_open_contract().times(2).returning(|contract_id| {
            Ok(OpenContractDetails {
                contract_id: Some(contract_id),
                is_sold: Some(1),
                status: Some("lost".to_string()),
                profit: Some(dec!(-1)),
                ..Default::default()
            })
        });

        let (engine, mut snapshots) = TradeEngine::new(Arc::new(api));
        engine.initialize("token").await.unwrap();
        engine.set_market(&MarketConfig::default()).await.unwrap();
        engine.follow_settlements().await.unwrap();
        engine.execute_trade_pair(&TradeConfig::default()).await.unwrap();

        status_tx
            .send(ConnectionStatus::Disconnected(Some("stream ended".to_string())))
            .unwrap();
        snapshots.wait_for(|s| !s.is_connected).await.unwrap();

        status_tx.send(ConnectionStatus::Connected).unwrap();
        let restored = snapshots
            .wait_for(|s| s.is_connected && s.consecutive_losses == 1)
            .await
            .unwrap()
            .clone();
        assert_eq!(restored.trade_pairs[0].status, PairStatus::Completed);
        assert_eq!(restored.total_loss, dec!(2));
        assert!(restored.last_error.is_none());
        assert!(engine.is_following_settlements().await);
        assert_eq!(open_streams.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reconnect_exhaustion_halts_trading() {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        api.expect_status_events().times(1).return_once(move || status_rx);
        api.expect_authorize().times(1).returning(|_| Ok(authorized()));
        api.expect_subscribe_balance().times(1).returning(balance_stream);

        let (engine, mut snapshots) = TradeEngine::new(Arc::new(api));
        engine.initialize("token").await.unwrap();
        engine.inner.state.lock().await.market =
            Some(MarketData::from_config(&MarketConfig::default(), Some(dec!(1000))));
        engine.start_auto_trading(TradeConfig::default()).await.unwrap();

        status_tx.send(ConnectionStatus::Disconnected(None)).unwrap();
        status_tx
            .send(ConnectionStatus::ReconnectExhausted { attempts: 5 })
            .unwrap();

        let halted = snapshots
            .wait_for(|s| !s.is_trading && s.last_error.is_some())
            .await
            .unwrap()
            .clone();
        assert!(!halted.is_connected);
        assert!(halted.last_error.unwrap().contains("5 attempts"));
    }

    #[tokio::test]
    async fn test_failed_restore_halts_trading() {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        api.expect_status_events().times(1).return_once(move || status_rx);
        let mut authorizations = 0;
        api.expect_authorize().times(2).returning(move |_| {
            authorizations += 1;
            if authorizations == 1 {
                Ok(authorized())
            } else {
                Err(ClientError::Remote {
                    code: "InvalidToken".to_string(),
                    message: "The token is invalid.".to_string(),
                })
            }
        });
        api.expect_subscribe_balance().times(1).returning(balance_stream);

        let (engine, mut snapshots) = TradeEngine::new(Arc::new(api));
        engine.initialize("token").await.unwrap();
        engine.inner.state.lock().await.market =
            Some(MarketData::from_config(&MarketConfig::default(), Some(dec!(1000))));
        engine.start_auto_trading(TradeConfig::default()).await.unwrap();

        status_tx.send(ConnectionStatus::Disconnected(None)).unwrap();
        status_tx.send(ConnectionStatus::Connected).unwrap();

        let halted = snapshots
            .wait_for(|s| !s.is_trading && s.last_error.is_some())
            .await
            .unwrap()
            .clone();
        assert!(!halted.is_connected);
        assert!(halted.last_error.unwrap().contains("InvalidToken"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_waits_out_lost_connection() {
        let mut api = MockTradingApi::new();
        quoting_api(&mut api);
        let (engine, _rx) = TradeEngine::new(Arc::new(api));
        seed(&engine, dec!(100)).await;
        engine.inner.state.lock().await.is_connected = false;

        engine.start_auto_trading(TradeConfig::default()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        let state = engine.state().await;
        assert!(state.is_trading);
        assert!(state.trade_pairs.is_empty());

        // Next cycle at t = 30s
        engine.inner.state.lock().await.is_connected = true;
        tokio::time::sleep(Duration::from_secs(15)).await;
        engine.stop_auto_trading().await;
        assert_eq!(engine.state().await.trade_pairs.len(), 1);
    }

    #[test]
    fn test_cycle_interval_has_floor() {
        assert_eq!(cycle_interval(5), MIN_CYCLE_INTERVAL);
        assert_eq!(cycle_interval(15), Duration::from_secs(15));
        assert_eq!(cycle_interval(60), Duration::from_secs(60));
    }
}
