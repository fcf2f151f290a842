//! Feeds contract settlements from the venue into the engine

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::trader::TradeEngine;
use crate::common::errors::Result;
use crate::common::types::SettlementOutcome;
use crate::deriv::messages::OpenContractDetails;

/// Watches every open contract and reports sold ones to the engine.
///
/// Owned by the engine, which restarts it on every new connection. Stops when
/// dropped.
pub(crate) struct SettlementFeed {
    task: JoinHandle<()>,
}

impl SettlementFeed {
    pub(crate) async fn start(engine: &TradeEngine) -> Result<Self> {
        let mut subscription = engine.api().subscribe_open_contracts().await?;
        info!("Settlement feed started");

        let engine = engine.downgrade();
        let task = tokio::spawn(async move {
            while let Some(update) = subscription.recv().await {
                let Some(engine) = engine.upgrade() else { break };
                apply_update(&engine, update.proposal_open_contract).await;
            }
            info!("Settlement feed ended");
        });

        Ok(Self { task })
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SettlementFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Report `contract` to the engine if it has been sold
pub(crate) async fn apply_update(engine: &TradeEngine, contract: OpenContractDetails) {
    if !contract.is_settled() {
        return;
    }
    let Some(contract_id) = contract.contract_id else {
        warn!("Settled contract update without a contract id");
        return;
    };

    let profit = contract.profit.unwrap_or_default();
    match engine
        .update_trade_result(contract_id, profit, contract.is_won())
        .await
    {
        SettlementOutcome::UnknownContract => {
            debug!(contract_id, "Ignoring settlement for a contract we did not place")
        }
        outcome => debug!(contract_id, ?outcome, "Settlement applied"),
    }
}
