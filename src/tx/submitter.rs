//! Building, signing and broadcasting state-changing calls.
//!
//! # Responsibilities
//! - Reserve nonces so concurrent interactions never collide
//! - Enforce the gas price ceiling and apply the safety multiplier
//! - Estimate gas (which also surfaces obvious reverts before broadcast)
//! - Hand back a [`PendingTransaction`] once the node accepted the call
//!
//! Submission failures are never retried here; resubmitting a call with
//! side effects is the caller's decision.

use alloy::network::TransactionBuilder;
use alloy::primitives::Address;
use alloy::rpc::types::TransactionRequest;
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::LedgerConfig;
use crate::error::{RendezvousError, RendezvousResult};
use crate::ledger::{Ledger, Wallet};
use crate::observability::metrics;
use crate::tx::{ContractCall, PendingTransaction};

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Submits calls from one wallet.
#[derive(Clone)]
pub struct Submitter {
    ledger: Arc<dyn Ledger>,
    wallet: Wallet,
    gas_price_multiplier: f64,
    max_gas_price_gwei: u64,
}

impl Submitter {
    pub fn new(ledger: Arc<dyn Ledger>, wallet: Wallet, config: &LedgerConfig) -> Self {
        Self {
            ledger,
            wallet,
            gas_price_multiplier: config.gas_price_multiplier,
            max_gas_price_gwei: config.max_gas_price_gwei,
        }
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Build a fully specified transaction request for `call`.
    ///
    /// The nonce is reserved last so that a failed estimation leaves no gap.
    pub async fn build(&self, call: &ContractCall) -> RendezvousResult<TransactionRequest> {
        let gas_price = self.ledger.gas_price().await?;
        let gas_price_gwei = gas_price / WEI_PER_GWEI;
        if gas_price_gwei > self.max_gas_price_gwei as u128 {
            return Err(RendezvousError::GasPriceTooHigh {
                current_gwei: gas_price_gwei as u64,
                max_gwei: self.max_gas_price_gwei,
            });
        }
        let adjusted_gas_price = (gas_price as f64 * self.gas_price_multiplier) as u128;

        let request = TransactionRequest::default()
            .with_from(self.address())
            .with_to(call.to)
            .with_value(call.value)
            .with_input(call.data.clone());

        let estimate = self.ledger.estimate_gas(request.clone()).await?;
        // 20% headroom over the estimate
        let gas_limit = estimate.saturating_add(estimate / 5);

        let chain_nonce = self.ledger.transaction_count(self.address()).await?;
        let nonce = self.wallet.reserve_nonce(chain_nonce);

        Ok(request
            .with_nonce(nonce)
            .with_gas_price(adjusted_gas_price)
            .with_gas_limit(gas_limit)
            .with_chain_id(self.wallet.chain_id()))
    }

    /// Submit `call` and return the pending handle.
    pub async fn submit(&self, call: ContractCall) -> RendezvousResult<PendingTransaction> {
        let request = match self.build(&call).await {
            Ok(request) => request,
            Err(e) => {
                metrics::record_submission("rejected");
                return Err(e);
            }
        };
        let nonce = request.nonce.unwrap_or_default();

        let hash = match self.ledger.send_transaction(request).await {
            Ok(hash) => hash,
            Err(e) => {
                self.wallet.release_nonce(nonce);
                tracing::debug!(nonce, "Released unused nonce");
                metrics::record_submission("rejected");
                tracing::warn!(to = %call.to, nonce, error = %e, "Submission failed");
                return Err(match e {
                    RendezvousError::SubmissionFailed(_) => e,
                    other => RendezvousError::SubmissionFailed(other.to_string()),
                });
            }
        };

        metrics::record_submission("accepted");
        tracing::info!(
            tx_hash = %hash,
            to = %call.to,
            value = %call.value,
            nonce,
            "Transaction submitted"
        );

        Ok(PendingTransaction {
            hash,
            from: self.address(),
            to: call.to,
            value: call.value,
            data: call.data,
            nonce,
            submitted_at: SystemTime::now(),
        })
    }
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("address", &self.address())
            .field("gas_price_multiplier", &self.gas_price_multiplier)
            .field("max_gas_price_gwei", &self.max_gas_price_gwei)
            .finish()
    }
}
