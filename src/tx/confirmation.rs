//! Waiting for a submitted transaction to reach the required depth.
//!
//! A transaction has `head - inclusion_block + 1` confirmations once its
//! receipt exists: one when mined, two with one block on top, and so on.
//! The waiter polls the receipt and the head on a fixed ticker and
//! returns the decoded logs once the required count is observed.

use alloy::primitives::{TxHash, B256};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};

use crate::config::ConfirmationConfig;
use crate::error::{RendezvousError, RendezvousResult};
use crate::events::{find_event, CorrelationSpec, CorrelationToken, EventRegistry, LogRecord};
use crate::ledger::Ledger;
use crate::observability::metrics;
use crate::resilience::RetryBackoff;

/// How long and how deep to wait.
#[derive(Debug, Clone)]
pub struct ConfirmationPolicy {
    /// Total inclusions required; must be at least 1.
    pub required: u32,
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Consecutive polls without the node knowing the transaction before
    /// it is reported as dropped.
    pub drop_grace_polls: u32,
}

impl ConfirmationPolicy {
    pub fn from_config(config: &ConfirmationConfig) -> Self {
        Self {
            required: config.required,
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
            drop_grace_polls: config.drop_grace_polls,
        }
    }

    pub fn with_required(mut self, required: u32) -> Self {
        self.required = required;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::from_config(&ConfirmationConfig::default())
    }
}

/// A transaction buried at the required depth, with its decoded logs.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmedTransaction {
    pub hash: TxHash,
    pub block_number: u64,
    pub block_hash: Option<B256>,
    /// Confirmations observed when the wait returned (at least the requested count).
    pub confirmations: u64,
    pub gas_used: u64,
    #[serde(skip)]
    pub logs: Vec<LogRecord>,
}

impl ConfirmedTransaction {
    /// First log record named `event`.
    pub fn find_event(&self, event: &str) -> RendezvousResult<&LogRecord> {
        find_event(&self.logs, event)
    }

    /// Extract the correlation token described by `spec`.
    pub fn extract(&self, spec: &CorrelationSpec) -> RendezvousResult<CorrelationToken> {
        spec.extract(&self.logs)
    }

    /// JSON view with the decoded logs inlined.
    pub fn to_json(&self) -> RendezvousResult<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        value["logs"] = self.logs.iter().map(LogRecord::to_json).collect();
        Ok(value)
    }
}

/// Per-wait bookkeeping between polls.
#[derive(Debug, Default)]
struct Tracker {
    unknown_polls: u32,
    included_at: Option<u64>,
}

enum Step {
    Pending,
    Included { block_number: u64, confirmations: u64 },
    Confirmed(ConfirmedTransaction),
}

/// Polls the ledger until a transaction is confirmed, dropped or reverted.
#[derive(Clone)]
pub struct ConfirmationWaiter {
    ledger: Arc<dyn Ledger>,
    registry: Arc<EventRegistry>,
    policy: ConfirmationPolicy,
}

impl ConfirmationWaiter {
    pub fn new(ledger: Arc<dyn Ledger>, registry: Arc<EventRegistry>, policy: ConfirmationPolicy) -> Self {
        Self {
            ledger,
            registry,
            policy,
        }
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    /// Wait for the policy's confirmation count.
    pub async fn wait(&self, hash: TxHash) -> RendezvousResult<ConfirmedTransaction> {
        self.wait_with(hash, self.policy.required, std::future::pending()).await
    }

    /// Wait for `required` confirmations, giving up early when `cancel` completes.
    pub async fn wait_with<F>(
        &self,
        hash: TxHash,
        required: u32,
        cancel: F,
    ) -> RendezvousResult<ConfirmedTransaction>
    where
        F: Future<Output = ()>,
    {
        if required == 0 {
            return Err(RendezvousError::Config(
                "confirmations must be at least 1".into(),
            ));
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            result = timeout(self.policy.timeout, self.poll(hash, required)) => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(RendezvousError::Timeout {
                    stage: "confirmation",
                    elapsed: self.policy.timeout,
                }),
            },
            _ = cancel => Err(RendezvousError::Cancelled),
        };

        let label = match &outcome {
            Ok(_) => "confirmed",
            Err(RendezvousError::TransactionDropped(_)) => "dropped",
            Err(RendezvousError::Reverted { .. }) => "reverted",
            Err(RendezvousError::Timeout { .. }) => "timeout",
            Err(RendezvousError::Cancelled) => "cancelled",
            Err(_) => "error",
        };
        metrics::record_confirmation(label, started.elapsed());

        match &outcome {
            Ok(confirmed) => tracing::info!(
                tx_hash = %hash,
                block = confirmed.block_number,
                confirmations = confirmed.confirmations,
                logs = confirmed.logs.len(),
                "Transaction confirmed"
            ),
            Err(e) => tracing::warn!(tx_hash = %hash, error = %e, "Confirmation wait failed"),
        }
        outcome
    }

    async fn poll(&self, hash: TxHash, required: u32) -> RendezvousResult<ConfirmedTransaction> {
        let mut ticker = interval(self.policy.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backoff = RetryBackoff::new(self.policy.poll_interval, self.policy.poll_interval * 16);
        let mut tracker = Tracker::default();

        loop {
            ticker.tick().await;

            match self.step(hash, required, &mut tracker).await {
                Ok(Step::Confirmed(confirmed)) => return Ok(confirmed),
                Ok(Step::Included {
                    block_number,
                    confirmations,
                }) => {
                    backoff.reset();
                    tracing::debug!(
                        tx_hash = %hash,
                        block = block_number,
                        confirmations,
                        required,
                        "Waiting for confirmations"
                    );
                }
                Ok(Step::Pending) => {
                    backoff.reset();
                    tracing::debug!(tx_hash = %hash, "Transaction pending");
                }
                Err(e) if e.is_transient() => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        tx_hash = %hash,
                        error = %e,
                        attempt = backoff.attempts(),
                        retry_in_ms = delay.as_millis() as u64,
                        "Transient error while polling confirmation"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn step(&self, hash: TxHash, required: u32, tracker: &mut Tracker) -> RendezvousResult<Step> {
        let Some(receipt) = self.ledger.transaction_receipt(hash).await? else {
            if let Some(block) = tracker.included_at.take() {
                tracing::warn!(tx_hash = %hash, block, "Receipt disappeared, transaction back to pending");
            }
            if self.ledger.is_transaction_known(hash).await? {
                tracker.unknown_polls = 0;
            } else {
                tracker.unknown_polls += 1;
                if tracker.unknown_polls >= self.policy.drop_grace_polls.max(1) {
                    return Err(RendezvousError::TransactionDropped(hash));
                }
            }
            return Ok(Step::Pending);
        };

        tracker.unknown_polls = 0;
        if tracker.included_at != Some(receipt.block_number) {
            tracing::debug!(tx_hash = %hash, block = receipt.block_number, "Transaction included");
            tracker.included_at = Some(receipt.block_number);
        }

        if !receipt.success {
            let reason = match self.ledger.revert_reason(hash, receipt.block_number).await {
                Ok(Some(reason)) => reason,
                Ok(None) => "execution reverted".to_string(),
                Err(e) => {
                    tracing::warn!(tx_hash = %hash, error = %e, "Could not replay reverted transaction");
                    "execution reverted (reason unavailable)".to_string()
                }
            };
            return Err(RendezvousError::Reverted { hash, reason });
        }

        let head = self.ledger.block_number().await?;
        // A lagging provider may report a head below the inclusion block
        let confirmations = if head >= receipt.block_number {
            head - receipt.block_number + 1
        } else {
            0
        };

        if confirmations < required as u64 {
            return Ok(Step::Included {
                block_number: receipt.block_number,
                confirmations,
            });
        }

        Ok(Step::Confirmed(ConfirmedTransaction {
            hash,
            block_number: receipt.block_number,
            block_hash: receipt.block_hash,
            confirmations,
            gas_used: receipt.gas_used,
            logs: self.registry.decode_all(&receipt.logs),
        }))
    }
}

impl std::fmt::Debug for ConfirmationWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationWaiter")
            .field("policy", &self.policy)
            .field("events", &self.registry.len())
            .finish()
    }
}
