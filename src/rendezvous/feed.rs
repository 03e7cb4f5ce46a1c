//! Live log feed: tails the ledger and publishes decoded records to the hub.
//!
//! # Responsibilities
//! - Start at the head observed when primed (history is never replayed)
//! - Poll new block ranges, bounded by `max_block_range` per request
//! - Stay `confirmation_lag` blocks behind the head when configured
//! - Publish decoded records in chain order
//!
//! Blocks are scanned exactly once; a range is only marked done after its
//! records were published.

use alloy::primitives::Address;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::FeedConfig;
use crate::error::RendezvousResult;
use crate::events::EventRegistry;
use crate::ledger::{Ledger, LogQuery};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::rendezvous::EventHub;
use crate::resilience::RetryBackoff;

/// Polls `eth_getLogs` and feeds the hub.
pub struct LogFeed {
    ledger: Arc<dyn Ledger>,
    registry: Arc<EventRegistry>,
    hub: EventHub,
    addresses: Vec<Address>,
    config: FeedConfig,
    /// First block not yet scanned; `None` until primed.
    next_block: Option<u64>,
}

impl LogFeed {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        registry: Arc<EventRegistry>,
        hub: EventHub,
        addresses: Vec<Address>,
        config: FeedConfig,
    ) -> Self {
        Self {
            ledger,
            registry,
            hub,
            addresses,
            config,
            next_block: None,
        }
    }

    /// Start scanning at `block` instead of the current head.
    pub fn starting_at(mut self, block: u64) -> Self {
        self.next_block = Some(block);
        self
    }

    pub fn next_block(&self) -> Option<u64> {
        self.next_block
    }

    /// Fix the starting point just past the current head. Returns the first block to scan.
    ///
    /// The lag only holds back the upper end of each scan; blocks mined
    /// before priming are never read.
    pub async fn prime(&mut self) -> RendezvousResult<u64> {
        if let Some(next) = self.next_block {
            return Ok(next);
        }
        let head = self.ledger.block_number().await?;
        let next = head + 1;
        self.next_block = Some(next);
        tracing::info!(head, next_block = next, contracts = self.addresses.len(), "Log feed primed");
        Ok(next)
    }

    /// Scan one range. Returns the number of records published.
    pub async fn poll_once(&mut self) -> RendezvousResult<usize> {
        let next = match self.next_block {
            Some(next) => next,
            None => {
                self.prime().await?;
                return Ok(0);
            }
        };

        let head = self.ledger.block_number().await?;
        let target = head.saturating_sub(self.config.confirmation_lag);
        if target < next {
            return Ok(0);
        }
        let to = target.min(next + self.config.max_block_range.max(1) - 1);

        let logs = self
            .ledger
            .logs(&LogQuery::new(self.addresses.clone(), next, to))
            .await?;
        let records = self.registry.decode_all(&logs);
        let decoded = records.len();
        let published = self.hub.publish_all(records);

        self.next_block = Some(to + 1);
        metrics::record_published(published);
        metrics::set_feed_block(to);

        if published > 0 {
            tracing::debug!(
                from_block = next,
                to_block = to,
                logs = logs.len(),
                decoded,
                published,
                "Published log records"
            );
        }
        Ok(published)
    }

    /// Poll until shutdown.
    pub async fn run(mut self, shutdown: Shutdown) {
        let mut shutdown_rx = shutdown.subscribe();
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backoff = RetryBackoff::new(self.config.poll_interval(), self.config.poll_interval() * 30);

        tracing::info!(
            interval_ms = self.config.poll_interval_ms,
            lag = self.config.confirmation_lag,
            "Log feed started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(_) => backoff.reset(),
                        Err(e) => {
                            let delay = backoff.next_delay();
                            tracing::warn!(
                                error = %e,
                                attempt = backoff.attempts(),
                                retry_in_ms = delay.as_millis() as u64,
                                "Log feed poll failed"
                            );
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = shutdown_rx.recv() => break,
                            }
                        }
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        tracing::info!(next_block = ?self.next_block, "Log feed stopped");
    }

    /// Run in the background until shutdown.
    pub fn spawn(self, shutdown: &Shutdown) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown.clone()))
    }
}

impl std::fmt::Debug for LogFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFeed")
            .field("addresses", &self.addresses)
            .field("next_block", &self.next_block)
            .field("config", &self.config)
            .finish()
    }
}
