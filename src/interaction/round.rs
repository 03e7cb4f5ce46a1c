//! One request/fulfillment protocol round.
//!
//! ```text
//! Submitted → AwaitingConfirmation → AwaitingFulfillment → Resolved
//!     │               │                     ├──────────→ TimedOut
//!     │               ├──→ Reverted / Dropped / TimedOut
//!     └──→ Failed (submission, missing event, cancellation)
//! ```
//!
//! The fulfillment ticket is armed before the request is submitted, so a
//! fast off-chain actor can never answer before the round is listening.

use alloy::primitives::TxHash;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{RendezvousError, RendezvousResult};
use crate::events::{CorrelationSpec, CorrelationToken, LogRecord};
use crate::interaction::registry::InteractionRegistry;
use crate::observability::metrics;
use crate::rendezvous::EventHub;
use crate::tx::{ConfirmationWaiter, ConfirmedTransaction, ContractCall, PendingTransaction, Submitter};

/// Where a round stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Submitted,
    AwaitingConfirmation,
    AwaitingFulfillment,
    Resolved,
    TimedOut,
    Reverted,
    Dropped,
    Failed,
}

impl RoundState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RoundState::Resolved
                | RoundState::TimedOut
                | RoundState::Reverted
                | RoundState::Dropped
                | RoundState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoundState::Submitted => "submitted",
            RoundState::AwaitingConfirmation => "awaiting_confirmation",
            RoundState::AwaitingFulfillment => "awaiting_fulfillment",
            RoundState::Resolved => "resolved",
            RoundState::TimedOut => "timed_out",
            RoundState::Reverted => "reverted",
            RoundState::Dropped => "dropped",
            RoundState::Failed => "failed",
        }
    }

    /// Terminal state a failed round ends in.
    pub fn for_error(error: &RendezvousError) -> Self {
        match error {
            RendezvousError::Timeout { .. } => RoundState::TimedOut,
            RendezvousError::Reverted { .. } => RoundState::Reverted,
            RendezvousError::TransactionDropped(_) => RoundState::Dropped,
            _ => RoundState::Failed,
        }
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a round submits and which events tie it together.
#[derive(Debug, Clone)]
pub struct RoundSpec {
    pub name: String,
    pub call: ContractCall,
    /// Event in the request transaction's logs carrying the token.
    pub request: CorrelationSpec,
    /// Later event answering the request.
    pub fulfillment: CorrelationSpec,
    pub confirmations: u32,
    pub fulfillment_timeout: Duration,
}

impl RoundSpec {
    pub fn new(
        name: impl Into<String>,
        call: ContractCall,
        request: CorrelationSpec,
        fulfillment: CorrelationSpec,
    ) -> Self {
        Self {
            name: name.into(),
            call,
            request,
            fulfillment,
            confirmations: 1,
            fulfillment_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn with_fulfillment_timeout(mut self, timeout: Duration) -> Self {
        self.fulfillment_timeout = timeout;
        self
    }
}

/// Handed to the off-chain actor once the request is confirmed.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub interaction: Uuid,
    pub request_tx: TxHash,
    pub token: CorrelationToken,
    pub confirmed: ConfirmedTransaction,
}

/// A resolved round.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub id: Uuid,
    pub pending: PendingTransaction,
    pub confirmed: ConfirmedTransaction,
    pub token: CorrelationToken,
    pub fulfillment: LogRecord,
}

/// Drives rounds from submission to fulfillment.
#[derive(Debug, Clone)]
pub struct RoundRunner {
    submitter: Submitter,
    waiter: ConfirmationWaiter,
    hub: EventHub,
    registry: InteractionRegistry,
}

impl RoundRunner {
    pub fn new(
        submitter: Submitter,
        waiter: ConfirmationWaiter,
        hub: EventHub,
        registry: InteractionRegistry,
    ) -> Self {
        Self {
            submitter,
            waiter,
            hub,
            registry,
        }
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn registry(&self) -> &InteractionRegistry {
        &self.registry
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Run a round whose fulfillment comes from an independent actor.
    pub async fn run(&self, spec: RoundSpec) -> RendezvousResult<RoundOutcome> {
        self.run_until(spec, std::future::pending()).await
    }

    /// As [`RoundRunner::run`], abandoning the round when `cancel` completes.
    pub async fn run_until<F>(&self, spec: RoundSpec, cancel: F) -> RendezvousResult<RoundOutcome>
    where
        F: Future<Output = ()>,
    {
        self.execute(spec, |_| async { Ok(()) }, cancel).await
    }

    /// Run a round and start `actor` once the token is known.
    ///
    /// The actor runs concurrently with the fulfillment wait; if it fails,
    /// the wait is abandoned and the round fails with the actor's error.
    pub async fn run_with_actor<A, Fut>(&self, spec: RoundSpec, actor: A) -> RendezvousResult<RoundOutcome>
    where
        A: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = RendezvousResult<()>>,
    {
        self.run_with_actor_until(spec, actor, std::future::pending()).await
    }

    /// As [`RoundRunner::run_with_actor`], abandoning the round when `cancel` completes.
    pub async fn run_with_actor_until<A, Fut, F>(
        &self,
        spec: RoundSpec,
        actor: A,
        cancel: F,
    ) -> RendezvousResult<RoundOutcome>
    where
        A: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = RendezvousResult<()>>,
        F: Future<Output = ()>,
    {
        self.execute(spec, actor, cancel).await
    }

    async fn execute<A, Fut, F>(&self, spec: RoundSpec, actor: A, cancel: F) -> RendezvousResult<RoundOutcome>
    where
        A: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = RendezvousResult<()>>,
        F: Future<Output = ()>,
    {
        let id = self.registry.begin(&spec.name);
        tracing::info!(interaction = %id, round = %spec.name, to = %spec.call.to, "Round started");

        let outcome = self.drive(id, &spec, actor, cancel).await;

        let state = match &outcome {
            Ok(_) => {
                self.registry.transition(id, RoundState::Resolved);
                RoundState::Resolved
            }
            Err(e) => {
                let state = RoundState::for_error(e);
                self.registry.fail(id, state, &e.to_string());
                state
            }
        };
        metrics::record_round(state.as_str());
        match &outcome {
            Ok(outcome) => tracing::info!(
                interaction = %id,
                round = %spec.name,
                token = %outcome.token,
                "Round resolved"
            ),
            Err(e) => tracing::warn!(interaction = %id, round = %spec.name, state = %state, error = %e, "Round ended"),
        }
        outcome
    }

    async fn drive<A, Fut, F>(&self, id: Uuid, spec: &RoundSpec, actor: A, cancel: F) -> RendezvousResult<RoundOutcome>
    where
        A: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = RendezvousResult<()>>,
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        // Armed before submission; released on every exit path by Drop
        let ticket = self.hub.arm(spec.fulfillment.clone());

        let pending = self.submitter.submit(spec.call.clone()).await?;
        self.registry.set_request_tx(id, pending.hash);
        self.registry.transition(id, RoundState::AwaitingConfirmation);

        let confirmed = self
            .waiter
            .wait_with(pending.hash, spec.confirmations, &mut cancel)
            .await?;

        let token = confirmed.extract(&spec.request)?;
        self.registry.set_token(id, &token);
        self.registry.transition(id, RoundState::AwaitingFulfillment);
        tracing::info!(
            interaction = %id,
            tx_hash = %pending.hash,
            event = %spec.request.event,
            token = %token,
            "Request confirmed, awaiting fulfillment"
        );

        let actor = actor(RequestContext {
            interaction: id,
            request_tx: pending.hash,
            token: token.clone(),
            confirmed: confirmed.clone(),
        });
        let wait = ticket.wait_for_until(token.clone(), spec.fulfillment_timeout, &mut cancel);
        tokio::pin!(wait);

        let fulfillment = tokio::select! {
            result = &mut wait => result,
            acted = actor => match acted {
                Ok(()) => wait.await,
                Err(e) => Err(e),
            },
        }?;

        Ok(RoundOutcome {
            id,
            pending,
            confirmed,
            token,
            fulfillment,
        })
    }
}
