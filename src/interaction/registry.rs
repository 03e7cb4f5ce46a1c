//! In-flight interaction tracking.
//!
//! Every protocol round registers itself here and records each state
//! transition, so the admin surface and the CLI can report what is
//! outstanding without reaching into running tasks.

use alloy::primitives::TxHash;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::events::CorrelationToken;
use crate::interaction::round::RoundState;
use crate::lifecycle::Shutdown;

/// Latest known status of one interaction.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionStatus {
    pub id: Uuid,
    pub name: String,
    pub state: RoundState,
    pub request_tx: Option<TxHash>,
    /// Correlation token, rendered for humans.
    pub token: Option<String>,
    pub error: Option<String>,
    pub started_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Concurrent map of interactions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct InteractionRegistry {
    interactions: Arc<DashMap<Uuid, InteractionStatus>>,
}

impl InteractionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new interaction in the `Submitted` state.
    pub fn begin(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = SystemTime::now();
        self.interactions.insert(
            id,
            InteractionStatus {
                id,
                name: name.to_string(),
                state: RoundState::Submitted,
                request_tx: None,
                token: None,
                error: None,
                started_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn transition(&self, id: Uuid, state: RoundState) {
        if let Some(mut status) = self.interactions.get_mut(&id) {
            tracing::debug!(interaction = %id, from = ?status.state, to = ?state, "Round transition");
            status.state = state;
            status.updated_at = SystemTime::now();
        }
    }

    pub fn set_request_tx(&self, id: Uuid, hash: TxHash) {
        if let Some(mut status) = self.interactions.get_mut(&id) {
            status.request_tx = Some(hash);
            status.updated_at = SystemTime::now();
        }
    }

    pub fn set_token(&self, id: Uuid, token: &CorrelationToken) {
        if let Some(mut status) = self.interactions.get_mut(&id) {
            status.token = Some(token.to_string());
            status.updated_at = SystemTime::now();
        }
    }

    /// Move to a terminal failure state, keeping the error text.
    pub fn fail(&self, id: Uuid, state: RoundState, error: &str) {
        if let Some(mut status) = self.interactions.get_mut(&id) {
            status.state = state;
            status.error = Some(error.to_string());
            status.updated_at = SystemTime::now();
        }
    }

    pub fn get(&self, id: Uuid) -> Option<InteractionStatus> {
        self.interactions.get(&id).map(|entry| entry.value().clone())
    }

    /// All interactions, oldest first.
    pub fn list(&self) -> Vec<InteractionStatus> {
        let mut all: Vec<_> = self
            .interactions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|status| status.started_at);
        all
    }

    /// Interactions not yet in a terminal state.
    pub fn in_flight(&self) -> usize {
        self.interactions
            .iter()
            .filter(|entry| !entry.state.is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Forget interactions that finished at least `retention` ago. Returns how many were removed.
    pub fn prune_finished(&self, retention: Duration) -> usize {
        let before = self.interactions.len();
        self.interactions.retain(|_, status| {
            !status.state.is_terminal()
                || status.updated_at.elapsed().map_or(true, |age| age < retention)
        });
        before - self.interactions.len()
    }

    /// Prune every `every` until shutdown.
    pub fn spawn_pruner(&self, every: Duration, retention: Duration, shutdown: &Shutdown) -> JoinHandle<()> {
        let registry = self.clone();
        let cancelled = shutdown.cancelled();
        tokio::spawn(async move {
            tokio::pin!(cancelled);
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = registry.prune_finished(retention);
                        if removed > 0 {
                            tracing::debug!(removed, remaining = registry.len(), "Pruned finished interactions");
                        }
                    }
                    _ = &mut cancelled => break,
                }
            }
        })
    }
}
