//! Keyed correlation of follow-up events to the interactions awaiting them.
//!
//! A ticket is armed on a route (event name, token field, optional emitter)
//! *before* the triggering transaction is submitted, so nothing published
//! after that point can be missed. Once the token is known the ticket
//! claims it: either a record already parked for that token is returned,
//! or the ticket waits for the hub to deliver one.
//!
//! Records are only ever delivered to a ticket whose token equals the
//! record's token and that was armed before the record was published.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::error::{RendezvousError, RendezvousResult};
use crate::events::{CorrelationSpec, CorrelationToken, LogRecord};
use crate::observability::metrics;
use crate::rendezvous::hub::HubShared;

#[derive(Debug)]
enum TicketState {
    /// Armed, token not known yet.
    Armed,
    Waiting {
        token: CorrelationToken,
        sender: oneshot::Sender<LogRecord>,
    },
    Fulfilled,
}

#[derive(Debug)]
struct TicketEntry {
    spec: CorrelationSpec,
    armed_at: u64,
    state: TicketState,
}

/// A record observed while some ticket on its route was still unclaimed.
#[derive(Debug)]
struct Parked {
    seq: u64,
    spec: CorrelationSpec,
    token: CorrelationToken,
    record: LogRecord,
}

/// Result of claiming a token.
#[derive(Debug)]
pub(crate) enum Claim {
    Ready(LogRecord),
    Pending(oneshot::Receiver<LogRecord>),
}

/// The table itself. Not synchronized; the hub owns it behind its lock.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    next_id: u64,
    tickets: HashMap<u64, TicketEntry>,
    parked: Vec<Parked>,
    closed: bool,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a ticket at hub sequence `seq`; only records published after it qualify.
    pub fn arm(&mut self, spec: CorrelationSpec, seq: u64) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.tickets.insert(
            id,
            TicketEntry {
                spec,
                armed_at: seq,
                state: TicketState::Armed,
            },
        );
        id
    }

    /// Offer a published record. Returns how many tickets were resolved.
    pub fn observe(&mut self, seq: u64, record: &LogRecord) -> usize {
        if self.closed {
            return 0;
        }

        let mut routes: Vec<CorrelationSpec> = Vec::new();
        for entry in self.tickets.values() {
            let open = !matches!(entry.state, TicketState::Fulfilled);
            if open
                && entry.armed_at < seq
                && entry.spec.matches_event(record)
                && !routes.contains(&entry.spec)
            {
                routes.push(entry.spec.clone());
            }
        }

        let mut resolved = 0;
        for spec in routes {
            let token = match record.token(&spec.field) {
                Ok(token) => token,
                Err(e) => {
                    tracing::debug!(event = %record.event, error = %e, "Record has no correlation field");
                    continue;
                }
            };

            let target = self
                .tickets
                .iter()
                .filter(|(_, entry)| {
                    entry.spec == spec
                        && entry.armed_at < seq
                        && matches!(&entry.state, TicketState::Waiting { token: t, .. } if *t == token)
                })
                .min_by_key(|(_, entry)| entry.armed_at)
                .map(|(id, _)| *id);

            if let Some(entry) = target.and_then(|id| self.tickets.get_mut(&id)) {
                if let TicketState::Waiting { sender, .. } =
                    std::mem::replace(&mut entry.state, TicketState::Fulfilled)
                {
                    if sender.send(record.clone()).is_ok() {
                        resolved += 1;
                        continue;
                    }
                }
            }

            let unclaimed = self.tickets.values().any(|entry| {
                entry.spec == spec && entry.armed_at < seq && matches!(entry.state, TicketState::Armed)
            });
            if unclaimed {
                self.parked.push(Parked {
                    seq,
                    spec,
                    token,
                    record: record.clone(),
                });
            }
        }
        resolved
    }

    /// Attach a token to an armed ticket.
    ///
    /// `None` when the ticket is unknown, already claimed, or the table closed.
    pub(crate) fn claim(&mut self, id: u64, token: CorrelationToken) -> Option<Claim> {
        if self.closed {
            return None;
        }
        let entry = self.tickets.get_mut(&id)?;
        if !matches!(entry.state, TicketState::Armed) {
            return None;
        }

        let spec = entry.spec.clone();
        let parked = self
            .parked
            .iter()
            .position(|p| p.spec == spec && p.token == token && p.seq > entry.armed_at);

        let claim = match parked {
            Some(position) => {
                entry.state = TicketState::Fulfilled;
                Claim::Ready(self.parked.remove(position).record)
            }
            None => {
                let (sender, receiver) = oneshot::channel();
                entry.state = TicketState::Waiting { token, sender };
                Claim::Pending(receiver)
            }
        };
        self.prune(&spec);
        Some(claim)
    }

    /// Remove a ticket. Returns `false` if it was already gone.
    pub fn release(&mut self, id: u64) -> bool {
        let Some(entry) = self.tickets.remove(&id) else {
            return false;
        };
        self.prune(&entry.spec);
        true
    }

    /// Fail every waiting ticket and refuse new claims.
    pub fn close(&mut self) {
        self.closed = true;
        for entry in self.tickets.values_mut() {
            // Dropping the sender wakes the waiter with a closed channel
            entry.state = TicketState::Fulfilled;
        }
        self.parked.clear();
    }

    /// Tickets currently registered (armed, waiting or fulfilled but not yet released).
    pub fn armed(&self) -> usize {
        self.tickets.len()
    }

    pub fn parked(&self) -> usize {
        self.parked.len()
    }

    /// Drop parked records no unclaimed ticket on `spec` could still claim.
    fn prune(&mut self, spec: &CorrelationSpec) {
        let floor = self
            .tickets
            .values()
            .filter(|entry| entry.spec == *spec && matches!(entry.state, TicketState::Armed))
            .map(|entry| entry.armed_at)
            .min();
        self.parked
            .retain(|p| p.spec != *spec || floor.is_some_and(|armed_at| p.seq > armed_at));
    }
}

/// A registered interest in one follow-up event.
///
/// Arm it before submitting the triggering transaction, then hand it the
/// token with [`Ticket::wait_for`]. The ticket leaves the table when it
/// is released, dropped, or its wait finishes, whichever comes first.
pub struct Ticket {
    id: u64,
    spec: CorrelationSpec,
    armed_at: u64,
    hub: Arc<HubShared>,
    released: bool,
}

impl Ticket {
    pub(crate) fn new(id: u64, spec: CorrelationSpec, armed_at: u64, hub: Arc<HubShared>) -> Self {
        Self {
            id,
            spec,
            armed_at,
            hub,
            released: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn spec(&self) -> &CorrelationSpec {
        &self.spec
    }

    pub fn armed_at(&self) -> u64 {
        self.armed_at
    }

    /// Wait for the record carrying `token`, failing with `Timeout` after `deadline`.
    pub async fn wait_for(self, token: CorrelationToken, deadline: Duration) -> RendezvousResult<LogRecord> {
        self.wait_for_until(token, deadline, std::future::pending()).await
    }

    /// As [`Ticket::wait_for`], but gives up with `Cancelled` when `cancel` completes.
    pub async fn wait_for_until<F>(
        mut self,
        token: CorrelationToken,
        deadline: Duration,
        cancel: F,
    ) -> RendezvousResult<LogRecord>
    where
        F: Future<Output = ()>,
    {
        tracing::debug!(
            event = %self.spec.event,
            field = %self.spec.field,
            token = %token,
            "Awaiting correlated event"
        );

        let result = match self.hub.claim(self.id, token.clone()) {
            None => Err(RendezvousError::SubscriptionClosed),
            Some(Claim::Ready(record)) => Ok(record),
            Some(Claim::Pending(receiver)) => {
                tokio::select! {
                    received = timeout(deadline, receiver) => match received {
                        Ok(Ok(record)) => Ok(record),
                        Ok(Err(_)) => Err(RendezvousError::SubscriptionClosed),
                        Err(_) => Err(RendezvousError::Timeout {
                            stage: "fulfillment",
                            elapsed: deadline,
                        }),
                    },
                    _ = cancel => Err(RendezvousError::Cancelled),
                }
            }
        };
        self.release();

        let label = match &result {
            Ok(_) => "resolved",
            Err(RendezvousError::Timeout { .. }) => "timeout",
            Err(RendezvousError::Cancelled) => "cancelled",
            Err(_) => "closed",
        };
        metrics::record_fulfillment(label);
        match &result {
            Ok(record) => tracing::info!(
                event = %record.event,
                token = %token,
                block = ?record.block_number,
                "Correlated event observed"
            ),
            Err(e) => tracing::warn!(event = %self.spec.event, token = %token, error = %e, "Correlated wait ended"),
        }
        result
    }

    /// Leave the table. Returns `true` only for the call that actually released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.hub.release_ticket(self.id)
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("armed_at", &self.armed_at)
            .field("released", &self.released)
            .finish()
    }
}
