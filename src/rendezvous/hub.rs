//! In-process fan-out of decoded records.
//!
//! # Responsibilities
//! - Assign every published record a strictly increasing sequence number
//! - Deliver records to matching live subscriptions
//! - Offer records to the correlation table
//! - Track listener and ticket registrations for observability
//!
//! All state sits behind one short-lived lock. Publishing, subscribing and
//! arming are serialized by it, which is what makes "only records published
//! after registration" hold without any timestamp comparisons.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::events::{CorrelationSpec, CorrelationToken, LogRecord};
use crate::observability::metrics;
use crate::rendezvous::correlation::{Claim, CorrelationTable, Ticket};
use crate::rendezvous::subscription::{EventFilter, Observed, Subscription};

struct Listener {
    filter: EventFilter,
    /// `None` once the hub closed.
    sender: Option<mpsc::UnboundedSender<Observed>>,
}

#[derive(Default)]
struct HubState {
    seq: u64,
    next_listener: u64,
    listeners: HashMap<u64, Listener>,
    table: CorrelationTable,
    closed: bool,
}

/// State shared between the hub and the handles it issues.
#[derive(Default)]
pub(crate) struct HubShared {
    state: Mutex<HubState>,
    subscription_releases: AtomicU64,
    ticket_releases: AtomicU64,
}

impl HubShared {
    pub(crate) fn remove_listener(&self, id: u64) -> bool {
        let (removed, remaining) = {
            let mut state = self.state.lock();
            let removed = state.listeners.remove(&id).is_some();
            (removed, state.listeners.len())
        };
        if removed {
            self.subscription_releases.fetch_add(1, Ordering::SeqCst);
            metrics::set_active_subscriptions(remaining);
        }
        removed
    }

    pub(crate) fn claim(&self, ticket: u64, token: CorrelationToken) -> Option<Claim> {
        self.state.lock().table.claim(ticket, token)
    }

    pub(crate) fn release_ticket(&self, ticket: u64) -> bool {
        let (released, remaining) = {
            let mut state = self.state.lock();
            let released = state.table.release(ticket);
            (released, state.table.armed())
        };
        if released {
            self.ticket_releases.fetch_add(1, Ordering::SeqCst);
            metrics::set_armed_tickets(remaining);
        }
        released
    }
}

/// Point-in-time view of the hub for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct HubSnapshot {
    pub last_seq: u64,
    pub subscriptions: usize,
    pub armed_tickets: usize,
    pub parked_records: usize,
    pub subscription_releases: u64,
    pub ticket_releases: u64,
    pub closed: bool,
}

/// Cloneable handle to the event hub.
#[derive(Clone, Default)]
pub struct EventHub {
    shared: Arc<HubShared>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish one record. Returns its sequence number, or `None` after [`EventHub::close`].
    pub fn publish(&self, record: LogRecord) -> Option<u64> {
        let (seq, delivered, resolved) = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            if state.closed {
                return None;
            }
            state.seq += 1;
            let seq = state.seq;

            let mut delivered = 0;
            for listener in state.listeners.values() {
                let Some(sender) = &listener.sender else {
                    continue;
                };
                if listener.filter.matches(&record)
                    && sender.send(Observed { seq, record: record.clone() }).is_ok()
                {
                    delivered += 1;
                }
            }
            let resolved = state.table.observe(seq, &record);
            (seq, delivered, resolved)
        };

        tracing::trace!(
            seq,
            event = %record.event,
            address = %record.address,
            delivered,
            resolved,
            "Record published"
        );
        Some(seq)
    }

    /// Publish records in order. Returns how many were accepted.
    pub fn publish_all(&self, records: impl IntoIterator<Item = LogRecord>) -> usize {
        records
            .into_iter()
            .map_while(|record| self.publish(record))
            .count()
    }

    /// Register a listener. It sees only records published after this call.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (id, established_at, count) = {
            let mut state = self.shared.state.lock();
            state.next_listener += 1;
            let id = state.next_listener;
            let established_at = state.seq;
            let sender = (!state.closed).then_some(sender);
            state.listeners.insert(
                id,
                Listener {
                    filter: filter.clone(),
                    sender,
                },
            );
            (id, established_at, state.listeners.len())
        };
        metrics::set_active_subscriptions(count);
        tracing::debug!(subscription = id, established_at, filter = ?filter, "Subscription registered");
        Subscription::new(id, filter, established_at, receiver, self.shared.clone())
    }

    /// Arm a correlation ticket. Must happen before the triggering transaction is sent.
    pub fn arm(&self, spec: CorrelationSpec) -> Ticket {
        let (id, armed_at, count) = {
            let mut state = self.shared.state.lock();
            let armed_at = state.seq;
            let id = state.table.arm(spec.clone(), armed_at);
            (id, armed_at, state.table.armed())
        };
        metrics::set_armed_tickets(count);
        tracing::debug!(ticket = id, event = %spec.event, field = %spec.field, armed_at, "Ticket armed");
        Ticket::new(id, spec, armed_at, self.shared.clone())
    }

    /// Close the hub: live subscriptions drain and end, waiting tickets fail.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        for listener in state.listeners.values_mut() {
            listener.sender = None;
        }
        state.table.close();
        tracing::info!(last_seq = state.seq, "Event hub closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Registered subscriptions not yet released.
    pub fn listener_count(&self) -> usize {
        self.shared.state.lock().listeners.len()
    }

    /// Correlation tickets not yet released.
    pub fn armed_count(&self) -> usize {
        self.shared.state.lock().table.armed()
    }

    /// Total subscription releases since the hub was created.
    pub fn releases(&self) -> u64 {
        self.shared.subscription_releases.load(Ordering::SeqCst)
    }

    pub fn ticket_releases(&self) -> u64 {
        self.shared.ticket_releases.load(Ordering::SeqCst)
    }

    pub fn last_seq(&self) -> u64 {
        self.shared.state.lock().seq
    }

    pub fn snapshot(&self) -> HubSnapshot {
        let state = self.shared.state.lock();
        HubSnapshot {
            last_seq: state.seq,
            subscriptions: state.listeners.len(),
            armed_tickets: state.table.armed(),
            parked_records: state.table.parked(),
            subscription_releases: self.shared.subscription_releases.load(Ordering::SeqCst),
            ticket_releases: self.shared.ticket_releases.load(Ordering::SeqCst),
            closed: state.closed,
        }
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub").field("snapshot", &self.snapshot()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::dyn_abi::DynSolValue;
    use alloy::primitives::{Address, U256};
    use std::time::Duration;
    use tokio::time::timeout;

    fn record(event: &str, id: u64) -> LogRecord {
        LogRecord::new(Address::repeat_byte(0x01), event)
            .with_field("requestId", DynSolValue::Uint(U256::from(id), 256))
    }

    #[tokio::test]
    async fn test_subscription_receives_later_records_only() {
        let hub = EventHub::new();
        hub.publish(record("WinnerPicked", 1));

        let mut sub = hub.subscribe(EventFilter::event("WinnerPicked"));
        assert_eq!(sub.established_at(), 1);
        hub.publish(record("RaffleEnter", 2));
        hub.publish(record("WinnerPicked", 3));

        let observed = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("record");
        assert_eq!(observed.seq, 3);
        assert_eq!(
            observed.record.token("requestId").unwrap(),
            CorrelationToken::from(U256::from(3))
        );
        assert!(sub.try_recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscriber_count_and_release_once() {
        let hub = EventHub::new();
        assert_eq!(hub.listener_count(), 0);

        let mut sub1 = hub.subscribe(EventFilter::all());
        let sub2 = hub.subscribe(EventFilter::all());
        assert_eq!(hub.listener_count(), 2);

        assert!(sub1.release());
        assert!(!sub1.release());
        assert_eq!(hub.listener_count(), 1);
        assert!(sub1.recv().await.is_none());

        drop(sub1);
        drop(sub2);
        assert_eq!(hub.listener_count(), 0);
        assert_eq!(hub.releases(), 2);
    }

    #[tokio::test]
    async fn test_ticket_resolves_through_hub() {
        let hub = EventHub::new();
        let ticket = hub.arm(CorrelationSpec::new("RandomWordsFulfilled", "requestId"));
        assert_eq!(hub.armed_count(), 1);

        hub.publish(record("RandomWordsFulfilled", 4));
        let resolved = ticket
            .wait_for(U256::from(4).into(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(resolved.event, "RandomWordsFulfilled");
        assert_eq!(hub.armed_count(), 0);
        assert_eq!(hub.ticket_releases(), 1);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions_and_tickets() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe(EventFilter::all());
        let ticket = hub.arm(CorrelationSpec::new("RandomWordsFulfilled", "requestId"));

        hub.close();
        assert!(hub.publish(record("RandomWordsFulfilled", 1)).is_none());
        assert!(sub.recv().await.is_none());

        let err = ticket
            .wait_for(U256::from(1).into(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::RendezvousError::SubscriptionClosed));
        assert!(hub.snapshot().closed);
    }

    #[test]
    fn test_publish_all_and_sequence() {
        let hub = EventHub::new();
        let count = hub.publish_all(vec![record("A", 1), record("B", 2), record("A", 3)]);
        assert_eq!(count, 3);
        assert_eq!(hub.last_seq(), 3);
    }
}
