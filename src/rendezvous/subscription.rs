//! Owned subscription handles.
//!
//! A [`Subscription`] is the only way to receive records from the hub.
//! It registers a listener when created and removes it exactly once:
//! through [`Subscription::release`] or when the handle is dropped,
//! whichever happens first.

use alloy::primitives::Address;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::events::LogRecord;
use crate::rendezvous::hub::HubShared;

/// Which records a subscription wants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventFilter {
    /// Event name; `None` matches every event.
    pub event: Option<String>,
    /// Emitting contract; `None` matches every emitter.
    pub address: Option<Address>,
}

impl EventFilter {
    /// Match every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn event(name: impl Into<String>) -> Self {
        Self {
            event: Some(name.into()),
            address: None,
        }
    }

    pub fn from_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        self.event.as_deref().map_or(true, |name| name == record.event)
            && self.address.map_or(true, |address| address == record.address)
    }
}

/// A record together with its hub sequence number.
#[derive(Debug, Clone)]
pub struct Observed {
    pub seq: u64,
    pub record: LogRecord,
}

/// Live subscription to the hub.
pub struct Subscription {
    id: u64,
    filter: EventFilter,
    established_at: u64,
    receiver: mpsc::UnboundedReceiver<Observed>,
    hub: Arc<HubShared>,
    released: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        filter: EventFilter,
        established_at: u64,
        receiver: mpsc::UnboundedReceiver<Observed>,
        hub: Arc<HubShared>,
    ) -> Self {
        Self {
            id,
            filter,
            established_at,
            receiver,
            hub,
            released: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Hub sequence number at registration; only later records are delivered.
    pub fn established_at(&self) -> u64 {
        self.established_at
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Receive the next matching record.
    ///
    /// Returns `None` once the subscription is released or the hub closed.
    pub async fn recv(&mut self) -> Option<Observed> {
        if self.released {
            return None;
        }
        loop {
            let observed = self.receiver.recv().await?;
            if observed.seq > self.established_at {
                return Some(observed);
            }
        }
    }

    /// Receive without waiting. `Ok(None)` when nothing is buffered.
    pub fn try_recv(&mut self) -> Result<Option<Observed>, TryRecvError> {
        if self.released {
            return Err(TryRecvError::Disconnected);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(observed) if observed.seq > self.established_at => return Ok(Some(observed)),
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    /// Unregister from the hub. Returns `true` only for the call that
    /// actually released; later calls and the eventual drop are no-ops.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.receiver.close();
        self.hub.remove_listener(self.id);
        tracing::debug!(subscription = self.id, "Subscription released");
        true
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("established_at", &self.established_at)
            .field("released", &self.released)
            .finish()
    }
}
