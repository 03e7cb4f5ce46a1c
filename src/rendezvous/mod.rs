//! Asynchronous rendezvous with later events.
//!
//! # Data Flow
//! ```text
//! feed.rs (poll eth_getLogs, decode)
//!     → hub.rs (sequence numbers, fan-out)
//!         → subscription.rs (owned listener handles)
//!             → wait.rs (await event with deadline / cancel)
//!         → correlation.rs (token → waiting ticket)
//! ```
//!
//! # Design Decisions
//! - A listener or ticket registered at sequence `n` only sees records `> n`
//! - Every handle releases its registration exactly once, on drop at the latest
//! - No lock is held across an `.await`

pub mod correlation;
pub mod feed;
pub mod hub;
pub mod subscription;
pub mod wait;

pub use correlation::{CorrelationTable, Ticket};
pub use feed::LogFeed;
pub use hub::{EventHub, HubSnapshot};
pub use subscription::{EventFilter, Observed, Subscription};
pub use wait::{any_record, await_event, await_event_until, token_matches};
