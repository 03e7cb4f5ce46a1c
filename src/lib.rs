//! Ledger interaction runner.
//!
//! Drives multi-step interactions with an Ethereum-compatible ledger:
//! submit a call, wait until it is buried at the requested depth, pull the
//! correlation token out of its logs by event name, then wait for the later
//! event an off-chain actor emits in answer.
//!
//! ```text
//!  ContractCall ──▶ tx::Submitter ──▶ tx::ConfirmationWaiter ──▶ events::CorrelationSpec
//!                                                                      │ token
//!  ledger ──▶ rendezvous::LogFeed ──▶ rendezvous::EventHub ──▶ Ticket::wait_for
//!                                                                      │
//!                                   interaction::RoundRunner ◀─────────┘
//! ```

// Core subsystems
pub mod error;
pub mod events;
pub mod ledger;
pub mod rendezvous;
pub mod tx;

// Interactions
pub mod flows;
pub mod interaction;

// Cross-cutting concerns
pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::RendezvousConfig;
pub use error::{RendezvousError, RendezvousResult};
pub use events::{CorrelationSpec, CorrelationToken, EventRegistry, LogRecord};
pub use interaction::{RoundRunner, RoundSpec, RoundState};
pub use ledger::Ledger;
pub use lifecycle::{Runtime, Shutdown};
pub use rendezvous::{EventFilter, EventHub, Subscription, Ticket};
pub use tx::{ConfirmationWaiter, ContractCall, PendingTransaction, Submitter};
