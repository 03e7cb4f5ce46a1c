//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Poll against the ledger:
//!     → Ledger call (per-call timeout, provider failover)
//!     → On transient failure: backoff.rs (jittered exponential delay)
//!     → Retry until the stage deadline
//! ```
//!
//! # Design Decisions
//! - Only transport errors are retried; submission and revert errors are final
//! - Backoff never sleeps past the caller's deadline

pub mod backoff;

pub use backoff::{calculate_backoff, RetryBackoff};
