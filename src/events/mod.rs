//! Log decoding and event correlation.
//!
//! # Data Flow
//! ```text
//! raw logs (receipt or eth_getLogs)
//!     → registry.rs (ABI decode, named fields)
//!     → record.rs (LogRecord, CorrelationToken)
//!     → correlator.rs (find event by name, extract token)
//! ```

pub mod correlator;
pub mod record;
pub mod registry;

pub use correlator::{find_event, find_event_from, CorrelationSpec};
pub use record::{CorrelationToken, LogRecord};
pub use registry::EventRegistry;
