//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (compact or pretty)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Hashes, block numbers and tokens are recorded as fields, not interpolated
//! - Metrics are cheap and safe to record before an exporter is installed

pub mod logging;
pub mod metrics;
