//! Multi-step interactions.
//!
//! # Data Flow
//! ```text
//! RoundSpec
//!     → round.rs (arm ticket → submit → confirm → correlate → await fulfillment)
//!     → registry.rs (state of every in-flight round, read by admin + CLI)
//! ```

pub mod registry;
pub mod round;

pub use registry::{InteractionRegistry, InteractionStatus};
pub use round::{RequestContext, RoundOutcome, RoundRunner, RoundSpec, RoundState};
