//! Error taxonomy shared by every stage of an interaction.

use alloy::primitives::TxHash;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving an on-chain interaction.
#[derive(Debug, Error)]
pub enum RendezvousError {
    /// The call could not be submitted (malformed call, insufficient funds).
    /// Never retried.
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    /// The transaction was replaced or evicted before inclusion.
    #[error("Transaction {0} dropped before inclusion")]
    TransactionDropped(TxHash),

    /// A confirmation or fulfillment wait exceeded its deadline.
    #[error("Timed out after {elapsed:?} waiting for {stage}")]
    Timeout { stage: &'static str, elapsed: Duration },

    /// Execution failed on-chain; the reason is reported verbatim.
    #[error("Transaction {hash} reverted: {reason}")]
    Reverted { hash: TxHash, reason: String },

    /// No log record carried the requested event.
    #[error("Event '{0}' not found in transaction logs")]
    EventNotFound(String),

    /// The event was found but lacks the requested field.
    #[error("Event '{event}' has no field '{field}'")]
    MissingField { event: String, field: String },

    /// The caller abandoned the wait.
    #[error("Wait cancelled")]
    Cancelled,

    /// The event source shut down while a wait was in flight.
    #[error("Event subscription closed")]
    SubscriptionClosed,

    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Connected chain does not match configuration.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Invalid private key or signing failure.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Gas price exceeded the configured ceiling.
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// ABI parsing, encoding or decoding failed.
    #[error("ABI error: {0}")]
    Abi(String),

    /// Invalid runtime parameters.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RendezvousError {
    /// Whether the error comes from the transport and may succeed on a later poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, RendezvousError::Rpc(_))
    }
}

impl From<alloy::sol_types::Error> for RendezvousError {
    fn from(e: alloy::sol_types::Error) -> Self {
        RendezvousError::Abi(e.to_string())
    }
}

impl From<serde_json::Error> for RendezvousError {
    fn from(e: serde_json::Error) -> Self {
        RendezvousError::Abi(e.to_string())
    }
}

/// Result type for interaction operations.
pub type RendezvousResult<T> = Result<T, RendezvousError>;
