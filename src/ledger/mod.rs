//! Ledger access subsystem.
//!
//! # Data Flow
//! ```text
//! Environment Variables (private key)
//!     → wallet.rs (key loading, nonce tracking)
//!     → client.rs (alloy providers with timeouts and failover)
//!     → Ledger trait (the only surface the rest of the crate sees)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod types;
pub mod wallet;

use alloy::primitives::{Address, Bytes, TxHash};
use alloy::rpc::types::{Log, TransactionRequest};
use async_trait::async_trait;

use crate::error::RendezvousResult;

pub use client::LedgerClient;
pub use types::{LogQuery, ReceiptView};
pub use wallet::{Wallet, PRIVATE_KEY_ENV_VAR};

/// The ledger operations an interaction depends on.
///
/// Implemented by [`LedgerClient`] for real nodes; tests provide scripted
/// in-memory implementations.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn chain_id(&self) -> RendezvousResult<u64>;

    async fn block_number(&self) -> RendezvousResult<u64>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> RendezvousResult<u128>;

    /// Next nonce for `address` as seen by the node.
    async fn transaction_count(&self, address: Address) -> RendezvousResult<u64>;

    async fn estimate_gas(&self, tx: TransactionRequest) -> RendezvousResult<u64>;

    /// Broadcast a transaction; returns its hash once the node accepted it.
    async fn send_transaction(&self, tx: TransactionRequest) -> RendezvousResult<TxHash>;

    /// Receipt of an included transaction, `None` while pending.
    async fn transaction_receipt(&self, hash: TxHash) -> RendezvousResult<Option<ReceiptView>>;

    /// Whether the node still knows the transaction (mempool or chain).
    async fn is_transaction_known(&self, hash: TxHash) -> RendezvousResult<bool>;

    /// Replay a failed transaction at its inclusion block to recover the revert reason.
    async fn revert_reason(&self, hash: TxHash, block_number: u64) -> RendezvousResult<Option<String>>;

    /// Logs emitted in an inclusive block range, in chain order.
    async fn logs(&self, query: &LogQuery) -> RendezvousResult<Vec<Log>>;

    /// Read-only call against the latest state.
    async fn call(&self, tx: TransactionRequest) -> RendezvousResult<Bytes>;
}
