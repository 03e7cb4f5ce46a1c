//! Chain-facing value types.

use alloy::primitives::{Address, TxHash, B256};
use alloy::rpc::types::Log;

/// The parts of a transaction receipt the confirmation waiter needs.
#[derive(Debug, Clone)]
pub struct ReceiptView {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    pub block_hash: Option<B256>,
    /// `false` when execution reverted.
    pub success: bool,
    pub gas_used: u64,
    /// Raw logs in emission order.
    pub logs: Vec<Log>,
}

/// Inclusive block range query for contract logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// Emitting contracts; empty means any.
    pub addresses: Vec<Address>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogQuery {
    pub fn new(addresses: Vec<Address>, from_block: u64, to_block: u64) -> Self {
        Self {
            addresses,
            from_block,
            to_block,
        }
    }

    /// Whether a log emitted by `address` at `block` falls inside the query.
    pub fn contains(&self, address: Address, block: u64) -> bool {
        (self.addresses.is_empty() || self.addresses.contains(&address))
            && block >= self.from_block
            && block <= self.to_block
    }
}
