//! Transaction submission and confirmation.
//!
//! # Data Flow
//! ```text
//! ContractCall (target, calldata, value)
//!     → submitter.rs (nonce, gas policy, broadcast) → PendingTransaction
//!     → confirmation.rs (poll receipt + head until C inclusions)
//!     → ConfirmedTransaction (decoded log records)
//! ```

pub mod confirmation;
pub mod submitter;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::SolCall;
use serde::Serialize;
use std::time::SystemTime;

pub use confirmation::{ConfirmationPolicy, ConfirmationWaiter, ConfirmedTransaction};
pub use submitter::Submitter;

/// A state-changing call to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl ContractCall {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: data.into(),
        }
    }

    /// ABI-encode a typed call generated by `sol!`.
    pub fn encode<C: SolCall>(to: Address, call: &C) -> Self {
        Self::new(to, call.abi_encode())
    }

    /// Attach native value (payable functions such as `enterRaffle`).
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// A transaction the node accepted but that is not yet confirmed.
#[derive(Debug, Clone, Serialize)]
pub struct PendingTransaction {
    pub hash: TxHash,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub nonce: u64,
    pub submitted_at: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol;

    sol! {
        function approve(address spender, uint256 amount) external returns (bool);
    }

    #[test]
    fn test_encode_typed_call() {
        let spender = Address::repeat_byte(0x42);
        let call = ContractCall::encode(
            Address::repeat_byte(0x01),
            &approveCall {
                spender,
                amount: U256::from(1000),
            },
        );
        assert_eq!(&call.data[..4], &approveCall::SELECTOR);
        assert_eq!(call.data.len(), 4 + 32 * 2);
        assert_eq!(call.value, U256::ZERO);

        let payable = call.with_value(U256::from(7));
        assert_eq!(payable.value, U256::from(7));
    }
}
