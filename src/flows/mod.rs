//! Ready-made multi-step interactions.
//!
//! - randomness.rs: VRF request/fulfillment rounds (raffle draw, random NFT mint)
//! - lending.rs: wrap → approve → deposit → borrow → approve → repay against an Aave-style pool

pub mod lending;
pub mod randomness;

use alloy::primitives::Address;
use alloy::sol_types::SolCall;

use crate::error::RendezvousResult;
use crate::ledger::client::read_request;
use crate::ledger::Ledger;
use crate::tx::{ConfirmationWaiter, ConfirmedTransaction, ContractCall, Submitter};

/// Read-only typed call against the latest state.
pub async fn read<C: SolCall>(ledger: &dyn Ledger, to: Address, call: C) -> RendezvousResult<C::Return> {
    let output = ledger.call(read_request(to, call.abi_encode().into())).await?;
    Ok(C::abi_decode_returns(&output)?)
}

/// Submit a call and wait for the waiter's default confirmation count.
pub async fn transact(
    submitter: &Submitter,
    waiter: &ConfirmationWaiter,
    call: ContractCall,
) -> RendezvousResult<ConfirmedTransaction> {
    let pending = submitter.submit(call).await?;
    waiter.wait(pending.hash).await
}
