//! Verifiable-randomness rounds.
//!
//! A consumer contract asks the VRF coordinator for random words; the
//! request transaction carries a `requestId`, and the coordinator later
//! answers in a separate transaction emitting `RandomWordsFulfilled` with
//! the same id. On development networks the coordinator is a mock and the
//! answer has to be triggered by hand, which [`MockFulfiller`] does.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use std::sync::Arc;

use crate::error::{RendezvousError, RendezvousResult};
use crate::events::{CorrelationSpec, EventRegistry, LogRecord};
use crate::flows::{read, transact};
use crate::interaction::{RequestContext, RoundSpec};
use crate::ledger::Ledger;
use crate::tx::{ConfirmationWaiter, ConfirmedTransaction, ContractCall, Submitter};

sol! {
    interface IRaffle {
        function enterRaffle() external payable;
        function performUpkeep(bytes calldata performData) external;
        function checkUpkeep(bytes calldata checkData) external view returns (bool upkeepNeeded, bytes memory performData);
        function getEntranceFee() external view returns (uint256);
        function getRecentWinner() external view returns (address);
        function getNumberOfPlayers() external view returns (uint256);
    }

    interface IRandomIpfsNft {
        function requestNft() external payable returns (uint256 requestId);
        function getMintFee() external view returns (uint256);
        function getTokenCounter() external view returns (uint256);
    }

    interface IVRFCoordinatorV2Mock {
        function fulfillRandomWords(uint256 requestId, address consumer) external;
    }
}

pub const RAFFLE_ENTER: &str = "event RaffleEnter(address indexed player)";
pub const REQUESTED_RAFFLE_WINNER: &str = "event RequestedRaffleWinner(uint256 indexed requestId)";
pub const WINNER_PICKED: &str = "event WinnerPicked(address indexed player)";
pub const NFT_REQUESTED: &str = "event NftRequested(uint256 indexed requestId, address requester)";
pub const NFT_MINTED: &str = "event NftMinted(uint8 breed, address minter)";
pub const RANDOM_WORDS_REQUESTED: &str = "event RandomWordsRequested(bytes32 indexed keyHash, uint256 requestId, uint256 preSeed, uint64 indexed subId, uint16 minimumRequestConfirmations, uint32 callbackGasLimit, uint32 numWords, address indexed sender)";
pub const RANDOM_WORDS_FULFILLED: &str = "event RandomWordsFulfilled(uint256 indexed requestId, uint256 outputSeed, uint96 payment, bool success)";

/// Register every event the randomness flows decode.
pub fn register_events(registry: &mut EventRegistry) -> RendezvousResult<()> {
    for signature in [
        RAFFLE_ENTER,
        REQUESTED_RAFFLE_WINNER,
        WINNER_PICKED,
        NFT_REQUESTED,
        NFT_MINTED,
        RANDOM_WORDS_REQUESTED,
        RANDOM_WORDS_FULFILLED,
    ] {
        registry.register_signature(signature)?;
    }
    Ok(())
}

/// The coordinator's answer to `requestId`.
pub fn fulfillment_spec(coordinator: Address) -> CorrelationSpec {
    CorrelationSpec::new("RandomWordsFulfilled", "requestId").from_emitter(coordinator)
}

/// Raffle draw: `performUpkeep` requests a winner, the coordinator picks one.
pub fn raffle_draw(raffle: Address, coordinator: Address) -> RoundSpec {
    let call = ContractCall::encode(
        raffle,
        &IRaffle::performUpkeepCall {
            performData: Bytes::new(),
        },
    );
    RoundSpec::new(
        "raffle-draw",
        call,
        CorrelationSpec::new("RequestedRaffleWinner", "requestId").from_emitter(raffle),
        fulfillment_spec(coordinator),
    )
}

/// Random NFT mint: `requestNft` pays the fee, the coordinator's answer mints.
pub fn nft_mint(nft: Address, coordinator: Address, mint_fee: U256) -> RoundSpec {
    let call = ContractCall::encode(nft, &IRandomIpfsNft::requestNftCall {}).with_value(mint_fee);
    RoundSpec::new(
        "nft-mint",
        call,
        CorrelationSpec::new("NftRequested", "requestId").from_emitter(nft),
        fulfillment_spec(coordinator),
    )
}

pub fn enter_raffle(raffle: Address, entrance_fee: U256) -> ContractCall {
    ContractCall::encode(raffle, &IRaffle::enterRaffleCall {}).with_value(entrance_fee)
}

pub async fn entrance_fee(ledger: &dyn Ledger, raffle: Address) -> RendezvousResult<U256> {
    read(ledger, raffle, IRaffle::getEntranceFeeCall {}).await
}

pub async fn recent_winner(ledger: &dyn Ledger, raffle: Address) -> RendezvousResult<Address> {
    read(ledger, raffle, IRaffle::getRecentWinnerCall {}).await
}

pub async fn mint_fee(ledger: &dyn Ledger, nft: Address) -> RendezvousResult<U256> {
    read(ledger, nft, IRandomIpfsNft::getMintFeeCall {}).await
}

/// Consumer-side events emitted in the fulfillment transaction
/// (`WinnerPicked`, `NftMinted`), fetched by confirming that transaction.
pub async fn fulfillment_records(
    waiter: &ConfirmationWaiter,
    fulfillment: &LogRecord,
) -> RendezvousResult<ConfirmedTransaction> {
    let hash = fulfillment.transaction_hash.ok_or_else(|| {
        RendezvousError::EventNotFound(format!("{} without a transaction hash", fulfillment.event))
    })?;
    waiter.wait(hash).await
}

/// Plays the off-chain VRF node on development networks by calling the
/// mock coordinator's `fulfillRandomWords`.
#[derive(Debug, Clone)]
pub struct MockFulfiller {
    submitter: Submitter,
    waiter: ConfirmationWaiter,
    coordinator: Address,
    consumer: Address,
}

impl MockFulfiller {
    pub fn new(submitter: Submitter, waiter: ConfirmationWaiter, coordinator: Address, consumer: Address) -> Self {
        Self {
            submitter,
            waiter,
            coordinator,
            consumer,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        self.submitter.ledger()
    }

    /// Answer the request identified by the round's token.
    pub async fn fulfill(&self, request: RequestContext) -> RendezvousResult<()> {
        let request_id = request.token.as_u256().ok_or_else(|| {
            RendezvousError::Abi(format!("request id {} is not a uint256", request.token))
        })?;
        tracing::info!(
            interaction = %request.interaction,
            request_id = %request_id,
            coordinator = %self.coordinator,
            "Fulfilling randomness request through the mock coordinator"
        );

        let call = ContractCall::encode(
            self.coordinator,
            &IVRFCoordinatorV2Mock::fulfillRandomWordsCall {
                requestId: request_id,
                consumer: self.consumer,
            },
        );
        transact(&self.submitter, &self.waiter, call).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn test_register_events() {
        let mut registry = EventRegistry::new();
        register_events(&mut registry).unwrap();
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn test_round_specs() {
        let raffle = Address::repeat_byte(0x0a);
        let coordinator = Address::repeat_byte(0x0c);

        let draw = raffle_draw(raffle, coordinator);
        assert_eq!(draw.call.to, raffle);
        assert_eq!(&draw.call.data[..4], &IRaffle::performUpkeepCall::SELECTOR);
        assert_eq!(draw.request.emitter, Some(raffle));
        assert_eq!(draw.fulfillment.emitter, Some(coordinator));

        let mint = nft_mint(raffle, coordinator, U256::from(10u64.pow(16)));
        assert_eq!(mint.call.value, U256::from(10u64.pow(16)));
        assert_eq!(mint.request.event, "NftRequested");
    }

    #[test]
    fn test_enter_raffle_is_payable() {
        let call = enter_raffle(Address::ZERO, U256::from(1));
        assert_eq!(call.value, U256::from(1));
        assert_eq!(&call.data[..], &IRaffle::enterRaffleCall::SELECTOR[..]);
    }
}
