//! Ready-made flows against scripted contracts.

mod common;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{keccak256, Address, I256, U256};
use std::str::FromStr;

use common::*;
use tx_rendezvous::config::LendingConfig;
use tx_rendezvous::flows::lending::LendingFlow;
use tx_rendezvous::flows::randomness;
use tx_rendezvous::RendezvousError;

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature);
    [hash[0], hash[1], hash[2], hash[3]]
}

fn ether(milli: u64) -> U256 {
    U256::from(milli) * U256::from(10u64.pow(15))
}

fn pool() -> Address {
    Address::repeat_byte(0x90)
}

fn script_lending(ledger: &ScriptedLedger, config: &LendingConfig, dai_price: I256) {
    let provider = Address::from_str(&config.addresses_provider).unwrap();
    let feed = Address::from_str(&config.dai_eth_price_feed).unwrap();

    ledger.respond(
        provider,
        selector("getLendingPool()"),
        DynSolValue::Address(pool()).abi_encode(),
    );
    ledger.respond(
        pool(),
        selector("getUserAccountData(address)"),
        DynSolValue::Tuple(vec![
            DynSolValue::Uint(ether(20), 256),
            DynSolValue::Uint(U256::ZERO, 256),
            DynSolValue::Uint(ether(10), 256),
            DynSolValue::Uint(U256::from(8250), 256),
            DynSolValue::Uint(U256::from(7500), 256),
            DynSolValue::Uint(U256::MAX, 256),
        ])
        .abi_encode_params(),
    );
    ledger.respond(
        feed,
        selector("latestRoundData()"),
        DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(1), 80),
            DynSolValue::Int(dai_price, 256),
            DynSolValue::Uint(U256::from(1_700_000_000u64), 256),
            DynSolValue::Uint(U256::from(1_700_000_000u64), 256),
            DynSolValue::Uint(U256::from(1), 80),
        ])
        .abi_encode_params(),
    );
}

#[tokio::test(start_paused = true)]
async fn test_lending_sequence() {
    let ledger = ScriptedLedger::new();
    let config = LendingConfig::default();
    // 1 DAI = 0.0005 ETH
    script_lending(&ledger, &config, I256::from_raw(U256::from(500_000_000_000_000u64)));

    let flow = LendingFlow::new(submitter(&ledger), waiter(&ledger, fast_policy()), &config).unwrap();
    let report = flow.run().await.unwrap();

    let names: Vec<&str> = report.steps.iter().map(|step| step.name).collect();
    assert_eq!(names, ["wrap", "approve-weth", "deposit", "borrow", "approve-dai", "repay"]);
    assert_eq!(report.lending_pool, pool());
    assert_eq!(report.deposited, ether(20));
    // 95% of 0.01 ETH at 0.0005 ETH per DAI
    assert_eq!(report.borrowed, U256::from(19) * U256::from(10u64.pow(18)));

    let sent = ledger.sent();
    assert_eq!(sent.len(), 6);
    let weth = Address::from_str(&config.weth).unwrap();
    assert_eq!(sent[0].to.and_then(|kind| kind.to().copied()), Some(weth));
    assert_eq!(sent[0].value, Some(ether(20)));
    assert_eq!(sent[2].to.and_then(|kind| kind.to().copied()), Some(pool()));
    let nonces: Vec<u64> = sent.iter().map(|tx| tx.nonce.unwrap()).collect();
    assert_eq!(nonces, [0, 1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn test_lending_stops_on_bad_price() {
    let ledger = ScriptedLedger::new();
    let config = LendingConfig::default();
    script_lending(&ledger, &config, I256::ZERO);

    let flow = LendingFlow::new(submitter(&ledger), waiter(&ledger, fast_policy()), &config).unwrap();
    let err = flow.run().await.unwrap_err();
    assert!(matches!(err, RendezvousError::Abi(ref m) if m.contains("not positive")));
    // wrap, approve and deposit went through; nothing was borrowed
    assert_eq!(ledger.sent().len(), 3);
}

#[tokio::test]
async fn test_lending_rejects_bad_amount() {
    let ledger = ScriptedLedger::new();
    let config = LendingConfig {
        amount_wei: "lots".into(),
        ..Default::default()
    };
    let err = LendingFlow::new(submitter(&ledger), waiter(&ledger, fast_policy()), &config).unwrap_err();
    assert!(matches!(err, RendezvousError::Config(_)));
}

#[tokio::test]
async fn test_raffle_reads() {
    let ledger = ScriptedLedger::new();
    ledger.respond(
        raffle(),
        selector("getEntranceFee()"),
        DynSolValue::Uint(ether(10), 256).abi_encode(),
    );
    ledger.respond(
        raffle(),
        selector("getRecentWinner()"),
        DynSolValue::Address(Address::repeat_byte(0x42)).abi_encode(),
    );

    let fee = randomness::entrance_fee(&*ledger, raffle()).await.unwrap();
    assert_eq!(fee, ether(10));
    let winner = randomness::recent_winner(&*ledger, raffle()).await.unwrap();
    assert_eq!(winner, Address::repeat_byte(0x42));

    // Unscripted reads revert
    assert!(randomness::mint_fee(&*ledger, raffle()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_enter_raffle_pays_fee() {
    let ledger = ScriptedLedger::new();
    ledger.script(
        raffle(),
        TxScript::emits(vec![event_log(
            raffle(),
            randomness::RAFFLE_ENTER,
            vec![DynSolValue::Address(test_wallet().address())],
        )]),
    );

    let confirmed = tx_rendezvous::flows::transact(
        &submitter(&ledger),
        &waiter(&ledger, fast_policy()),
        randomness::enter_raffle(raffle(), ether(10)),
    )
    .await
    .unwrap();

    let entered = confirmed.find_event("RaffleEnter").unwrap();
    assert_eq!(entered.field("player").unwrap(), &DynSolValue::Address(test_wallet().address()));
    assert_eq!(ledger.sent()[0].value, Some(ether(10)));
}
