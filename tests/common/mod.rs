//! Shared utilities for integration tests: a scripted in-memory chain.
#![allow(dead_code)]

use alloy::dyn_abi::DynSolValue;
use alloy::json_abi::Event;
use alloy::primitives::{keccak256, Address, Bytes, TxHash, B256, U256};
use alloy::rpc::types::{Log, TransactionRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tx_rendezvous::config::LedgerConfig;
use tx_rendezvous::flows::randomness;
use tx_rendezvous::ledger::{LogQuery, ReceiptView, Wallet};
use tx_rendezvous::tx::ConfirmationPolicy;
use tx_rendezvous::{
    ConfirmationWaiter, EventRegistry, Ledger, RendezvousError, RendezvousResult, Submitter,
};

// Hardhat / Anvil account #0
pub const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const CHAIN_ID: u64 = 31337;
pub const GENESIS_HEAD: u64 = 100;

pub const TRANSFER: &str = "event Transfer(address indexed from, address indexed to, uint256 value)";

pub fn raffle() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn coordinator() -> Address {
    Address::repeat_byte(0xcc)
}

pub fn token_contract() -> Address {
    Address::repeat_byte(0x70)
}

pub fn test_wallet() -> Wallet {
    Wallet::from_private_key(TEST_PRIVATE_KEY, CHAIN_ID).unwrap()
}

/// Registry knowing the randomness events and an ERC-20 `Transfer`.
pub fn test_registry() -> Arc<EventRegistry> {
    let mut registry = EventRegistry::new();
    randomness::register_events(&mut registry).unwrap();
    registry.register_signature(TRANSFER).unwrap();
    Arc::new(registry)
}

pub fn fast_policy() -> ConfirmationPolicy {
    ConfirmationPolicy {
        required: 1,
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        drop_grace_polls: 3,
    }
}

pub fn submitter(ledger: &Arc<ScriptedLedger>) -> Submitter {
    Submitter::new(ledger.clone(), test_wallet(), &LedgerConfig::default())
}

pub fn waiter(ledger: &Arc<ScriptedLedger>, policy: ConfirmationPolicy) -> ConfirmationWaiter {
    ConfirmationWaiter::new(ledger.clone(), test_registry(), policy)
}

/// Encode an event emission; `values` follow the signature's parameter order.
pub fn event_log(address: Address, signature: &str, values: Vec<DynSolValue>) -> alloy::primitives::Log {
    let event = Event::parse(signature).unwrap();
    let mut topics = vec![event.selector()];
    let mut body = Vec::new();
    for (param, value) in event.inputs.iter().zip(values) {
        if param.indexed {
            topics.push(value.as_word().unwrap());
        } else {
            body.push(value);
        }
    }
    let data = DynSolValue::Tuple(body).abi_encode_params();
    alloy::primitives::Log::new_unchecked(address, topics, Bytes::from(data))
}

pub fn uint(value: u64) -> DynSolValue {
    DynSolValue::Uint(U256::from(value), 256)
}

pub fn transfer_log(from: Address, to: Address, value: u64) -> alloy::primitives::Log {
    event_log(
        token_contract(),
        TRANSFER,
        vec![DynSolValue::Address(from), DynSolValue::Address(to), uint(value)],
    )
}

pub fn requested_raffle_winner(request_id: u64) -> alloy::primitives::Log {
    event_log(raffle(), randomness::REQUESTED_RAFFLE_WINNER, vec![uint(request_id)])
}

pub fn random_words_requested(request_id: u64) -> alloy::primitives::Log {
    event_log(
        coordinator(),
        randomness::RANDOM_WORDS_REQUESTED,
        vec![
            DynSolValue::FixedBytes(B256::repeat_byte(0x01), 32),
            uint(request_id),
            uint(7),
            DynSolValue::Uint(U256::from(1), 64),
            DynSolValue::Uint(U256::from(3), 16),
            DynSolValue::Uint(U256::from(500_000), 32),
            DynSolValue::Uint(U256::from(1), 32),
            DynSolValue::Address(raffle()),
        ],
    )
}

pub fn random_words_fulfilled(request_id: u64) -> alloy::primitives::Log {
    event_log(
        coordinator(),
        randomness::RANDOM_WORDS_FULFILLED,
        vec![
            uint(request_id),
            uint(42),
            DynSolValue::Uint(U256::from(1000), 96),
            DynSolValue::Bool(true),
        ],
    )
}

pub fn winner_picked(player: Address) -> alloy::primitives::Log {
    event_log(raffle(), randomness::WINNER_PICKED, vec![DynSolValue::Address(player)])
}

/// What happens when a transaction sent to a given address executes.
#[derive(Debug, Clone, Default)]
pub struct TxScript {
    pub logs: Vec<alloy::primitives::Log>,
    pub reverted: bool,
    pub revert_reason: Option<String>,
}

impl TxScript {
    pub fn emits(logs: Vec<alloy::primitives::Log>) -> Self {
        Self {
            logs,
            ..Default::default()
        }
    }

    pub fn reverts(reason: Option<&str>) -> Self {
        Self {
            logs: Vec::new(),
            reverted: true,
            revert_reason: reason.map(str::to_string),
        }
    }
}

#[derive(Debug)]
struct TxEntry {
    request: TransactionRequest,
    script: TxScript,
    block: Option<u64>,
    known: bool,
}

#[derive(Debug)]
struct ChainState {
    head: u64,
    automine: bool,
    failing: bool,
    gas_price: u128,
    send_error: Option<String>,
    estimate_error: Option<String>,
    next_tx: u64,
    txs: HashMap<TxHash, TxEntry>,
    /// Send order, used for inclusion order.
    order: Vec<TxHash>,
    blocks: BTreeMap<u64, Vec<TxHash>>,
    scripts: HashMap<Address, VecDeque<TxScript>>,
    calls: HashMap<(Address, [u8; 4]), Bytes>,
}

/// In-memory chain driven by the test: blocks are mined on demand (or on
/// every send with automine) and each sent transaction executes a script.
#[derive(Debug)]
pub struct ScriptedLedger {
    state: Mutex<ChainState>,
}

impl ScriptedLedger {
    /// Chain mining one block per transaction, like a Hardhat node.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ChainState {
                head: GENESIS_HEAD,
                automine: true,
                failing: false,
                gas_price: 1_000_000_000,
                send_error: None,
                estimate_error: None,
                next_tx: 0,
                txs: HashMap::new(),
                order: Vec::new(),
                blocks: BTreeMap::new(),
                scripts: HashMap::new(),
                calls: HashMap::new(),
            }),
        })
    }

    /// Chain where transactions stay pending until [`ScriptedLedger::mine`].
    pub fn manual() -> Arc<Self> {
        let ledger = Self::new();
        ledger.set_automine(false);
        ledger
    }

    pub fn set_automine(&self, automine: bool) {
        self.state.lock().automine = automine;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn set_gas_price(&self, wei: u128) {
        self.state.lock().gas_price = wei;
    }

    pub fn set_send_error(&self, error: Option<&str>) {
        self.state.lock().send_error = error.map(str::to_string);
    }

    pub fn set_estimate_error(&self, error: Option<&str>) {
        self.state.lock().estimate_error = error.map(str::to_string);
    }

    /// Queue the execution of the next transaction sent to `to`.
    pub fn script(&self, to: Address, script: TxScript) {
        self.state.lock().scripts.entry(to).or_default().push_back(script);
    }

    /// Answer read calls to `to` with `selector` by `output`.
    pub fn respond(&self, to: Address, selector: [u8; 4], output: impl Into<Bytes>) {
        self.state.lock().calls.insert((to, selector), output.into());
    }

    pub fn head(&self) -> u64 {
        self.state.lock().head
    }

    /// Mine `blocks` blocks; pending transactions land in the first one.
    pub fn mine(&self, blocks: u64) {
        let mut state = self.state.lock();
        for _ in 0..blocks {
            Self::mine_block(&mut state);
        }
    }

    /// Evict a pending transaction from the mempool.
    pub fn drop_pending(&self, hash: TxHash) {
        let mut state = self.state.lock();
        if let Some(entry) = state.txs.get_mut(&hash) {
            entry.known = false;
            entry.block = None;
        }
    }

    /// Reorganize `hash` out of its block; it goes back to the mempool.
    pub fn reorg_out(&self, hash: TxHash) {
        let mut state = self.state.lock();
        let Some(block) = state.txs.get_mut(&hash).and_then(|entry| entry.block.take()) else {
            return;
        };
        if let Some(hashes) = state.blocks.get_mut(&block) {
            hashes.retain(|h| *h != hash);
        }
    }

    /// Requests sent so far, in order.
    pub fn sent(&self) -> Vec<TransactionRequest> {
        let state = self.state.lock();
        state.order.iter().map(|h| state.txs[h].request.clone()).collect()
    }

    pub fn sent_hashes(&self) -> Vec<TxHash> {
        self.state.lock().order.clone()
    }

    pub fn block_of(&self, hash: TxHash) -> Option<u64> {
        self.state.lock().txs.get(&hash).and_then(|entry| entry.block)
    }

    fn mine_block(state: &mut ChainState) {
        state.head += 1;
        let head = state.head;
        let pending: Vec<TxHash> = state
            .order
            .iter()
            .filter(|h| {
                let entry = &state.txs[*h];
                entry.known && entry.block.is_none()
            })
            .copied()
            .collect();
        for hash in &pending {
            if let Some(entry) = state.txs.get_mut(hash) {
                entry.block = Some(head);
            }
        }
        state.blocks.insert(head, pending);
    }

    fn check(state: &ChainState) -> RendezvousResult<()> {
        if state.failing {
            return Err(RendezvousError::Rpc("connection refused".into()));
        }
        Ok(())
    }

    /// Logs of a mined block in emission order, with positions filled in.
    fn block_logs(state: &ChainState, block: u64) -> Vec<(TxHash, Log)> {
        let mut out = Vec::new();
        let Some(hashes) = state.blocks.get(&block) else {
            return out;
        };
        let mut log_index = 0u64;
        for (tx_index, hash) in hashes.iter().enumerate() {
            let entry = &state.txs[hash];
            if entry.script.reverted {
                continue;
            }
            for inner in &entry.script.logs {
                out.push((
                    *hash,
                    Log {
                        inner: inner.clone(),
                        block_hash: Some(block_hash(block)),
                        block_number: Some(block),
                        transaction_hash: Some(*hash),
                        transaction_index: Some(tx_index as u64),
                        log_index: Some(log_index),
                        ..Default::default()
                    },
                ));
                log_index += 1;
            }
        }
        out
    }
}

fn block_hash(block: u64) -> B256 {
    keccak256(block.to_be_bytes())
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn chain_id(&self) -> RendezvousResult<u64> {
        Self::check(&self.state.lock())?;
        Ok(CHAIN_ID)
    }

    async fn block_number(&self) -> RendezvousResult<u64> {
        let state = self.state.lock();
        Self::check(&state)?;
        Ok(state.head)
    }

    async fn gas_price(&self) -> RendezvousResult<u128> {
        let state = self.state.lock();
        Self::check(&state)?;
        Ok(state.gas_price)
    }

    async fn transaction_count(&self, address: Address) -> RendezvousResult<u64> {
        let state = self.state.lock();
        Self::check(&state)?;
        Ok(state
            .txs
            .values()
            .filter(|entry| entry.known && entry.request.from == Some(address))
            .count() as u64)
    }

    async fn estimate_gas(&self, _tx: TransactionRequest) -> RendezvousResult<u64> {
        let state = self.state.lock();
        Self::check(&state)?;
        match &state.estimate_error {
            Some(error) => Err(RendezvousError::SubmissionFailed(format!("gas estimation failed: {}", error))),
            None => Ok(50_000),
        }
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> RendezvousResult<TxHash> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        if let Some(error) = &state.send_error {
            return Err(RendezvousError::SubmissionFailed(error.clone()));
        }

        state.next_tx += 1;
        let hash = keccak256(format!("tx-{}", state.next_tx));
        let to = tx.to.and_then(|kind| kind.to().copied()).unwrap_or_default();
        let script = state
            .scripts
            .get_mut(&to)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();

        state.txs.insert(
            hash,
            TxEntry {
                request: tx,
                script,
                block: None,
                known: true,
            },
        );
        state.order.push(hash);
        if state.automine {
            Self::mine_block(&mut state);
        }
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> RendezvousResult<Option<ReceiptView>> {
        let state = self.state.lock();
        Self::check(&state)?;
        let Some(entry) = state.txs.get(&hash) else {
            return Ok(None);
        };
        let Some(block) = entry.block else {
            return Ok(None);
        };
        let logs = Self::block_logs(&state, block)
            .into_iter()
            .filter(|(h, _)| *h == hash)
            .map(|(_, log)| log)
            .collect();
        Ok(Some(ReceiptView {
            transaction_hash: hash,
            block_number: block,
            block_hash: Some(block_hash(block)),
            success: !entry.script.reverted,
            gas_used: 42_000,
            logs,
        }))
    }

    async fn is_transaction_known(&self, hash: TxHash) -> RendezvousResult<bool> {
        let state = self.state.lock();
        Self::check(&state)?;
        Ok(state.txs.get(&hash).is_some_and(|entry| entry.known))
    }

    async fn revert_reason(&self, hash: TxHash, _block_number: u64) -> RendezvousResult<Option<String>> {
        let state = self.state.lock();
        Self::check(&state)?;
        Ok(state.txs.get(&hash).and_then(|entry| entry.script.revert_reason.clone()))
    }

    async fn logs(&self, query: &LogQuery) -> RendezvousResult<Vec<Log>> {
        let state = self.state.lock();
        Self::check(&state)?;
        let mut out = Vec::new();
        for block in query.from_block..=query.to_block.min(state.head) {
            for (_, log) in Self::block_logs(&state, block) {
                if query.contains(log.address(), block) {
                    out.push(log);
                }
            }
        }
        Ok(out)
    }

    async fn call(&self, tx: TransactionRequest) -> RendezvousResult<Bytes> {
        let state = self.state.lock();
        Self::check(&state)?;
        let to = tx.to.and_then(|kind| kind.to().copied()).unwrap_or_default();
        let input = tx.input.input().cloned().unwrap_or_default();
        let selector: [u8; 4] = input
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| RendezvousError::Rpc("call without selector".into()))?;
        state
            .calls
            .get(&(to, selector))
            .cloned()
            .ok_or_else(|| RendezvousError::SubmissionFailed(format!("execution reverted: no response scripted for {}", to)))
    }
}
