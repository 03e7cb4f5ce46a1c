//! Signing account and nonce tracking.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::env::VarError;
use std::sync::Arc;

use crate::error::{RendezvousError, RendezvousResult};

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "RENDEZVOUS_PRIVATE_KEY";

/// Locally handed-out nonces.
#[derive(Debug, Default)]
struct NonceState {
    /// Next nonce never handed out.
    next: u64,
    /// Nonces below `next` whose transactions never reached the node.
    released: BTreeSet<u64>,
}

/// Signing account shared by every interaction submitted from this process.
///
/// Clones share the nonce counter so concurrent interactions never reuse a nonce.
#[derive(Debug, Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
    nonces: Arc<Mutex<NonceState>>,
    /// Chain ID for EIP-155 replay protection.
    chain_id: u64,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key (with or without `0x`).
    pub fn from_private_key(private_key_hex: &str, chain_id: u64) -> RendezvousResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| RendezvousError::Wallet(format!("Invalid private key format: {}", e)))?;

        tracing::info!(
            address = %signer.address(),
            chain_id = chain_id,
            "Wallet initialized"
        );

        Ok(Self {
            signer,
            nonces: Arc::new(Mutex::new(NonceState::default())),
            chain_id,
        })
    }

    /// Load wallet from `RENDEZVOUS_PRIVATE_KEY`.
    ///
    /// `None` when the variable is unset; a set but malformed key is an error.
    pub fn from_env(chain_id: u64) -> RendezvousResult<Option<Self>> {
        Self::from_key_var(std::env::var(PRIVATE_KEY_ENV_VAR), chain_id)
    }

    fn from_key_var(var: Result<String, VarError>, chain_id: u64) -> RendezvousResult<Option<Self>> {
        match var {
            Ok(private_key) => Self::from_private_key(&private_key, chain_id).map(Some),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(RendezvousError::Wallet(format!(
                "{} is not valid unicode",
                PRIVATE_KEY_ENV_VAR
            ))),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Signing wallet for alloy's provider fillers.
    pub fn ethereum_wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }

    /// Reserve the next nonce, never going below what the chain reports.
    ///
    /// Released nonces are handed out again first, lowest first, so a failed
    /// send never leaves a gap that later transactions queue behind. Local
    /// reservations the chain has not seen yet are kept, so two interactions
    /// submitted back to back get consecutive nonces.
    pub fn reserve_nonce(&self, chain_nonce: u64) -> u64 {
        let mut state = self.nonces.lock();
        // Anything below the chain count was used by some other sender
        state.released = state.released.split_off(&chain_nonce);
        state.next = state.next.max(chain_nonce);

        if let Some(nonce) = state.released.pop_first() {
            return nonce;
        }
        let nonce = state.next;
        state.next += 1;
        nonce
    }

    /// Give back a reserved nonce whose transaction never reached the node.
    pub fn release_nonce(&self, nonce: u64) {
        let mut guard = self.nonces.lock();
        let state = &mut *guard;
        if nonce >= state.next {
            return;
        }
        if nonce + 1 == state.next {
            state.next = nonce;
            while state.next > 0 && state.released.remove(&(state.next - 1)) {
                state.next -= 1;
            }
        } else {
            state.released.insert(nonce);
        }
    }
}
