//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the ledger and load the signing wallet (if any)
//! - Build the event registry from configured contracts
//! - Create the hub, interaction registry and shutdown coordinator
//! - Hand out the components commands need, wired to the same hub
//!
//! # Design Decisions
//! - Fail fast on configuration problems (bad addresses, unreadable ABIs)
//! - A missing private key is not an error until something needs to sign;
//!   a malformed one fails startup

use alloy::primitives::Address;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::admin::{spawn_admin, AdminState};
use crate::config::{ContractConfig, RendezvousConfig};
use crate::error::{RendezvousError, RendezvousResult};
use crate::events::EventRegistry;
use crate::flows::randomness;
use crate::interaction::{InteractionRegistry, RoundRunner};
use crate::ledger::{Ledger, LedgerClient, Wallet, PRIVATE_KEY_ENV_VAR};
use crate::lifecycle::Shutdown;
use crate::rendezvous::{EventHub, LogFeed};
use crate::tx::{ConfirmationPolicy, ConfirmationWaiter, Submitter};

/// Decode every configured contract's events. Returns the registry and the
/// contract addresses by name.
pub fn build_registry(contracts: &[ContractConfig]) -> RendezvousResult<(EventRegistry, BTreeMap<String, Address>)> {
    let mut registry = EventRegistry::new();
    randomness::register_events(&mut registry)?;

    let mut addresses = BTreeMap::new();
    for contract in contracts {
        let address = Address::from_str(&contract.address).map_err(|e| {
            RendezvousError::Config(format!("contract '{}' address: {}", contract.name, e))
        })?;
        if let Some(path) = &contract.abi_path {
            registry.load_abi_file(Path::new(path))?;
        }
        for signature in &contract.events {
            registry.register_signature(signature)?;
        }
        addresses.insert(contract.name.clone(), address);
    }

    tracing::debug!(contracts = addresses.len(), events = registry.len(), "Event registry built");
    Ok((registry, addresses))
}

/// Everything a command needs, wired together.
pub struct Runtime {
    pub config: RendezvousConfig,
    pub ledger: Arc<dyn Ledger>,
    pub registry: Arc<EventRegistry>,
    pub contracts: BTreeMap<String, Address>,
    pub hub: EventHub,
    pub interactions: InteractionRegistry,
    pub wallet: Option<Wallet>,
    pub shutdown: Shutdown,
}

impl Runtime {
    /// Connect to the configured ledger.
    pub async fn start(config: RendezvousConfig) -> RendezvousResult<Self> {
        let wallet = Wallet::from_env(config.ledger.chain_id)?;
        if wallet.is_none() {
            tracing::info!(env = PRIVATE_KEY_ENV_VAR, "No signing key configured, read-only mode");
        }
        let client = LedgerClient::new(config.ledger.clone(), wallet.clone()).await?;
        Self::with_ledger(config, Arc::new(client), wallet)
    }

    /// Wire components around an existing ledger.
    pub fn with_ledger(
        config: RendezvousConfig,
        ledger: Arc<dyn Ledger>,
        wallet: Option<Wallet>,
    ) -> RendezvousResult<Self> {
        let (registry, contracts) = build_registry(&config.contracts)?;
        Ok(Self {
            config,
            ledger,
            registry: Arc::new(registry),
            contracts,
            hub: EventHub::new(),
            interactions: InteractionRegistry::new(),
            wallet,
            shutdown: Shutdown::new(),
        })
    }

    /// Resolve a configured contract name or a literal address.
    pub fn contract(&self, name_or_address: &str) -> RendezvousResult<Address> {
        if let Some(address) = self.contracts.get(name_or_address) {
            return Ok(*address);
        }
        Address::from_str(name_or_address).map_err(|_| {
            RendezvousError::Config(format!(
                "'{}' is neither a configured contract nor an address",
                name_or_address
            ))
        })
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy::from_config(&self.config.confirmations)
    }

    pub fn waiter(&self) -> ConfirmationWaiter {
        ConfirmationWaiter::new(self.ledger.clone(), self.registry.clone(), self.confirmation_policy())
    }

    pub fn submitter(&self) -> RendezvousResult<Submitter> {
        let wallet = self.wallet.clone().ok_or_else(|| {
            RendezvousError::Wallet(format!("{} must be set to submit transactions", PRIVATE_KEY_ENV_VAR))
        })?;
        Ok(Submitter::new(self.ledger.clone(), wallet, &self.config.ledger))
    }

    pub fn runner(&self) -> RendezvousResult<RoundRunner> {
        Ok(RoundRunner::new(
            self.submitter()?,
            self.waiter(),
            self.hub.clone(),
            self.interactions.clone(),
        ))
    }

    /// Log feed over `addresses`, or every configured contract when empty.
    pub fn feed(&self, addresses: Vec<Address>) -> LogFeed {
        let addresses = if addresses.is_empty() {
            self.contracts.values().copied().collect()
        } else {
            addresses
        };
        LogFeed::new(
            self.ledger.clone(),
            self.registry.clone(),
            self.hub.clone(),
            addresses,
            self.config.feed.clone(),
        )
    }

    pub fn admin_state(&self) -> AdminState {
        AdminState {
            ledger: self.ledger.clone(),
            hub: self.hub.clone(),
            registry: self.interactions.clone(),
            api_key: Arc::from(self.config.admin.api_key.as_str()),
            network: self.config.ledger.network.clone(),
            chain_id: self.config.ledger.chain_id,
        }
    }

    /// Serve the admin endpoint over this runtime's hub and interaction
    /// registry, and prune finished interactions. `None` when disabled.
    pub async fn start_admin(&self) -> RendezvousResult<Option<AdminTasks>> {
        let admin = &self.config.admin;
        if !admin.enabled {
            return Ok(None);
        }
        let addr: SocketAddr = admin
            .bind_address
            .parse()
            .map_err(|e| RendezvousError::Config(format!("admin.bind_address: {}", e)))?;
        let server = spawn_admin(self.admin_state(), addr, &self.shutdown)
            .await
            .map_err(|e| RendezvousError::Config(format!("admin endpoint on {}: {}", addr, e)))?;
        let pruner = self
            .interactions
            .spawn_pruner(admin.prune_interval(), admin.retain_finished(), &self.shutdown);
        Ok(Some(AdminTasks { server, pruner }))
    }
}

/// Background tasks started by [`Runtime::start_admin`]. They stop on shutdown.
#[derive(Debug)]
pub struct AdminTasks {
    server: JoinHandle<std::io::Result<()>>,
    pruner: JoinHandle<()>,
}

impl AdminTasks {
    /// Wait for both tasks to finish after shutdown was triggered.
    pub async fn join(self) {
        match self.server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Admin endpoint failed"),
            Err(e) => tracing::warn!(error = %e, "Admin endpoint task failed"),
        }
        if let Err(e) = self.pruner.await {
            tracing::warn!(error = %e, "Interaction pruner task failed");
        }
    }
}
