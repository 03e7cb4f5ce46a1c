//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! interaction runner. All types derive Serde traits for deserialization
//! from TOML files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RendezvousConfig {
    /// Ledger RPC connection settings.
    pub ledger: LedgerConfig,

    /// Named networks overriding the ledger section (Hardhat-style).
    pub networks: BTreeMap<String, NetworkConfig>,

    /// Network selected when none is given on the command line.
    pub default_network: Option<String>,

    /// Confirmation waiting policy.
    pub confirmations: ConfirmationConfig,

    /// Fulfillment (cross-transaction) waiting policy.
    pub fulfillment: FulfillmentConfig,

    /// Live log feed settings.
    pub feed: FeedConfig,

    /// Contracts whose events should be decoded.
    pub contracts: Vec<ContractConfig>,

    /// Lending flow addresses, when the lending flow is used.
    pub lending: Option<LendingConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin endpoint settings.
    pub admin: AdminConfig,
}

impl RendezvousConfig {
    /// Apply the named network on top of the ledger section.
    ///
    /// Falls back to `default_network` when `name` is `None`; returns the
    /// configuration unchanged when neither is set.
    pub fn with_network(mut self, name: Option<&str>) -> Result<Self, String> {
        let Some(name) = name.map(str::to_string).or_else(|| self.default_network.clone()) else {
            return Ok(self);
        };
        let network = self
            .networks
            .get(&name)
            .cloned()
            .ok_or_else(|| format!("Unknown network '{}'", name))?;

        if let Some(url) = network.rpc_url {
            self.ledger.rpc_url = url;
        }
        if let Some(chain_id) = network.chain_id {
            self.ledger.chain_id = chain_id;
        }
        if let Some(blocks) = network.block_confirmations {
            self.confirmations.required = blocks;
        }
        self.ledger.network = Some(name);
        self.ledger.development = network.development;
        Ok(self)
    }
}

/// Ledger RPC configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for a local Hardhat node).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Gas price multiplier (1.0 = node estimate, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,

    /// Name of the selected network, filled in by [`RendezvousConfig::with_network`].
    #[serde(skip)]
    pub network: Option<String>,

    /// Whether the selected network is a local development chain.
    #[serde(skip)]
    pub development: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 31337,
            rpc_timeout_secs: 10,
            gas_price_multiplier: 1.2,
            max_gas_price_gwei: 500,
            network: None,
            development: false,
        }
    }
}

/// A named network entry.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NetworkConfig {
    pub rpc_url: Option<String>,
    pub chain_id: Option<u64>,
    /// Confirmations to wait for on this network.
    pub block_confirmations: Option<u32>,
    /// Local chains where mocks stand in for off-chain actors.
    pub development: bool,
}

/// Confirmation waiting policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Total inclusions required (1 = mined, 2 = one block on top, ...).
    pub required: u32,

    /// Receipt polling interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Deadline for the whole confirmation wait in seconds.
    pub timeout_secs: u64,

    /// Consecutive polls in which the node no longer knows the transaction
    /// before it is reported as dropped.
    pub drop_grace_polls: u32,
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            required: 1,
            poll_interval_ms: 1000,
            timeout_secs: 120,
            drop_grace_polls: 5,
        }
    }
}

/// Fulfillment waiting policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FulfillmentConfig {
    /// Deadline for the off-chain actor's answer in seconds.
    pub timeout_secs: u64,
}

impl FulfillmentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

/// Live log feed settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Blocks to stay behind the head before publishing logs.
    pub confirmation_lag: u64,

    /// Maximum block span per `eth_getLogs` request.
    pub max_block_range: u64,
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            confirmation_lag: 0,
            max_block_range: 500,
        }
    }
}

/// A contract whose events should be decoded.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractConfig {
    /// Name used on the command line and in logs.
    pub name: String,

    /// Deployed address.
    pub address: String,

    /// Path to an ABI JSON file or a Hardhat artifact.
    #[serde(default)]
    pub abi_path: Option<String>,

    /// Inline human-readable event signatures.
    #[serde(default)]
    pub events: Vec<String>,
}

/// Addresses used by the lending flow.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LendingConfig {
    pub weth: String,
    pub dai: String,
    pub addresses_provider: String,
    pub dai_eth_price_feed: String,

    /// Collateral to wrap and deposit, in wei.
    pub amount_wei: String,

    /// Share of the available borrowing power to use, in basis points.
    pub borrow_ratio_bps: u32,
}

impl Default for LendingConfig {
    fn default() -> Self {
        // Mainnet addresses, usable against a forked local node.
        Self {
            weth: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".to_string(),
            dai: "0x6B175474E89094C44Da98b954EedeAC495271d0F".to_string(),
            addresses_provider: "0xB53C1a33016B2DC2fF3653530bfF1848a515c8c5".to_string(),
            dai_eth_price_feed: "0x773616E4d11A78F511299002da57A0a94577F1f4".to_string(),
            amount_wei: "20000000000000000".to_string(),
            borrow_ratio_bps: 9500,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "tx_rendezvous=info".to_string(),
            log_format: LogFormat::Compact,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin endpoint alongside `serve` and the round-driving commands.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin endpoint bind address.
    pub bind_address: String,

    /// How long finished interactions stay visible, in seconds.
    pub retain_finished_secs: u64,

    /// Interval between registry pruning passes, in seconds.
    pub prune_interval_secs: u64,
}

impl AdminConfig {
    pub fn retain_finished(&self) -> Duration {
        Duration::from_secs(self.retain_finished_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: placeholder, override in any shared deployment.
            api_key: "CHANGE_ME".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
            retain_finished_secs: 3600,
            prune_interval_secs: 60,
        }
    }
}
