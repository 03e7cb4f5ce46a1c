//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (confirmations >= 1, timeouts > 0)
//! - Check that URLs and contract addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RendezvousConfig → Result<(), Vec<ValidationError>>

use alloy::primitives::Address;
use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::RendezvousConfig;

/// A single semantic problem in a configuration file.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid URL in {field}: {value}")]
    InvalidUrl { field: String, value: String },

    #[error("contract '{name}' has invalid address '{value}'")]
    InvalidAddress { name: String, value: String },

    #[error("contract name '{0}' is declared more than once")]
    DuplicateContract(String),

    #[error("default network '{0}' is not declared")]
    UnknownDefaultNetwork(String),

    #[error("gas_price_multiplier must be at least 1.0, got {0}")]
    GasMultiplier(f64),

    #[error("borrow_ratio_bps must be between 1 and 10000, got {0}")]
    BorrowRatio(u32),

    #[error("admin.api_key must not be empty when the admin endpoint is enabled")]
    EmptyApiKey,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RendezvousConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.confirmations.required == 0 {
        errors.push(ValidationError::Zero { field: "confirmations.required" });
    }
    if config.confirmations.poll_interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "confirmations.poll_interval_ms" });
    }
    if config.confirmations.timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "confirmations.timeout_secs" });
    }
    if config.confirmations.drop_grace_polls == 0 {
        errors.push(ValidationError::Zero { field: "confirmations.drop_grace_polls" });
    }
    if config.fulfillment.timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "fulfillment.timeout_secs" });
    }
    if config.feed.poll_interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "feed.poll_interval_ms" });
    }
    if config.feed.max_block_range == 0 {
        errors.push(ValidationError::Zero { field: "feed.max_block_range" });
    }
    if config.ledger.rpc_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "ledger.rpc_timeout_secs" });
    }
    if config.ledger.gas_price_multiplier < 1.0 {
        errors.push(ValidationError::GasMultiplier(config.ledger.gas_price_multiplier));
    }

    check_url(&mut errors, "ledger.rpc_url".to_string(), &config.ledger.rpc_url);
    for url in &config.ledger.failover_urls {
        check_url(&mut errors, "ledger.failover_urls".to_string(), url);
    }
    for (name, network) in &config.networks {
        if let Some(url) = &network.rpc_url {
            check_url(&mut errors, format!("networks.{}.rpc_url", name), url);
        }
        if network.block_confirmations == Some(0) {
            errors.push(ValidationError::Zero { field: "networks.block_confirmations" });
        }
    }
    if let Some(default) = &config.default_network {
        if !config.networks.contains_key(default) {
            errors.push(ValidationError::UnknownDefaultNetwork(default.clone()));
        }
    }

    let mut seen = HashSet::new();
    for contract in &config.contracts {
        if !seen.insert(contract.name.as_str()) {
            errors.push(ValidationError::DuplicateContract(contract.name.clone()));
        }
        check_address(&mut errors, &contract.name, &contract.address);
    }

    if let Some(lending) = &config.lending {
        check_address(&mut errors, "lending.weth", &lending.weth);
        check_address(&mut errors, "lending.dai", &lending.dai);
        check_address(&mut errors, "lending.addresses_provider", &lending.addresses_provider);
        check_address(&mut errors, "lending.dai_eth_price_feed", &lending.dai_eth_price_feed);
        if lending.borrow_ratio_bps == 0 || lending.borrow_ratio_bps > 10_000 {
            errors.push(ValidationError::BorrowRatio(lending.borrow_ratio_bps));
        }
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::EmptyApiKey);
    }
    if config.admin.prune_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "admin.prune_interval_secs" });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: String, value: &str) {
    if url::Url::parse(value).is_err() {
        errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        });
    }
}

fn check_address(errors: &mut Vec<ValidationError>, name: &str, value: &str) {
    if value.parse::<Address>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            name: name.to_string(),
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ContractConfig, LendingConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RendezvousConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_confirmations_rejected() {
        let mut config = RendezvousConfig::default();
        config.confirmations.required = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::Zero { field: "confirmations.required" }]
        );
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = RendezvousConfig::default();
        config.ledger.rpc_url = "not a url".into();
        config.contracts.push(ContractConfig {
            name: "Raffle".into(),
            address: "0x1234".into(),
            abi_path: None,
            events: Vec::new(),
        });
        config.contracts.push(ContractConfig {
            name: "Raffle".into(),
            address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".into(),
            abi_path: None,
            events: Vec::new(),
        });
        config.lending = Some(LendingConfig {
            borrow_ratio_bps: 20_000,
            ..Default::default()
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::DuplicateContract("Raffle".into())));
        assert!(errors.contains(&ValidationError::BorrowRatio(20_000)));
    }

    #[test]
    fn test_enabled_admin_requires_api_key() {
        let mut config = RendezvousConfig::default();
        config.admin.api_key = String::new();
        // Disabled endpoint: the key is never checked
        assert!(validate_config(&config).is_ok());

        config.admin.enabled = true;
        assert_eq!(validate_config(&config).unwrap_err(), vec![ValidationError::EmptyApiKey]);
    }
}
