//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::RendezvousConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("{0}")]
    Network(String),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<RendezvousConfig, ConfigError> {
    let config: RendezvousConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RendezvousConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load the file when it exists, otherwise fall back to defaults, then select a network.
pub fn load_or_default(path: &Path, network: Option<&str>) -> Result<RendezvousConfig, ConfigError> {
    let config = if path.exists() {
        load_config(path)?
    } else {
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        RendezvousConfig::default()
    };
    let config = config.with_network(network).map_err(ConfigError::Network)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_network = "hardhat"

[ledger]
rpc_url = "http://127.0.0.1:8545"
chain_id = 31337

[networks.hardhat]
block_confirmations = 1
development = true

[networks.sepolia]
rpc_url = "https://sepolia.example"
chain_id = 11155111
block_confirmations = 6

[confirmations]
poll_interval_ms = 250

[[contracts]]
name = "Raffle"
address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
events = ["event RequestedRaffleWinner(uint256 indexed requestId)"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.confirmations.poll_interval_ms, 250);
        assert_eq!(config.confirmations.timeout_secs, 120);
        assert_eq!(config.contracts.len(), 1);
        assert_eq!(config.networks.len(), 2);
    }

    #[test]
    fn test_validation_error_surfaces() {
        let err = parse_config("[confirmations]\nrequired = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("confirmations.required"));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("[confirmations\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_or_default(Path::new("does-not-exist.toml"), None).unwrap();
        assert_eq!(config.ledger.chain_id, 31337);
    }
}
