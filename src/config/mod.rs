//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → schema::with_network (Hardhat-style network selection)
//!     → RendezvousConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Secrets never live in the file; the signing key comes from the environment

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::{
    AdminConfig, ConfirmationConfig, ContractConfig, FeedConfig, FulfillmentConfig,
    LedgerConfig, LendingConfig, LogFormat, NetworkConfig, ObservabilityConfig,
    RendezvousConfig,
};
