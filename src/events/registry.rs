//! ABI-driven decoding of raw logs into named records.
//!
//! # Responsibilities
//! - Hold the event definitions of every contract the caller cares about
//! - Load them from ABI JSON, Hardhat artifacts or human-readable signatures
//! - Turn raw EVM logs into [`LogRecord`]s with named fields
//!
//! # Design Decisions
//! - Lookup is by topic0 selector; several definitions may share one
//!   (ERC-20 and ERC-721 `Transfer`), the first that decodes wins
//! - Undecodable logs are skipped, never guessed at

use alloy::dyn_abi::{DynSolValue, EventExt};
use alloy::json_abi::{Event, JsonAbi};
use alloy::primitives::B256;
use alloy::rpc::types::Log;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{RendezvousError, RendezvousResult};
use crate::events::record::LogRecord;

/// Known event definitions, keyed by selector.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    by_selector: HashMap<B256, Vec<Event>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single event definition. Anonymous events are ignored.
    pub fn register_event(&mut self, event: Event) {
        if event.anonymous {
            tracing::debug!(event = %event.name, "Skipping anonymous event");
            return;
        }
        let candidates = self.by_selector.entry(event.selector()).or_default();
        if !candidates.contains(&event) {
            candidates.push(event);
        }
    }

    /// Register a human-readable signature such as
    /// `event NftRequested(uint256 indexed requestId, address requester)`.
    pub fn register_signature(&mut self, signature: &str) -> RendezvousResult<()> {
        let event = Event::parse(signature)
            .map_err(|e| RendezvousError::Abi(format!("invalid event '{}': {}", signature, e)))?;
        self.register_event(event);
        Ok(())
    }

    pub fn register_abi(&mut self, abi: &JsonAbi) {
        for event in abi.events() {
            self.register_event(event.clone());
        }
    }

    /// Load an ABI file. Accepts a bare ABI array or a Hardhat/Foundry
    /// artifact with an `abi` key.
    pub fn load_abi_file(&mut self, path: &Path) -> RendezvousResult<()> {
        let content = fs::read_to_string(path)
            .map_err(|e| RendezvousError::Abi(format!("{}: {}", path.display(), e)))?;
        let abi = parse_abi_json(&content)
            .map_err(|e| RendezvousError::Abi(format!("{}: {}", path.display(), e)))?;
        self.register_abi(&abi);
        tracing::debug!(path = %path.display(), events = abi.events().count(), "Loaded ABI");
        Ok(())
    }

    /// Number of distinct event definitions.
    pub fn len(&self) -> usize {
        self.by_selector.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_selector.is_empty()
    }

    /// Decode one raw log; `None` when no registered event matches.
    pub fn decode(&self, log: &Log) -> Option<LogRecord> {
        let data = log.data();
        let selector = data.topics().first()?;
        let candidates = self.by_selector.get(selector)?;

        for event in candidates {
            let Ok(decoded) = event.decode_log(data) else {
                continue;
            };

            let mut indexed = decoded.indexed.into_iter();
            let mut body = decoded.body.into_iter();
            let mut fields: Vec<(String, DynSolValue)> = Vec::with_capacity(event.inputs.len());
            for param in &event.inputs {
                let value = if param.indexed { indexed.next() } else { body.next() };
                let Some(value) = value else {
                    break;
                };
                fields.push((param.name.clone(), value));
            }

            return Some(LogRecord {
                address: log.address(),
                event: event.name.clone(),
                fields,
                block_number: log.block_number,
                transaction_hash: log.transaction_hash,
                log_index: log.log_index,
            });
        }

        tracing::debug!(selector = %selector, "Log matched a selector but failed to decode");
        None
    }

    /// Decode a batch, preserving emission order and skipping unknown logs.
    pub fn decode_all(&self, logs: &[Log]) -> Vec<LogRecord> {
        logs.iter().filter_map(|log| self.decode(log)).collect()
    }
}

fn parse_abi_json(content: &str) -> Result<JsonAbi, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    match value {
        serde_json::Value::Object(mut artifact) if artifact.contains_key("abi") => {
            let abi = artifact.remove("abi").unwrap_or_default();
            serde_json::from_value(abi)
        }
        other => serde_json::from_value(other),
    }
}
