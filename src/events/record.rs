//! Decoded log records and correlation tokens.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{hex, Address, Bytes, TxHash, U256};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{RendezvousError, RendezvousResult};

/// One decoded event emitted by a contract.
///
/// Fields keep their ABI declaration order. Records are read-only views of
/// ledger data; nothing in this crate mutates them after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub address: Address,
    pub event: String,
    pub fields: Vec<(String, DynSolValue)>,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<TxHash>,
    pub log_index: Option<u64>,
}

impl LogRecord {
    pub fn new(address: Address, event: impl Into<String>) -> Self {
        Self {
            address,
            event: event.into(),
            fields: Vec::new(),
            block_number: None,
            transaction_hash: None,
            log_index: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: DynSolValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    /// Attach chain position metadata.
    pub fn at(mut self, block_number: u64, transaction_hash: TxHash, log_index: u64) -> Self {
        self.block_number = Some(block_number);
        self.transaction_hash = Some(transaction_hash);
        self.log_index = Some(log_index);
        self
    }

    /// Look up a named field.
    pub fn field(&self, name: &str) -> RendezvousResult<&DynSolValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
            .ok_or_else(|| RendezvousError::MissingField {
                event: self.event.clone(),
                field: name.to_string(),
            })
    }

    /// Extract a named field as a correlation token.
    pub fn token(&self, field: &str) -> RendezvousResult<CorrelationToken> {
        self.field(field).map(CorrelationToken::from_value)
    }

    /// JSON rendering for CLI output and the admin endpoint.
    pub fn to_json(&self) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value_to_json(value)))
            .collect();

        serde_json::json!({
            "address": self.address.to_string(),
            "event": self.event,
            "fields": fields,
            "block_number": self.block_number,
            "transaction_hash": self.transaction_hash.map(|h| h.to_string()),
            "log_index": self.log_index,
        })
    }
}

fn value_to_json(value: &DynSolValue) -> serde_json::Value {
    use serde_json::Value;
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        // Decimal strings: 256-bit integers don't fit JSON numbers
        DynSolValue::Uint(v, _) => Value::String(v.to_string()),
        DynSolValue::Int(v, _) => Value::String(v.to_string()),
        DynSolValue::Address(a) => Value::String(a.to_string()),
        DynSolValue::FixedBytes(word, size) => Value::String(hex::encode_prefixed(&word[..*size])),
        DynSolValue::Bytes(b) => Value::String(hex::encode_prefixed(b)),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(value_to_json).collect())
        }
        other => Value::String(format!("{:?}", other)),
    }
}

/// Identifier linking a later event to the transaction that caused it.
///
/// Stored as the canonical ABI encoding of the field value so that tokens
/// compare equal exactly when the underlying values do, regardless of
/// which event carried them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CorrelationToken(Bytes);

impl CorrelationToken {
    pub fn from_value(value: &DynSolValue) -> Self {
        Self(Bytes::from(value.abi_encode()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Interpret the token as a `uint256` (e.g. a VRF request id).
    pub fn as_u256(&self) -> Option<U256> {
        if self.0.len() != 32 {
            return None;
        }
        U256::try_from_be_slice(&self.0)
    }
}

impl From<U256> for CorrelationToken {
    fn from(value: U256) -> Self {
        Self::from_value(&DynSolValue::Uint(value, 256))
    }
}

impl FromStr for CorrelationToken {
    type Err = RendezvousError;

    /// Parses decimal or `0x`-prefixed integers, the usual shape of request ids.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str(s)
            .map(Self::from)
            .map_err(|e| RendezvousError::Config(format!("invalid correlation token '{}': {}", s, e)))
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_u256() {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LogRecord {
        LogRecord::new(Address::repeat_byte(1), "NftRequested")
            .with_field("requestId", DynSolValue::Uint(U256::from(7), 256))
            .with_field("requester", DynSolValue::Address(Address::repeat_byte(2)))
    }

    #[test]
    fn test_field_lookup() {
        let record = record();
        assert_eq!(
            record.field("requestId").unwrap(),
            &DynSolValue::Uint(U256::from(7), 256)
        );
        let err = record.field("tokenId").unwrap_err();
        assert!(matches!(err, RendezvousError::MissingField { .. }));
    }

    #[test]
    fn test_token_equality_follows_value() {
        let record = record();
        let token = record.token("requestId").unwrap();
        assert_eq!(token, CorrelationToken::from(U256::from(7)));
        assert_ne!(token, CorrelationToken::from(U256::from(8)));
        assert_eq!(token.as_u256(), Some(U256::from(7)));
        assert_eq!(token.to_string(), "7");
    }

    #[test]
    fn test_token_parse() {
        let decimal: CorrelationToken = "42".parse().unwrap();
        let hex: CorrelationToken = "0x2a".parse().unwrap();
        assert_eq!(decimal, hex);
        assert!("forty-two".parse::<CorrelationToken>().is_err());
    }

    #[test]
    fn test_address_token_is_not_u256() {
        let token = record().token("requester").unwrap();
        // Addresses are left-padded to a word, so they still decode as a number
        assert!(token.as_u256().is_some());
        assert_ne!(token, CorrelationToken::from(U256::from(7)));
    }

    #[test]
    fn test_json_rendering() {
        let json = record().to_json();
        assert_eq!(json["event"], "NftRequested");
        assert_eq!(json["fields"]["requestId"], "7");
    }
}
