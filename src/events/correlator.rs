//! Event correlation over a transaction's log records.
//!
//! Lookups are by event name, never by position: a receipt's log order
//! depends on which contracts the call touched (an ERC-721 mint emits
//! `Transfer` before the consumer's own event), so "the event at index 1"
//! silently breaks whenever the call path changes.

use alloy::primitives::Address;
use serde::Serialize;

use crate::error::{RendezvousError, RendezvousResult};
use crate::events::record::{CorrelationToken, LogRecord};

/// First record named `event`, in emission order.
pub fn find_event<'a>(records: &'a [LogRecord], event: &str) -> RendezvousResult<&'a LogRecord> {
    records
        .iter()
        .find(|record| record.event == event)
        .ok_or_else(|| RendezvousError::EventNotFound(event.to_string()))
}

/// First record named `event` emitted by `emitter`.
pub fn find_event_from<'a>(
    records: &'a [LogRecord],
    emitter: Address,
    event: &str,
) -> RendezvousResult<&'a LogRecord> {
    records
        .iter()
        .find(|record| record.address == emitter && record.event == event)
        .ok_or_else(|| RendezvousError::EventNotFound(format!("{} from {}", event, emitter)))
}

/// Which event and field carry a correlation token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CorrelationSpec {
    pub event: String,
    pub field: String,
    /// Restrict matches to one emitting contract.
    pub emitter: Option<Address>,
}

impl CorrelationSpec {
    pub fn new(event: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            field: field.into(),
            emitter: None,
        }
    }

    pub fn from_emitter(mut self, emitter: Address) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Whether a record is of the right event and emitter.
    pub fn matches_event(&self, record: &LogRecord) -> bool {
        record.event == self.event && self.emitter.map_or(true, |e| e == record.address)
    }

    /// Locate the event in a transaction's records and extract the token.
    pub fn extract(&self, records: &[LogRecord]) -> RendezvousResult<CorrelationToken> {
        let record = match self.emitter {
            Some(emitter) => find_event_from(records, emitter, &self.event)?,
            None => find_event(records, &self.event)?,
        };
        record.token(&self.field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::dyn_abi::DynSolValue;
    use alloy::primitives::U256;

    fn rec(address: u8, event: &str, id: u64) -> LogRecord {
        LogRecord::new(Address::repeat_byte(address), event)
            .with_field("requestId", DynSolValue::Uint(U256::from(id), 256))
    }

    #[test]
    fn test_first_occurrence_wins() {
        let records = vec![rec(1, "A", 1), rec(1, "B", 2), rec(1, "A", 3)];
        let found = find_event(&records, "A").unwrap();
        assert_eq!(found.token("requestId").unwrap(), CorrelationToken::from(U256::from(1)));
    }

    #[test]
    fn test_event_not_found() {
        let records = vec![rec(1, "A", 1)];
        let err = find_event(&records, "C").unwrap_err();
        assert!(matches!(err, RendezvousError::EventNotFound(name) if name == "C"));
        assert!(find_event(&[], "A").is_err());
    }

    #[test]
    fn test_emitter_restriction() {
        // The coordinator emits its own event with the same name first
        let records = vec![rec(9, "RandomWordsRequested", 100), rec(1, "RandomWordsRequested", 5)];
        let spec = CorrelationSpec::new("RandomWordsRequested", "requestId")
            .from_emitter(Address::repeat_byte(1));
        assert_eq!(spec.extract(&records).unwrap(), CorrelationToken::from(U256::from(5)));

        let unrestricted = CorrelationSpec::new("RandomWordsRequested", "requestId");
        assert_eq!(
            unrestricted.extract(&records).unwrap(),
            CorrelationToken::from(U256::from(100))
        );
    }

    #[test]
    fn test_missing_field() {
        let records = vec![rec(1, "A", 1)];
        let spec = CorrelationSpec::new("A", "tokenId");
        assert!(matches!(
            spec.extract(&records),
            Err(RendezvousError::MissingField { .. })
        ));
    }
}
