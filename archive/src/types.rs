//! Core data types for archive records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque transaction payload, always a JSON object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tx(Map<String, Value>);

impl Tx {
    /// Wrap a JSON object as a transaction payload
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build a payload from an arbitrary JSON value, rejecting non-objects
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Borrow the payload fields
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the payload into a JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// A single block transaction along with the block information.
///
/// This is the line layout of a standard archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxData {
    pub tx: Tx,

    #[serde(rename = "blockNum")]
    pub block_num: u64,

    /// Block creation time in unix milliseconds
    #[serde(rename = "bt", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// A transaction read back from an archive.
///
/// Legacy archives carry no block metadata, so both fields stay empty for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub tx: Tx,
    pub block_num: Option<u64>,
    pub timestamp: Option<i64>,
}

impl TxRecord {
    /// Record for a bare payload without provenance
    pub fn bare(tx: Tx) -> Self {
        Self {
            tx,
            block_num: None,
            timestamp: None,
        }
    }
}

impl From<TxData> for TxRecord {
    fn from(data: TxData) -> Self {
        Self {
            tx: data.tx,
            block_num: Some(data.block_num),
            timestamp: data.timestamp,
        }
    }
}

/// Block contents as reported by the node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub height: u64,

    /// Block creation time in unix milliseconds, when the node reports one
    pub timestamp: Option<i64>,

    /// Transactions in block order
    pub txs: Vec<Tx>,
}

/// Requested block span of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: Option<u64>,
}

impl BlockRange {
    /// Create a new block range
    pub fn new(from: u64, to: Option<u64>) -> Self {
        Self { from, to }
    }

    /// Check that a concrete upper bound is not below the lower bound
    pub fn is_valid(&self) -> bool {
        self.to.map_or(true, |to| self.from <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tx_rejects_non_objects() {
        assert!(Tx::from_value(json!({"msg": []})).is_some());
        assert!(Tx::from_value(json!([1, 2])).is_none());
        assert!(serde_json::from_str::<Tx>("\"raw\"").is_err());
    }

    #[test]
    fn test_tx_data_field_names() {
        let data = TxData {
            tx: Tx::from_value(json!({"fee": "1ugnot"})).unwrap(),
            block_num: 7,
            timestamp: Some(1_700_000_000_000),
        };

        let encoded = serde_json::to_value(&data).unwrap();
        assert_eq!(
            encoded,
            json!({"tx": {"fee": "1ugnot"}, "blockNum": 7, "bt": 1_700_000_000_000i64})
        );
    }

    #[test]
    fn test_tx_data_without_block_time() {
        let data: TxData = serde_json::from_str(r#"{"tx":{},"blockNum":3}"#).unwrap();
        assert_eq!(data.timestamp, None);
        assert!(serde_json::from_str::<TxData>(r#"{"tx":{}}"#).is_err());
    }

    #[test]
    fn test_block_range_validity() {
        assert!(BlockRange::new(1, None).is_valid());
        assert!(BlockRange::new(5, Some(5)).is_valid());
        assert!(!BlockRange::new(10, Some(9)).is_valid());
    }
}
