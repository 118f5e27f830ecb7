//! Deterministic surrogate keys and attribute hashes.
//!
//! Keys are SHA-256 digests over a framed encoding of ordered
//! (column, value) pairs. Column order is part of the contract:
//! callers supply the declared business-key order, not a sorted one,
//! so keys stay stable across runs as long as the declaration does.

use chrono::Datelike;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::value::{RowRef, Value};

/// Separator between the column name and its value encoding.
const UNIT_SEP: u8 = 0x1f;
/// Separator between (column, value) pairs.
const RECORD_SEP: u8 = 0x1e;

/// A fixed-width deterministic digest identifying one logical row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurrogateKey(String);

impl SurrogateKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes surrogate keys over a declared, ordered business-key column list.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    node: String,
    columns: Vec<String>,
}

impl KeyGenerator {
    /// Create a generator for `node` over its declared key columns.
    pub fn new(node: impl Into<String>, columns: &[String]) -> CoreResult<Self> {
        let node = node.into();
        if columns.is_empty() {
            return Err(CoreError::InvalidKeyInput {
                node,
                reason: "business-key column list is empty".to_string(),
            });
        }
        Ok(Self {
            node,
            columns: columns.to_vec(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Key for a row read from the store. A column absent from the row
    /// encodes as the null sentinel, same as a present NULL.
    pub fn key_for_row(&self, row: &RowRef<'_>) -> SurrogateKey {
        let mut hasher = Sha256::new();
        for column in &self.columns {
            hash_pair(&mut hasher, column, row.get(column).unwrap_or(&Value::Null));
        }
        finalize(hasher)
    }

    /// Key for an explicit value tuple in declared column order.
    /// The tuple arity must match the declaration.
    pub fn key_for_values(&self, values: &[Value]) -> CoreResult<SurrogateKey> {
        if values.len() != self.columns.len() {
            return Err(CoreError::InvalidKeyInput {
                node: self.node.clone(),
                reason: format!(
                    "expected {} key values, got {}",
                    self.columns.len(),
                    values.len()
                ),
            });
        }
        let mut hasher = Sha256::new();
        for (column, value) in self.columns.iter().zip(values) {
            hash_pair(&mut hasher, column, value);
        }
        Ok(finalize(hasher))
    }
}

/// Digest of tracked attribute values, used to detect changed rows.
///
/// Same framed encoding as surrogate keys; columns absent from the row
/// encode as the null sentinel.
pub fn attribute_hash(columns: &[String], row: &RowRef<'_>) -> String {
    let mut hasher = Sha256::new();
    for column in columns {
        hash_pair(&mut hasher, column, row.get(column).unwrap_or(&Value::Null));
    }
    finalize(hasher).into_inner()
}

fn hash_pair(hasher: &mut Sha256, column: &str, value: &Value) {
    hasher.update(column.as_bytes());
    hasher.update([UNIT_SEP]);
    hash_value(hasher, value);
    hasher.update([RECORD_SEP]);
}

// One-byte type tags keep NULL distinct from '' and 1 distinct from "1";
// fixed-width big-endian payloads make the framing unambiguous.
fn hash_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update([0x00]),
        Value::Boolean(b) => {
            hasher.update([0x01]);
            hasher.update([u8::from(*b)]);
        }
        Value::Integer(i) => {
            hasher.update([0x02]);
            hasher.update(i.to_be_bytes());
        }
        Value::Float(f) => {
            hasher.update([0x03]);
            hasher.update(f.to_bits().to_be_bytes());
        }
        Value::Text(s) => {
            hasher.update([0x04]);
            hasher.update(s.as_bytes());
        }
        Value::Timestamp(ts) => {
            hasher.update([0x05]);
            hasher.update(ts.timestamp_micros().to_be_bytes());
        }
        Value::Date(d) => {
            hasher.update([0x06]);
            // days since 1970-01-01 (the epoch's CE day number is 719163)
            let days = i64::from(d.num_days_from_ce()) - 719_163;
            hasher.update(days.to_be_bytes());
        }
    }
}

fn finalize(hasher: Sha256) -> SurrogateKey {
    SurrogateKey(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
#[path = "key_test.rs"]
mod tests;
