pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod memory;
pub mod mine;
pub mod verify;

pub use config::ChainConfig;
pub use error::{LedgerError, Result};

use constants::{TICKET_PREFIX, TICKET_SUFFIX_MODULUS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Caller-supplied block content. Opaque to the ledger apart from the ticket id it stamps in.
pub type Payload = Map<String, Value>;

/// A sealed, persisted ledger record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    #[serde(rename = "data")]
    pub payload: Payload,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Recompute the digest from the block's current fields.
    pub fn compute_hash(&self) -> serde_json::Result<String> {
        let content = content_bytes(self.index, self.timestamp, &self.payload, &self.previous_hash)?;
        Ok(digest(&content, self.nonce))
    }
}

/// Block content waiting for a nonce. The canonical encoding is computed once up front so
/// every mining attempt only hashes the nonce suffix on top of it.
#[derive(Clone, Debug, PartialEq)]
pub struct UnsealedBlock {
    index: u64,
    timestamp: u64,
    payload: Payload,
    previous_hash: String,
    content: Vec<u8>,
}

impl UnsealedBlock {
    pub fn new(
        index: u64,
        timestamp: u64,
        payload: Payload,
        previous_hash: String,
    ) -> Result<Self> {
        let content = content_bytes(index, timestamp, &payload, &previous_hash)
            .map_err(|err| LedgerError::InvalidPayload(err.to_string()))?;
        Ok(Self {
            index,
            timestamp,
            payload,
            previous_hash,
            content,
        })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    /// A SHA-256 state that has already absorbed the canonical content.
    pub fn hasher(&self) -> Sha256 {
        let mut hasher = Sha256::new();
        hasher.update(&self.content);
        hasher
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        digest(&self.content, nonce)
    }

    pub fn into_block(self, nonce: u64, hash: String) -> Block {
        Block {
            index: self.index,
            timestamp: self.timestamp,
            payload: self.payload,
            previous_hash: self.previous_hash,
            nonce,
            hash,
        }
    }
}

/// Canonical encoding of everything but the nonce: a compact JSON object whose keys are
/// sorted at every depth, so insertion order in the payload never reaches the digest.
pub fn content_bytes(
    index: u64,
    timestamp: u64,
    payload: &Payload,
    previous_hash: &str,
) -> serde_json::Result<Vec<u8>> {
    let mut content = Map::new();
    content.insert("index".to_string(), Value::from(index));
    content.insert("payload".to_string(), Value::Object(payload.clone()));
    content.insert("previousHash".to_string(), Value::from(previous_hash));
    content.insert("timestamp".to_string(), Value::from(timestamp));
    serde_json::to_vec(&canonicalize(&Value::Object(content)))
}

/// Rebuild `value` with object keys in sorted order. Inserting in order keeps the result
/// sorted whether serde_json is backed by a BTreeMap or by an insertion-ordered map.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), canonicalize(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 over `content || decimal(nonce)`, lowercase hex.
pub fn digest(content: &[u8], nonce: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hasher.update(nonce.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Correlation tag stamped into a sealed payload, e.g. `TKT-7-0423`.
pub fn ticket_id(index: u64, timestamp: u64) -> String {
    format!(
        "{TICKET_PREFIX}-{index}-{:04}",
        timestamp % TICKET_SUFFIX_MODULUS
    )
}

pub mod pow {
    use crate::constants::DIFFICULTY_PREFIX;

    /// Number of leading `'0'` hex digits in `hash`.
    pub fn leading_zero_digits(hash: &str) -> usize {
        hash.bytes().take_while(|b| *b == b'0').count()
    }

    pub fn meets_difficulty(hash: &str) -> bool {
        hash.starts_with(DIFFICULTY_PREFIX)
    }
}
