use anyhow::{Context, Result};
use ledger_core::chain::{ChainStore, StoreError};
use ledger_core::{Block, Payload};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use sled::{Db, IVec, Transactional, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";
const TREE_HASHES: &str = "hashes";

/// On-disk block record. The payload is kept as JSON text because bincode cannot carry
/// self-describing values.
#[derive(Serialize, Deserialize)]
struct StoredBlock {
  index: u64,
  timestamp: u64,
  payload_json: String,
  previous_hash: String,
  nonce: u64,
  hash: String,
}

fn encode(block: &Block) -> std::result::Result<Vec<u8>, StoreError> {
  let record = StoredBlock {
    index: block.index,
    timestamp: block.timestamp,
    payload_json: serde_json::to_string(&block.payload).map_err(StoreError::unavailable)?,
    previous_hash: block.previous_hash.clone(),
    nonce: block.nonce,
    hash: block.hash.clone(),
  };
  bincode::serialize(&record).map_err(StoreError::unavailable)
}

fn decode(bytes: &IVec) -> std::result::Result<Block, StoreError> {
  let record: StoredBlock = bincode::deserialize(bytes).map_err(StoreError::unavailable)?;
  let payload: Payload =
    serde_json::from_str(&record.payload_json).map_err(StoreError::unavailable)?;
  Ok(Block {
    index: record.index,
    timestamp: record.timestamp,
    payload,
    previous_hash: record.previous_hash,
    nonce: record.nonce,
    hash: record.hash,
  })
}

/// sled-backed chain store.
///
/// `blocks` maps big-endian index to the encoded block, so iteration order is index
/// order. `hashes` maps each block hash back to its index and enforces hash uniqueness.
/// Both are written in one transaction.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
  hashes: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("opening sled at {}", path.display()))?;
    let blocks = db.open_tree(TREE_BLOCKS).context("opening blocks tree")?;
    let hashes = db.open_tree(TREE_HASHES).context("opening hashes tree")?;
    info!(path = %path.display(), blocks = blocks.len(), "sled store opened");
    Ok(Self { db, blocks, hashes })
  }
}

impl ChainStore for SledStore {
  fn append(&self, block: &Block) -> std::result::Result<(), StoreError> {
    let key = block.index.to_be_bytes();
    let bytes = encode(block)?;

    let outcome = (&self.blocks, &self.hashes).transaction(
      |(blocks, hashes)| -> ConflictableTransactionResult<(), ()> {
        if blocks.get(&key[..])?.is_some() || hashes.get(block.hash.as_bytes())?.is_some() {
          return Err(ConflictableTransactionError::Abort(()));
        }
        blocks.insert(&key[..], bytes.as_slice())?;
        hashes.insert(block.hash.as_bytes(), &key[..])?;
        Ok(())
      },
    );

    match outcome {
      Ok(()) => {}
      Err(TransactionError::Abort(())) => {
        return Err(StoreError::Conflict { index: block.index });
      }
      Err(TransactionError::Storage(err)) => return Err(StoreError::unavailable(err)),
    }

    self.db.flush().map_err(StoreError::unavailable)?;
    debug!(index = block.index, "block persisted");
    Ok(())
  }

  fn get_block(&self, index: u64) -> std::result::Result<Option<Block>, StoreError> {
    self
      .blocks
      .get(index.to_be_bytes())
      .map_err(StoreError::unavailable)?
      .map(|bytes| decode(&bytes))
      .transpose()
  }

  fn head(&self) -> std::result::Result<Option<Block>, StoreError> {
    self
      .blocks
      .last()
      .map_err(StoreError::unavailable)?
      .map(|(_, bytes)| decode(&bytes))
      .transpose()
  }

  fn blocks(&self) -> std::result::Result<Vec<Block>, StoreError> {
    self
      .blocks
      .iter()
      .values()
      .map(|entry| entry.map_err(StoreError::unavailable).and_then(|bytes| decode(&bytes)))
      .collect()
  }

  fn close(&self) -> std::result::Result<(), StoreError> {
    self.db.flush().map_err(StoreError::unavailable)?;
    Ok(())
  }
}
