use crate::{
    constants::{
        GENESIS_PREVIOUS_HASH, GENESIS_TICKET, GENESIS_TIMESTAMP, GENESIS_TOURIST, TICKET_ID_KEY,
    },
    mine::{self, CancelFlag},
    now_millis, ticket_id,
    verify::{verify_chain, IntegrityReport, Violation},
    Block, ChainConfig, LedgerError, Payload, Result, UnsealedBlock,
};
use serde_json::Value;
use std::{error::Error as StdError, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Trait the storage backends implement for the chain to operate.
/// This lives in `ledger-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    /// Persist `block` atomically. Must fail with [`StoreError::Conflict`] when its index or
    /// hash is already taken, and must never leave a partial record behind.
    fn append(&self, block: &Block) -> std::result::Result<(), StoreError>;
    fn get_block(&self, index: u64) -> std::result::Result<Option<Block>, StoreError>;
    /// Highest-index block, if any.
    fn head(&self) -> std::result::Result<Option<Block>, StoreError>;
    /// All blocks in ascending index order.
    fn blocks(&self) -> std::result::Result<Vec<Block>, StoreError>;
    fn close(&self) -> std::result::Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("block {index} collides with a persisted index or hash")]
    Conflict { index: u64 },

    #[error(transparent)]
    Unavailable(Box<dyn StdError + Send + Sync + 'static>),
}

impl StoreError {
    pub fn unavailable<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        StoreError::Unavailable(err.into())
    }
}

/// The fixed content every chain starts from.
pub fn genesis_payload() -> Payload {
    let mut payload = Payload::new();
    payload.insert(TICKET_ID_KEY.to_string(), Value::from(GENESIS_TICKET));
    payload.insert("tourist".to_string(), Value::from(GENESIS_TOURIST));
    payload.insert("location".to_string(), Value::from(vec![0, 0]));
    payload
}

/// The mined genesis block. Every input is fixed, so every caller derives the same block.
pub fn genesis_block() -> Result<Block> {
    let candidate = UnsealedBlock::new(
        0,
        GENESIS_TIMESTAMP,
        genesis_payload(),
        GENESIS_PREVIOUS_HASH.to_string(),
    )?;
    Ok(mine::seal(candidate))
}

/// Candidate for the block after `head`, stamped with its ticket id. Index and link always
/// come from the real head; there is no fallback index.
pub fn build_candidate(mut payload: Payload, head: &Block) -> Result<UnsealedBlock> {
    let index = head.index + 1;
    let timestamp = now_millis();
    payload.insert(
        TICKET_ID_KEY.to_string(),
        Value::String(ticket_id(index, timestamp)),
    );
    UnsealedBlock::new(index, timestamp, payload, head.hash.clone())
}

/// Steps of one append request. `Persist` goes back to `ReadHead` when another append took
/// the index first.
#[derive(Debug)]
enum AppendState {
    ReadHead,
    BuildCandidate(Block),
    Mine(UnsealedBlock),
    Persist(Block),
    Done(Block),
}

/// Chain that delegates persistence to a `ChainStore`.
pub struct Chain<S: ChainStore> {
    store: Arc<S>,
    config: ChainConfig,
}

impl<S: ChainStore> Clone for Chain<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: ChainStore> Chain<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, ChainConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: ChainConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Ensure a genesis block exists and return it. Idempotent, and safe to race: the
    /// store's index constraint picks one winner and the losers re-read its block.
    pub fn ensure_genesis(&self) -> Result<Block> {
        if let Some(genesis) = self.store.get_block(0)? {
            return Ok(genesis);
        }
        if let Some(head) = self.store.head()? {
            error!(head = head.index, "chain has blocks but no genesis");
            return Err(LedgerError::IntegrityViolation(IntegrityReport::new(vec![
                Violation::IndexGap {
                    position: 0,
                    expected: 0,
                    found: head.index,
                },
            ])));
        }

        let genesis = genesis_block()?;
        match self.store.append(&genesis) {
            Ok(()) => {
                info!(hash = %genesis.hash, nonce = genesis.nonce, "genesis block created");
                Ok(genesis)
            }
            Err(StoreError::Conflict { .. }) => {
                debug!("genesis was created concurrently, re-reading it");
                self.store
                    .get_block(0)?
                    .ok_or(LedgerError::AppendConflict { attempts: 1 })
            }
            Err(err) => {
                error!(error = %err, "failed to persist genesis block");
                Err(err.into())
            }
        }
    }

    /// Current chain head, bootstrapping genesis on an empty store.
    pub fn head(&self) -> Result<Block> {
        match self.store.head()? {
            Some(head) => Ok(head),
            None => self.ensure_genesis(),
        }
    }

    /// All blocks in index order; `[genesis]` on an empty store.
    pub fn fetch_chain(&self) -> Result<Vec<Block>> {
        let blocks = self.read_chain()?;
        if self.config.verify_on_read {
            check(&blocks)?;
        }
        Ok(blocks)
    }

    /// Run the integrity checker over the persisted chain and return the head index.
    /// An empty store is bootstrapped first, so a fresh ledger verifies at height 0.
    pub fn verify(&self) -> Result<u64> {
        let blocks = self.read_chain()?;
        check(&blocks)?;
        Ok(blocks.last().map_or(0, |head| head.index))
    }

    fn read_chain(&self) -> Result<Vec<Block>> {
        let mut blocks = self.store.blocks()?;
        if blocks.is_empty() {
            blocks.push(self.ensure_genesis()?);
        }
        Ok(blocks)
    }

    pub fn append(&self, payload: Value) -> Result<Block> {
        self.append_cancellable(payload, &CancelFlag::new())
    }

    /// Seal `payload` into the block after the current head and persist it, restarting from
    /// the head whenever a concurrent append wins the index.
    ///
    /// `cancel` is honoured while mining and once more right before the store write. A
    /// flag raised during the write itself is ignored: the block is persisted and returned.
    pub fn append_cancellable(&self, payload: Value, cancel: &CancelFlag) -> Result<Block> {
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                return Err(LedgerError::InvalidPayload(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let mut conflicts = 0u32;
        let mut state = AppendState::ReadHead;
        loop {
            state = match state {
                AppendState::ReadHead => AppendState::BuildCandidate(self.head()?),
                AppendState::BuildCandidate(head) => {
                    AppendState::Mine(build_candidate(payload.clone(), &head)?)
                }
                AppendState::Mine(candidate) => match mine::seal_cancellable(candidate, cancel) {
                    Some(block) => AppendState::Persist(block),
                    None => return Err(LedgerError::Cancelled),
                },
                AppendState::Persist(block) => {
                    if cancel.is_cancelled() {
                        return Err(LedgerError::Cancelled);
                    }
                    match self.store.append(&block) {
                        Ok(()) => AppendState::Done(block),
                        Err(StoreError::Conflict { index }) => {
                            conflicts += 1;
                            if conflicts > self.config.max_append_retries {
                                warn!(index, conflicts, "giving up on append");
                                return Err(LedgerError::AppendConflict {
                                    attempts: conflicts,
                                });
                            }
                            warn!(index, conflicts, "lost append race, retrying from head");
                            AppendState::ReadHead
                        }
                        Err(err) => {
                            error!(index = block.index, error = %err, "failed to persist block");
                            return Err(err.into());
                        }
                    }
                }
                AppendState::Done(block) => {
                    info!(
                        index = block.index,
                        nonce = block.nonce,
                        hash = %block.hash,
                        "block appended"
                    );
                    return Ok(block);
                }
            };
        }
    }
}

fn check(blocks: &[Block]) -> Result<()> {
    verify_chain(blocks).map_err(|report| {
        error!(%report, "chain integrity check failed");
        LedgerError::IntegrityViolation(report)
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
