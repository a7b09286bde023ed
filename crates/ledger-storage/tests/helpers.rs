#![allow(dead_code)]

use std::fs;

use ledger_core::{Block, Payload};
use ledger_storage::SledStore;
use serde_json::json;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(&db_path).expect("Failed to open SledStore"),
    )
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    // Verify the directory is removed
    assert!(!db_path.exists(), "Database directory should be removed");
}

/// An unmined block with a unique, well-formed hash. The store does not check work or links.
pub fn fake_block(index: u64, previous_hash: &str) -> Block {
    let mut payload = Payload::new();
    payload.insert("amount".into(), json!(index * 10));
    Block {
        index,
        timestamp: 1_600_000_000_000 + index,
        payload,
        previous_hash: previous_hash.to_string(),
        nonce: index,
        hash: format!("000{index:061x}"),
    }
}

pub fn fake_chain(len: u64) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    for i in 0..len {
        let prev = blocks.last().map(|b| b.hash.clone()).unwrap_or_else(|| "0".into());
        blocks.push(fake_block(i, &prev));
    }
    blocks
}
