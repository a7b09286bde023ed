use crate::{constants::CANCEL_CHECK_INTERVAL, pow::meets_difficulty, Block, UnsealedBlock};
use sha2::{Digest, Sha256};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::debug;

/// Shared switch telling an in-flight nonce search to give up.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Seal `candidate` by counting nonces up from zero until the hash carries the difficulty
/// prefix. Unbounded in the worst case; expected work is 16^prefix-length attempts.
pub fn seal(candidate: UnsealedBlock) -> Block {
    let base = candidate.hasher();
    let mut nonce = 0u64;
    loop {
        if let Some(hash) = attempt(&base, nonce) {
            return finish(candidate, nonce, hash);
        }
        nonce = nonce.wrapping_add(1);
    }
}

/// Like [`seal`], but returns `None` once `cancel` is raised. Nothing about the search is
/// visible to the caller in that case.
pub fn seal_cancellable(candidate: UnsealedBlock, cancel: &CancelFlag) -> Option<Block> {
    let base = candidate.hasher();
    let mut nonce = 0u64;
    loop {
        if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            debug!(index = candidate.index(), tried = nonce, "mining abandoned");
            return None;
        }
        if let Some(hash) = attempt(&base, nonce) {
            return Some(finish(candidate, nonce, hash));
        }
        nonce = nonce.wrapping_add(1);
    }
}

fn attempt(base: &Sha256, nonce: u64) -> Option<String> {
    let mut hasher = base.clone();
    hasher.update(nonce.to_string().as_bytes());
    let hash = hex::encode(hasher.finalize());
    meets_difficulty(&hash).then_some(hash)
}

fn finish(candidate: UnsealedBlock, nonce: u64, hash: String) -> Block {
    debug!(index = candidate.index(), nonce, %hash, "sealed block");
    candidate.into_block(nonce, hash)
}
