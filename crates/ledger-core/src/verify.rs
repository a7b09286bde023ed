//! Whole-chain integrity checking.
//!
//! [`verify_chain`] walks an index-ordered snapshot once and reports every broken
//! invariant it finds: contiguous indices from zero, the genesis sentinel link, hash links
//! between neighbours, hashes that match their content, the difficulty prefix, and
//! chain-wide hash uniqueness.

use crate::{constants::GENESIS_PREVIOUS_HASH, pow::meets_difficulty, Block};
use serde::Serialize;
use std::{collections::HashSet, fmt};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    #[error("chain has no blocks")]
    EmptyChain,

    #[error("position {position} holds index {found}, expected {expected}")]
    IndexGap {
        position: usize,
        expected: u64,
        found: u64,
    },

    #[error("genesis previousHash is {found:?}, expected \"0\"")]
    BadGenesisLink { found: String },

    #[error("block {index} links to {found}, expected {expected}")]
    BrokenLink {
        index: u64,
        expected: String,
        found: String,
    },

    #[error("block {index} stores hash {stored} but its content hashes to {computed}")]
    HashMismatch {
        index: u64,
        stored: String,
        computed: String,
    },

    #[error("block {index} content cannot be canonically encoded")]
    Unencodable { index: u64 },

    #[error("block {index} hash {hash} lacks the difficulty prefix")]
    InsufficientWork { index: u64, hash: String },

    #[error("block {index} repeats hash {hash}")]
    DuplicateHash { index: u64, hash: String },
}

/// Every violation found in one pass, in chain order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    violations: Vec<Violation>,
}

impl IntegrityReport {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn first(&self) -> Option<&Violation> {
        self.violations.first()
    }

    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s)", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "; {violation}")?;
        }
        Ok(())
    }
}

pub fn verify_chain(blocks: &[Block]) -> Result<(), IntegrityReport> {
    if blocks.is_empty() {
        return Err(IntegrityReport::new(vec![Violation::EmptyChain]));
    }

    let mut violations = Vec::new();
    let mut seen = HashSet::with_capacity(blocks.len());

    for (position, block) in blocks.iter().enumerate() {
        let expected = position as u64;
        if block.index != expected {
            violations.push(Violation::IndexGap {
                position,
                expected,
                found: block.index,
            });
        }

        match position.checked_sub(1).map(|prev| &blocks[prev]) {
            None if block.previous_hash != GENESIS_PREVIOUS_HASH => {
                violations.push(Violation::BadGenesisLink {
                    found: block.previous_hash.clone(),
                });
            }
            Some(prev) if block.previous_hash != prev.hash => {
                violations.push(Violation::BrokenLink {
                    index: block.index,
                    expected: prev.hash.clone(),
                    found: block.previous_hash.clone(),
                });
            }
            _ => {}
        }

        match block.compute_hash() {
            Ok(computed) if computed != block.hash => violations.push(Violation::HashMismatch {
                index: block.index,
                stored: block.hash.clone(),
                computed,
            }),
            Ok(_) => {}
            Err(_) => violations.push(Violation::Unencodable { index: block.index }),
        }

        if !meets_difficulty(&block.hash) {
            violations.push(Violation::InsufficientWork {
                index: block.index,
                hash: block.hash.clone(),
            });
        }

        if !seen.insert(block.hash.as_str()) {
            violations.push(Violation::DuplicateHash {
                index: block.index,
                hash: block.hash.clone(),
            });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(IntegrityReport::new(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chain, mine, Payload};
    use serde_json::json;

    fn sealed_chain(len: u64) -> Vec<Block> {
        let mut blocks = vec![chain::genesis_block().unwrap()];
        for i in 1..len {
            let mut payload = Payload::new();
            payload.insert("amount".into(), json!(i));
            let head = blocks.last().unwrap();
            let candidate = chain::build_candidate(payload, head).unwrap();
            blocks.push(mine::seal(candidate));
        }
        blocks
    }

    #[test]
    fn sealed_chain_is_valid() {
        assert_eq!(verify_chain(&sealed_chain(4)), Ok(()));
    }

    #[test]
    fn empty_chain_is_invalid() {
        let report = verify_chain(&[]).unwrap_err();
        assert_eq!(report.violations(), &[Violation::EmptyChain]);
    }

    #[test]
    fn tampered_payload_is_flagged() {
        let mut blocks = sealed_chain(3);
        blocks[1].payload.insert("amount".into(), json!(500));
        let report = verify_chain(&blocks).unwrap_err();
        assert!(matches!(
            report.first(),
            Some(Violation::HashMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn tampered_nonce_is_flagged() {
        let mut blocks = sealed_chain(2);
        let stored = blocks[1].hash.clone();
        blocks[1].nonce += 1;
        assert_ne!(blocks[1].compute_hash().unwrap(), stored);
        assert!(verify_chain(&blocks).is_err());
    }

    #[test]
    fn tampered_link_is_flagged() {
        let mut blocks = sealed_chain(3);
        blocks[2].previous_hash = blocks[0].hash.clone();
        let report = verify_chain(&blocks).unwrap_err();
        assert!(report
            .violations()
            .iter()
            .any(|v| matches!(v, Violation::BrokenLink { index: 2, .. })));
        assert!(report
            .violations()
            .iter()
            .any(|v| matches!(v, Violation::HashMismatch { index: 2, .. })));
    }

    #[test]
    fn rehashed_forgery_breaks_the_next_link() {
        let mut blocks = sealed_chain(3);
        blocks[1].payload.insert("amount".into(), json!(500));
        let forged = mine::seal(
            crate::UnsealedBlock::new(
                blocks[1].index,
                blocks[1].timestamp,
                blocks[1].payload.clone(),
                blocks[1].previous_hash.clone(),
            )
            .unwrap(),
        );
        blocks[1] = forged;
        let report = verify_chain(&blocks).unwrap_err();
        assert_eq!(report.violations().len(), 1);
        assert!(matches!(
            report.first(),
            Some(Violation::BrokenLink { index: 2, .. })
        ));
    }

    #[test]
    fn missing_block_is_an_index_gap() {
        let mut blocks = sealed_chain(4);
        blocks.remove(2);
        let report = verify_chain(&blocks).unwrap_err();
        assert!(report.violations().contains(&Violation::IndexGap {
            position: 2,
            expected: 2,
            found: 3,
        }));
    }

    #[test]
    fn genesis_sentinel_is_enforced() {
        let mut blocks = sealed_chain(1);
        blocks[0].previous_hash = "ff".into();
        let report = verify_chain(&blocks).unwrap_err();
        assert!(report.violations().contains(&Violation::BadGenesisLink {
            found: "ff".into()
        }));
    }

    #[test]
    fn unmined_hash_is_flagged() {
        let mut blocks = sealed_chain(2);
        let candidate = crate::UnsealedBlock::new(
            blocks[1].index,
            blocks[1].timestamp,
            blocks[1].payload.clone(),
            blocks[1].previous_hash.clone(),
        )
        .unwrap();
        let nonce = (0..)
            .find(|n| !meets_difficulty(&candidate.hash_with_nonce(*n)))
            .unwrap();
        blocks[1].nonce = nonce;
        blocks[1].hash = candidate.hash_with_nonce(nonce);
        let report = verify_chain(&blocks).unwrap_err();
        assert!(matches!(
            report.first(),
            Some(Violation::InsufficientWork { index: 1, .. })
        ));
    }

    #[test]
    fn duplicate_hash_is_flagged() {
        let mut blocks = sealed_chain(2);
        let copy = blocks[1].clone();
        blocks.push(Block { index: 2, ..copy });
        let report = verify_chain(&blocks).unwrap_err();
        assert!(report
            .violations()
            .iter()
            .any(|v| matches!(v, Violation::DuplicateHash { index: 2, .. })));
    }

    #[test]
    fn report_display_lists_violations() {
        let report = IntegrityReport::new(vec![Violation::EmptyChain]);
        assert_eq!(report.to_string(), "1 violation(s); chain has no blocks");
    }
}
