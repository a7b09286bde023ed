//! Error types for ledger operations.

use crate::chain::StoreError;
use crate::verify::IntegrityReport;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The backing store could not be reached or returned unreadable data.
    #[error("chain store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Every attempt lost the race to persist at the next index.
    #[error("append lost {attempts} persistence races in a row")]
    AppendConflict { attempts: u32 },

    /// Rejected before any mining work started.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The persisted chain breaks at least one invariant. Never repaired automatically.
    #[error("chain integrity violated: {0}")]
    IntegrityViolation(IntegrityReport),

    #[error("mining was cancelled before the block was sealed")]
    Cancelled,
}
