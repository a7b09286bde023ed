use crate::constants::{
    DEFAULT_DATA_DIR, DEFAULT_LISTEN, DEFAULT_MAX_PENDING_APPENDS,
};
use crate::logging::LogFormat;
use clap::Parser;
use ledger_core::{constants::DEFAULT_APPEND_RETRIES, ChainConfig};
use std::{num::NonZeroUsize, thread, time::Duration};

/// Proof-of-work record ledger node.
#[derive(Parser, Debug, Clone)]
#[command(name = "ledger-node", version)]
pub struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, env = "LEDGER_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// Data directory for sled
    #[arg(long, env = "LEDGER_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// Threads dedicated to mining (defaults to available parallelism)
    #[arg(long, env = "LEDGER_MINING_THREADS")]
    pub mining_threads: Option<usize>,

    /// Appends allowed to be queued or mining at the same time
    #[arg(long, env = "LEDGER_MAX_PENDING_APPENDS", default_value_t = DEFAULT_MAX_PENDING_APPENDS)]
    pub max_pending_appends: usize,

    /// Restarts allowed after losing a persistence race
    #[arg(long, env = "LEDGER_APPEND_RETRIES", default_value_t = DEFAULT_APPEND_RETRIES)]
    pub append_retries: u32,

    /// Give up on a single mining job after this many seconds
    #[arg(long, env = "LEDGER_MINING_TIMEOUT_SECS")]
    pub mining_timeout_secs: Option<u64>,

    /// Verify the whole chain on every fetch
    #[arg(long, env = "LEDGER_VERIFY_ON_READ")]
    pub verify_on_read: bool,

    #[arg(long, env = "LEDGER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Args {
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            max_append_retries: self.append_retries,
            verify_on_read: self.verify_on_read,
        }
    }

    pub fn mining_threads(&self) -> usize {
        self.mining_threads.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }

    pub fn mining_timeout(&self) -> Option<Duration> {
        self.mining_timeout_secs.map(Duration::from_secs)
    }
}
