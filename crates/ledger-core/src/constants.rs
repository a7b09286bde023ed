/// Every sealed hash must start with this many hex zeros. Fixed for the lifetime of a chain.
pub const DIFFICULTY_PREFIX: &str = "000";

pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_TIMESTAMP: u64 = 0;
pub const GENESIS_TICKET: &str = "GENESIS_BLOCK";
pub const GENESIS_TOURIST: &str = "System Genesis";

pub const TICKET_ID_KEY: &str = "ticketId";
pub const TICKET_PREFIX: &str = "TKT";
pub const TICKET_SUFFIX_MODULUS: u64 = 10_000;

pub const DEFAULT_APPEND_RETRIES: u32 = 8;

/// Nonces tried between two looks at a cancel flag.
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;
