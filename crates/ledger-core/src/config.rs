use crate::constants::DEFAULT_APPEND_RETRIES;
use serde::Deserialize;

/// Tuning for a [`crate::chain::Chain`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// How many times an append may restart after losing a persistence race.
    pub max_append_retries: u32,

    /// Run the integrity checker over every chain fetch.
    pub verify_on_read: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_append_retries: DEFAULT_APPEND_RETRIES,
            verify_on_read: false,
        }
    }
}
