//! Chain configuration.

use powchain_core::{validate_leaf_count, Amount, MerkleError, NonceStrategy, PublicKey, MAX_DIFFICULTY};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors in the chain configuration. Fatal: reported once, at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid batch capacity: {0}")]
    BatchCapacity(#[from] MerkleError),

    #[error("difficulty {got} out of range (maximum {max})")]
    Difficulty { got: u32, max: u32 },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Chain configuration. Immutable once the chain is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Transactions aggregated per block. Power of two.
    pub batch_capacity: usize,
    /// Required leading hex `'0'` characters in a block digest.
    pub difficulty: u32,
    /// Receiver of the genesis issuance transaction.
    pub genesis_recipient: PublicKey,
    /// Amount issued by the genesis block. A decimal string in JSON.
    pub genesis_amount: Amount,
    /// Nonce selection for the mining loop.
    #[serde(default)]
    pub nonce_strategy: NonceStrategy,
}

impl ChainConfig {
    /// Create a configuration with the sequential nonce strategy.
    pub fn new(
        batch_capacity: usize,
        difficulty: u32,
        genesis_recipient: PublicKey,
        genesis_amount: Amount,
    ) -> Self {
        Self {
            batch_capacity,
            difficulty,
            genesis_recipient,
            genesis_amount,
            nonce_strategy: NonceStrategy::default(),
        }
    }

    pub fn with_nonce_strategy(mut self, strategy: NonceStrategy) -> Self {
        self.nonce_strategy = strategy;
        self
    }

    /// Check the batch capacity and difficulty.
    ///
    /// Capacity must be a power of two (so the merkle tree never sees an odd
    /// level) and difficulty at most [`MAX_DIFFICULTY`]. Zero difficulty is
    /// allowed and mines every block on its first attempt.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_leaf_count(self.batch_capacity)?;
        if self.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::Difficulty {
                got: self.difficulty,
                max: MAX_DIFFICULTY,
            });
        }
        Ok(())
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    pub fn write_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
