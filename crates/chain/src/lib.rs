//! Chain orchestration for powchain.
//!
//! This crate turns the core primitives into a running ledger:
//! - **Config**: batch capacity, difficulty and genesis issuance
//! - **Blockchain**: the open → sealing → sealed state machine
//! - **Validator**: structural checks over sealed blocks
//! - **Service**: background mining with queued submissions
//!
//! # Example
//!
//! ```rust,no_run
//! use powchain_chain::{Blockchain, ChainConfig};
//! use powchain_core::{Amount, Keypair, Transaction};
//!
//! let genesis_owner = Keypair::generate();
//! let config = ChainConfig::new(2, 1, genesis_owner.public_key, Amount::from_units(50).unwrap());
//! let mut chain = Blockchain::new(config).unwrap();
//!
//! let bob = Keypair::generate().public_key;
//! let tx = Transaction::transfer(Amount::from_units(1).unwrap(), genesis_owner.public_key, bob);
//! chain.submit_transaction(tx.clone()).unwrap();
//! chain.submit_transaction(tx).unwrap(); // fills the batch, mines block 1
//!
//! assert_eq!(chain.height(), 1);
//! ```

pub mod blockchain;
pub mod config;
pub mod service;
pub mod validator;

// Re-export commonly used types
pub use blockchain::{Blockchain, ChainError, ChainStats, Submission};
pub use config::{ChainConfig, ConfigError};
pub use service::{ChainEvent, MiningService};
pub use validator::{ChainValidator, ValidationError};
