//! Main chain state machine.
//!
//! The chain owns every sealed block plus the single open block. Submitting
//! a transaction that fills the open block seals it (fixes the merkle root),
//! runs the nonce search, appends the sealed block and opens the next one:
//!
//! ```text
//!   OPEN --batch full--> SEALING --nonce found--> SEALED, new OPEN
//! ```
//!
//! All mutation goes through `&mut self`, so a `Blockchain` has exactly one
//! writer; [`crate::MiningService`] shares one behind a mutex.

use crate::config::{ChainConfig, ConfigError};
use crate::validator::{ChainValidator, ValidationError};
use powchain_core::{
    meets_difficulty, Amount, AmountError, Block, BlockError, BlockState, EncodingError, Hash,
    Miner, MiningError, PublicKey, Solution, Transaction,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("block state error: {0}")]
    Block(#[from] BlockError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("mining error: {0}")]
    Mining(#[from] MiningError),

    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("batch full and sealing in progress, retry later")]
    SealingInProgress,

    #[error("only the genesis issuance may omit a sender")]
    MissingSender,

    #[error("solution digest does not meet difficulty {difficulty}")]
    InsufficientWork { difficulty: u32 },

    #[error("mining worker failed: {0}")]
    WorkerFailed(String),
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Outcome of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Added to the open block, which now holds `pending` transactions.
    Accepted { pending: usize },
    /// Filled the open block, which was mined and sealed with this digest.
    Sealed(Hash),
    /// Filled the open block, which is sealed but not yet mined: a
    /// background worker is searching, or a cancelled search awaits resume.
    Sealing,
    /// Held for the next block while the current one is being mined.
    Queued { position: usize },
}

/// The chain: sealed blocks, the open block and the miner.
pub struct Blockchain {
    /// Configuration.
    config: ChainConfig,
    /// Nonce search configured from `config`.
    miner: Miner,
    /// Sealed blocks, genesis first. Append-only.
    sealed: Vec<Block>,
    /// Digest -> height.
    index: HashMap<Hash, usize>,
    /// The block currently accepting transactions (or being mined).
    open: Block,
    /// Raised to stop an in-progress nonce search.
    cancel: Arc<AtomicBool>,
}

impl Blockchain {
    /// Validate `config`, then build, seal and mine the genesis block.
    pub fn new(config: ChainConfig) -> Result<Self> {
        Self::with_cancel(config, Arc::new(AtomicBool::new(false)))
    }

    /// Like [`Blockchain::new`], but every nonce search, genesis included,
    /// stops once `cancel` is raised. A cancelled genesis search returns
    /// `Mining(Cancelled)` and no chain.
    pub fn with_cancel(config: ChainConfig, cancel: Arc<AtomicBool>) -> Result<Self> {
        config.validate()?;

        let issuance = Transaction::issuance(config.genesis_recipient, config.genesis_amount);
        let miner = Miner::new(config.difficulty, config.nonce_strategy);

        let mut chain = Self {
            config,
            miner,
            sealed: Vec::new(),
            index: HashMap::new(),
            open: Block::genesis(issuance),
            cancel,
        };

        chain.begin_seal()?;
        let digest = chain.mine_open()?;
        tracing::info!(
            genesis = %digest,
            recipient = %chain.config.genesis_recipient,
            amount = %chain.config.genesis_amount,
            "chain initialized"
        );

        Ok(chain)
    }

    /// Get the configuration.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn miner(&self) -> Miner {
        self.miner
    }

    /// Height of the latest sealed block (genesis is 0).
    pub fn height(&self) -> u64 {
        (self.sealed.len() - 1) as u64
    }

    /// The genesis block.
    pub fn genesis(&self) -> &Block {
        &self.sealed[0]
    }

    /// Get the latest sealed block.
    pub fn latest_block(&self) -> &Block {
        &self.sealed[self.sealed.len() - 1]
    }

    pub fn sealed_blocks(&self) -> &[Block] {
        &self.sealed
    }

    pub fn open_block(&self) -> &Block {
        &self.open
    }

    /// State of the open block.
    pub fn state(&self) -> BlockState {
        self.open.state()
    }

    /// Get a sealed block by digest.
    pub fn get_block(&self, digest: &Hash) -> Option<&Block> {
        self.index.get(digest).map(|&height| &self.sealed[height])
    }

    /// Get a sealed block by height.
    pub fn get_block_by_height(&self, height: u64) -> Option<&Block> {
        self.sealed.get(height as usize)
    }

    /// Flag that stops an in-progress nonce search at its next attempt.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Submit a transaction, mining synchronously if it fills the open block.
    ///
    /// If the nonce search is cancelled the transaction stays in the sealing
    /// block and `Sealing` is returned; [`Blockchain::resume_mining`] finishes
    /// it.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<Submission> {
        let pending = self.accept_transaction(tx)?;
        if !self.open.is_full() {
            return Ok(Submission::Accepted { pending });
        }

        self.begin_seal()?;
        match self.mine_open() {
            Ok(digest) => Ok(Submission::Sealed(digest)),
            Err(ChainError::Mining(MiningError::Cancelled { attempts })) => {
                tracing::debug!(attempts, "nonce search cancelled, block left sealing");
                Ok(Submission::Sealing)
            }
            Err(e) => Err(e),
        }
    }

    /// Parse `amount` as a decimal and submit a transfer.
    pub fn submit_transfer(
        &mut self,
        amount: &str,
        sender: PublicKey,
        recipient: PublicKey,
    ) -> Result<Submission> {
        let amount: Amount = amount.parse()?;
        self.submit_transaction(Transaction::transfer(amount, sender, recipient))
    }

    /// Resume a nonce search that was cancelled.
    pub fn resume_mining(&mut self) -> Result<Hash> {
        let state = self.open.state();
        if state != BlockState::Sealing {
            return Err(BlockError::NotSealing(state).into());
        }
        self.cancel.store(false, Ordering::Relaxed);
        self.mine_open()
    }

    /// Append `tx` to the open block without sealing it.
    pub(crate) fn accept_transaction(&mut self, tx: Transaction) -> Result<usize> {
        if tx.is_issuance() {
            return Err(ChainError::MissingSender);
        }
        if self.open.state() != BlockState::Open {
            return Err(ChainError::SealingInProgress);
        }
        Ok(self.open.accept(tx)?)
    }

    /// Compute the merkle root and move the full open block to sealing.
    pub(crate) fn begin_seal(&mut self) -> Result<Hash> {
        let root = self.open.compute_merkle_root()?;
        self.open.seal(root)?;
        tracing::debug!(
            merkle_root = %root,
            transactions = self.open.tx_count(),
            "block sealing"
        );
        Ok(root)
    }

    /// A copy of the block being mined, if any.
    pub(crate) fn pending_seal(&self) -> Option<Block> {
        (self.open.state() == BlockState::Sealing).then(|| self.open.clone())
    }

    fn mine_open(&mut self) -> Result<Hash> {
        let solution = self.miner.mine(&self.open, &self.cancel)?;
        self.commit_seal(solution)
    }

    /// Apply a mining solution to the sealing block, append it and open the
    /// next block on top of it.
    pub(crate) fn commit_seal(&mut self, solution: Solution) -> Result<Hash> {
        if !meets_difficulty(&solution.digest, self.config.difficulty) {
            return Err(ChainError::InsufficientWork {
                difficulty: self.config.difficulty,
            });
        }
        self.open.finalize(solution.nonce, solution.digest)?;

        let next = Block::new(solution.digest, self.config.batch_capacity);
        let sealed = std::mem::replace(&mut self.open, next);
        let height = self.sealed.len();

        let header = sealed.header();
        tracing::info!(
            height,
            digest = %solution.digest,
            previous_digest = %header.previous_digest,
            timestamp = header.timestamp,
            merkle_root = ?header.merkle_root,
            nonce = header.nonce,
            transactions = sealed.tx_count(),
            attempts = solution.attempts,
            "block sealed"
        );

        self.index.insert(solution.digest, height);
        self.sealed.push(sealed);
        Ok(solution.digest)
    }

    /// Check every sealed block's linkage, merkle root and proof of work.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        ChainValidator::validate_chain(self)
    }

    /// Get chain statistics.
    pub fn stats(&self) -> ChainStats {
        let latest = self.latest_block();
        ChainStats {
            height: self.height(),
            latest_block_hash: latest.hash().unwrap_or_default(),
            latest_timestamp: latest.header().timestamp,
            pending_transactions: self.open.tx_count(),
            open_state: self.open.state(),
            difficulty: self.config.difficulty,
        }
    }
}

/// Chain statistics.
#[derive(Debug, Clone)]
pub struct ChainStats {
    /// Current chain height.
    pub height: u64,
    /// Hash of the latest block.
    pub latest_block_hash: Hash,
    /// Timestamp of the latest block.
    pub latest_timestamp: u64,
    /// Transactions in the open block.
    pub pending_transactions: usize,
    /// State of the open block.
    pub open_state: BlockState,
    /// Required leading hex zeros.
    pub difficulty: u32,
}
