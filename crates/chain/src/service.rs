//! Background mining.
//!
//! [`MiningService`] keeps a [`Blockchain`] behind a mutex and runs the nonce
//! search on a blocking worker thread, so submissions return immediately.
//! While a block is being mined, new transactions queue for the next block
//! (at most one batch); once the seal commits they are moved into the new
//! open block, which may trigger the next seal straight away.

use crate::blockchain::{Blockchain, ChainError, Result, Submission};
use crate::config::ChainConfig;
use powchain_core::{BlockHeader, BlockState, Hash, MiningError, Transaction};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::broadcast;

/// Capacity of the event channel. Slow subscribers see `Lagged`.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events published by the mining worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// A nonce search succeeded.
    NonceFound { nonce: u64, digest: Hash },
    /// A block was appended to the chain.
    BlockSealed {
        height: u64,
        digest: Hash,
        header: BlockHeader,
    },
    /// A nonce search stopped without a result.
    MiningStopped { reason: String },
}

struct ServiceState {
    chain: Blockchain,
    queue: VecDeque<Transaction>,
    worker_running: bool,
}

struct Shared {
    state: Mutex<ServiceState>,
    events: broadcast::Sender<ChainEvent>,
    runtime: Handle,
    /// Shared with the chain. Written only under `state`'s lock once the
    /// service is running.
    cancel: Arc<AtomicBool>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: ChainEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// A chain whose blocks are mined off the submission path.
#[derive(Clone)]
pub struct MiningService {
    shared: Arc<Shared>,
}

impl MiningService {
    /// Build the chain (mining genesis on a blocking thread) and start the
    /// service on the current tokio runtime.
    pub async fn start(config: ChainConfig) -> Result<Self> {
        Self::start_with_cancel(config, Arc::new(AtomicBool::new(false))).await
    }

    /// Like [`MiningService::start`], with a caller-owned stop flag. Raising
    /// it while genesis is mined makes this return `Mining(Cancelled)`;
    /// afterwards it is the flag [`MiningService::shutdown`] raises.
    pub async fn start_with_cancel(config: ChainConfig, cancel: Arc<AtomicBool>) -> Result<Self> {
        let chain_cancel = Arc::clone(&cancel);
        let chain =
            tokio::task::spawn_blocking(move || Blockchain::with_cancel(config, chain_cancel))
                .await
                .map_err(|e| ChainError::WorkerFailed(e.to_string()))??;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ServiceState {
                    chain,
                    queue: VecDeque::new(),
                    worker_running: false,
                }),
                events,
                runtime: Handle::current(),
                cancel,
            }),
        })
    }

    /// Subscribe to mining events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.shared.events.subscribe()
    }

    /// Submit a transaction.
    ///
    /// Returns `Accepted` or `Sealing` when it went into the open block,
    /// `Queued` when a seal is in progress, and `SealingInProgress` when the
    /// next batch is already queued in full.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Submission> {
        if tx.is_issuance() {
            return Err(ChainError::MissingSender);
        }

        let mut state = self.shared.lock();
        if state.chain.state() == BlockState::Sealing {
            let capacity = state.chain.config().batch_capacity;
            if state.queue.len() >= capacity {
                return Err(ChainError::SealingInProgress);
            }
            state.queue.push_back(tx);
            return Ok(Submission::Queued {
                position: state.queue.len(),
            });
        }

        let pending = state.chain.accept_transaction(tx)?;
        if !state.chain.open_block().is_full() {
            return Ok(Submission::Accepted { pending });
        }

        state.chain.begin_seal()?;
        self.spawn_worker(&mut state);
        Ok(Submission::Sealing)
    }

    /// Read the chain under the lock.
    pub fn with_chain<R>(&self, f: impl FnOnce(&Blockchain) -> R) -> R {
        f(&self.shared.lock().chain)
    }

    /// Number of transactions waiting for the next block.
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_mining(&self) -> bool {
        self.shared.lock().worker_running
    }

    /// Clear the stop flag and restart a cancelled nonce search.
    ///
    /// A worker that is still running keeps going: it re-checks the flag
    /// under the lock before giving up.
    pub fn resume(&self) {
        let mut state = self.shared.lock();
        self.shared.cancel.store(false, Ordering::Relaxed);
        if state.worker_running || state.chain.state() != BlockState::Sealing {
            return;
        }
        self.spawn_worker(&mut state);
    }

    /// Stop any in-progress nonce search at its next attempt.
    pub fn shutdown(&self) {
        let state = self.shared.lock();
        self.shared.cancel.store(true, Ordering::Relaxed);
        tracing::info!(queued = state.queue.len(), "mining service shutting down");
    }

    fn spawn_worker(&self, state: &mut ServiceState) {
        if state.worker_running {
            return;
        }
        state.worker_running = true;
        let shared = Arc::clone(&self.shared);
        self.shared
            .runtime
            .spawn_blocking(move || mine_until_open(&shared));
    }
}

/// Mine sealing blocks until the open block is accepting transactions again.
fn mine_until_open(shared: &Shared) {
    loop {
        let (block, miner) = {
            let mut state = shared.lock();
            match state.chain.pending_seal() {
                Some(block) => (block, state.chain.miner()),
                None => {
                    state.worker_running = false;
                    return;
                }
            }
        };

        let solution = match miner.mine(&block, &shared.cancel) {
            Ok(solution) => solution,
            Err(e) => {
                let mut state = shared.lock();
                if matches!(e, MiningError::Cancelled { .. })
                    && !shared.cancel.load(Ordering::Relaxed)
                {
                    // Resumed between the cancel and this check.
                    continue;
                }
                tracing::warn!(error = %e, "nonce search stopped");
                state.worker_running = false;
                drop(state);
                shared.publish(ChainEvent::MiningStopped {
                    reason: e.to_string(),
                });
                return;
            }
        };
        shared.publish(ChainEvent::NonceFound {
            nonce: solution.nonce,
            digest: solution.digest,
        });

        let mut state = shared.lock();
        let committed = state.chain.commit_seal(solution);
        let digest = match committed {
            Ok(digest) => digest,
            Err(e) => {
                tracing::error!(error = %e, "failed to commit mined block");
                state.worker_running = false;
                drop(state);
                shared.publish(ChainEvent::MiningStopped {
                    reason: e.to_string(),
                });
                return;
            }
        };
        let sealed = state.chain.latest_block();
        let event = ChainEvent::BlockSealed {
            height: state.chain.height(),
            digest,
            header: sealed.header().clone(),
        };

        if let Err(e) = drain_queue(&mut state) {
            tracing::error!(error = %e, "failed to move queued transactions into the open block");
        }
        drop(state);
        shared.publish(event);
    }
}

/// Move queued transactions into the freshly opened block, sealing it again
/// if the queue filled it.
fn drain_queue(state: &mut ServiceState) -> Result<()> {
    while !state.chain.open_block().is_full() {
        let Some(tx) = state.queue.pop_front() else {
            break;
        };
        state.chain.accept_transaction(tx)?;
    }
    if state.chain.open_block().is_full() {
        state.chain.begin_seal()?;
    }
    Ok(())
}
