//! Mine random transfers on a fresh chain.

use super::init::{load_genesis_key, GENESIS_KEY_FILE};
use super::StrategyArg;
use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use powchain_chain::{Blockchain, ChainConfig, ChainError, ChainEvent, MiningService, Submission};
use powchain_core::{Amount, Block, Keypair, PublicKey, Transaction};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

#[derive(Args)]
pub struct RunArgs {
    /// Config file written by `powchain init`
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transactions per block, when no config file is given
    #[arg(short, long, default_value = "4")]
    batch_capacity: usize,

    /// Leading hex zeros, when no config file is given
    #[arg(long, default_value = "2")]
    difficulty: u32,

    /// Nonce selection, when no config file is given
    #[arg(long, value_enum, default_value = "sequential")]
    strategy: StrategyArg,

    /// Number of transfers to submit
    #[arg(short = 'n', long, default_value = "8")]
    transactions: usize,

    /// Number of generated accounts
    #[arg(short, long, default_value = "4")]
    accounts: usize,

    /// Mine on a background worker instead of inline
    #[arg(long)]
    background: bool,
}

pub fn run(args: RunArgs) -> Result<()> {
    if args.accounts < 2 {
        bail!("At least two accounts are needed to generate transfers");
    }

    let (config, genesis_key) = resolve_config(&args)?;
    let capacity = config.batch_capacity;

    let mut accounts: Vec<PublicKey> = (0..args.accounts)
        .map(|_| Keypair::generate().public_key)
        .collect();
    if let Some(key) = genesis_key {
        accounts[0] = key.public_key;
    }

    let mut rng = rand::thread_rng();
    let transfers: Vec<Transaction> = (0..args.transactions)
        .map(|_| random_transfer(&mut rng, &accounts))
        .collect();

    println!("{}", "Starting powchain...".bold().cyan());
    println!(
        "  Batch capacity: {}   Difficulty: {}   Transfers: {}",
        capacity.to_string().bright_cyan(),
        config.difficulty.to_string().bright_cyan(),
        transfers.len().to_string().bright_cyan()
    );
    println!();

    if args.background {
        let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
        runtime.block_on(mine_in_background(config, transfers))
    } else {
        let chain = mine_inline(config, transfers)?;
        finish(&chain)
    }
}

/// Use the config file when given, otherwise build one from flags with a
/// fresh genesis owner.
fn resolve_config(args: &RunArgs) -> Result<(ChainConfig, Option<Keypair>)> {
    match &args.config {
        Some(path) => {
            let config = ChainConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config: {:?}", path))?;
            let key_path = path.with_file_name(GENESIS_KEY_FILE);
            let key = if key_path.exists() {
                Some(load_genesis_key(&key_path)?)
            } else {
                None
            };
            Ok((config, key))
        }
        None => {
            let owner = Keypair::generate();
            let config = ChainConfig::new(
                args.batch_capacity,
                args.difficulty,
                owner.public_key,
                Amount::from_units(50)?,
            )
            .with_nonce_strategy(args.strategy.into());
            config.validate().context("Invalid chain parameters")?;
            Ok((config, Some(owner)))
        }
    }
}

/// A transfer of up to five units between two distinct accounts.
fn random_transfer<R: Rng>(rng: &mut R, accounts: &[PublicKey]) -> Transaction {
    let mut pair = accounts.choose_multiple(rng, 2);
    let sender = *pair.next().unwrap_or(&accounts[0]);
    let recipient = *pair.next().unwrap_or(&accounts[1]);
    let amount = Amount::from_minor(rng.gen_range(1..=5 * Amount::UNIT));
    Transaction::transfer(amount, sender, recipient)
}

fn mine_inline(config: ChainConfig, transfers: Vec<Transaction>) -> Result<Blockchain> {
    let mut chain = Blockchain::new(config).context("Failed to build chain")?;
    print_block(0, chain.genesis());

    for tx in transfers {
        if let Submission::Sealed(_) = chain.submit_transaction(tx)? {
            print_block(chain.height(), chain.latest_block());
        }
    }
    Ok(chain)
}

async fn mine_in_background(config: ChainConfig, transfers: Vec<Transaction>) -> Result<()> {
    let capacity = config.batch_capacity;
    let target = (transfers.len() / capacity) as u64;

    let service = MiningService::start(config)
        .await
        .context("Failed to build chain")?;
    let mut events = service.subscribe();
    service.with_chain(|chain| print_block(0, chain.genesis()));

    let mut height = 0;
    for tx in transfers {
        loop {
            match service.submit_transaction(tx.clone()) {
                Ok(_) => break,
                Err(ChainError::SealingInProgress) => {
                    height = wait_for_seal(&service, &mut events).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    while height < target {
        height = wait_for_seal(&service, &mut events).await?;
    }
    service.shutdown();

    service.with_chain(finish)
}

/// Wait for the next sealed block, print it and return its height.
async fn wait_for_seal(
    service: &MiningService,
    events: &mut tokio::sync::broadcast::Receiver<ChainEvent>,
) -> Result<u64> {
    loop {
        match events.recv().await {
            Ok(ChainEvent::BlockSealed { height, .. }) => {
                service.with_chain(|chain| {
                    if let Some(block) = chain.get_block_by_height(height) {
                        print_block(height, block);
                    }
                });
                return Ok(height);
            }
            Ok(ChainEvent::MiningStopped { reason }) => bail!("Mining stopped: {}", reason),
            Ok(ChainEvent::NonceFound { .. }) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event receiver lagged");
            }
            Err(RecvError::Closed) => bail!("Mining service closed"),
        }
    }
}

fn finish(chain: &Blockchain) -> Result<()> {
    chain.validate().context("Chain failed validation")?;

    let stats = chain.stats();
    println!();
    println!("{}  Chain valid", "✓".green().bold());
    println!("    Height: {}", stats.height.to_string().bright_cyan());
    println!("    Head: {}", stats.latest_block_hash.to_hex().bright_yellow());
    println!(
        "    Pending: {} ({})",
        stats.pending_transactions.to_string().bright_cyan(),
        stats.open_state
    );
    Ok(())
}

fn print_block(height: u64, block: &Block) {
    let digest = block
        .hash()
        .map(|h| h.to_hex())
        .unwrap_or_else(|| "-".to_string());
    let root = block
        .merkle_root()
        .map(|h| h.to_hex())
        .unwrap_or_else(|| "-".to_string());

    println!("{} #{}", "Block".bold(), height.to_string().bright_cyan());
    println!("  Hash:        {}", digest.bright_yellow());
    println!("  Previous:    {}", block.previous_digest().to_hex().bright_black());
    println!("  Merkle root: {}", root.bright_black());
    println!("  Timestamp:   {}", block.header().timestamp);
    println!("  Nonce:       {}", block.nonce());
    for tx in block.transactions() {
        let sender = tx
            .sender()
            .map(|s| s.to_hex())
            .unwrap_or_else(|| "issuance".to_string());
        println!(
            "    {} {} → {}",
            tx.amount().to_string().green(),
            sender.bright_black(),
            tx.recipient().to_hex().bright_black()
        );
    }
    println!();
}
