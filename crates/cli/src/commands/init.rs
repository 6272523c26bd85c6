//! Initialize chain command.

use super::StrategyArg;
use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use powchain_chain::ChainConfig;
use powchain_core::{Amount, Keypair};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";
pub const GENESIS_KEY_FILE: &str = "genesis_key.json";

#[derive(Args)]
pub struct InitArgs {
    /// Directory to write the config and key file into
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Transactions per block (power of two)
    #[arg(short, long, default_value = "4")]
    batch_capacity: usize,

    /// Leading hex zeros required in a block digest
    #[arg(long, default_value = "2")]
    difficulty: u32,

    /// Amount issued to the genesis owner
    #[arg(short, long, default_value = "50")]
    genesis_amount: String,

    /// Nonce selection while mining
    #[arg(long, value_enum, default_value = "sequential")]
    strategy: StrategyArg,

    /// Overwrite an existing config
    #[arg(long)]
    force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    println!("{}", "Initializing powchain...".bold().cyan());
    println!();

    let genesis_amount: Amount = args
        .genesis_amount
        .parse()
        .with_context(|| format!("Invalid genesis amount: {}", args.genesis_amount))?;

    let keypair = Keypair::generate();
    let config = ChainConfig::new(
        args.batch_capacity,
        args.difficulty,
        keypair.public_key,
        genesis_amount,
    )
    .with_nonce_strategy(args.strategy.into());
    config.validate().context("Invalid chain parameters")?;

    println!(
        "  Genesis owner: {}",
        keypair.public_key.to_hex().bright_yellow()
    );

    let (config_file, key_file) = write_chain_files(&args.data_dir, &config, &keypair, args.force)?;

    println!(
        "{}  Saved config to: {}",
        "✓".green().bold(),
        config_file.display().to_string().bright_black()
    );
    println!(
        "{}  Saved genesis keypair to: {}",
        "✓".green().bold(),
        key_file.display().to_string().bright_black()
    );

    println!();
    println!("{}", "Chain initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!(
        "  • Use {} to mine transfers",
        format!("powchain run --config {}", config_file.display()).bright_cyan()
    );

    Ok(())
}

/// Write the config and genesis key file into `data_dir`.
pub fn write_chain_files(
    data_dir: &Path,
    config: &ChainConfig,
    keypair: &Keypair,
    force: bool,
) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    let config_file = data_dir.join(CONFIG_FILE);
    if config_file.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_file.display()
        );
    }
    config
        .write_json_file(&config_file)
        .with_context(|| format!("Failed to write config: {:?}", config_file))?;

    let key_file = data_dir.join(GENESIS_KEY_FILE);
    let key_json = serde_json::json!({
        "public_key": keypair.public_key.to_hex(),
        "private_key": hex::encode(keypair.private_key()),
    });
    fs::write(&key_file, serde_json::to_string_pretty(&key_json)?)
        .with_context(|| format!("Failed to write key file: {:?}", key_file))?;

    Ok((config_file, key_file))
}

/// Load the genesis keypair written by [`write_chain_files`].
pub fn load_genesis_key(path: &Path) -> Result<Keypair> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read key file: {:?}", path))?;
    let json: serde_json::Value = serde_json::from_str(&contents)?;
    let private_key = json["private_key"]
        .as_str()
        .context("Key file has no private_key")?;
    Ok(Keypair::from_private_key_hex(private_key)?)
}
