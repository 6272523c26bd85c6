//! CLI commands module.

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use powchain_core::NonceStrategy;

mod init;
mod run;

#[derive(Subcommand)]
pub enum Commands {
    /// Write a chain config and genesis keypair
    Init(init::InitArgs),
    /// Build a chain, mine random transfers and validate the result
    Run(run::RunArgs),
}

pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init(args) => init::run(args),
        Commands::Run(args) => run::run(args),
    }
}

/// Nonce selection as exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Sequential,
    Random,
}

impl From<StrategyArg> for NonceStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Sequential => NonceStrategy::Sequential,
            StrategyArg::Random => NonceStrategy::Random,
        }
    }
}
