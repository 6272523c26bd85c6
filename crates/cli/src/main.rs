//! powchain CLI entry point.

use clap::Parser;

mod commands;
mod logging;

use logging::LogFormat;

#[derive(Parser)]
#[command(name = "powchain")]
#[command(about = "A proof-of-work ledger", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    log_format: LogFormat,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<commands::Commands>,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(cmd) => {
            logging::init_logging(cli.log_format, &cli.log_level);
            if let Err(e) = commands::run(cmd) {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("powchain - A proof-of-work ledger");
            println!("Run 'powchain --help' for usage information.");
        }
    }
}
