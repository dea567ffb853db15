//! Redeployer CLI
//!
//! Provisions deploy keys and talks to a running redeployer service.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "redeployer-cli")]
#[command(about = "Redeployer key and webhook CLI", long_about = None)]
struct Cli {
    /// Redeployer service URL
    #[arg(long, env = "REDEPLOYER_URL", default_value = "http://localhost:9000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config { url: cli.url };

    handle_command(cli.command, &config).await
}
