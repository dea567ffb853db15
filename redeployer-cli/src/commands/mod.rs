//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod key;
mod service;

pub use key::KeyCommands;
pub use service::ServiceCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Deploy key management
    #[command(flatten)]
    Key(KeyCommands),

    /// Calls against a running service
    #[command(flatten)]
    Service(ServiceCommands),
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Key(command) => key::handle_key_command(command).await,
        Commands::Service(command) => service::handle_service_command(command, config).await,
    }
}
