//! Service command handlers
//!
//! Calls the webhook endpoints of a running redeployer.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use redeployer_client::{ClientError, RedeployerClient};

use crate::config::Config;

/// Service subcommands
#[derive(Subcommand)]
pub enum ServiceCommands {
    /// Trigger a redeployment
    Trigger {
        /// Target identifier
        #[arg(long)]
        target: String,

        /// Image reference to deploy
        #[arg(long)]
        image: String,

        /// Deploy token
        #[arg(long, env = "REDEPLOYER_TOKEN")]
        token: String,
    },

    /// Check that the service is up
    Health,
}

/// Handle service commands
pub async fn handle_service_command(command: ServiceCommands, config: &Config) -> Result<()> {
    let client = RedeployerClient::new(&config.url);

    match command {
        ServiceCommands::Trigger {
            target,
            image,
            token,
        } => trigger(&client, &token, &target, &image).await,
        ServiceCommands::Health => health(&client).await,
    }
}

async fn trigger(client: &RedeployerClient, token: &str, target: &str, image: &str) -> Result<()> {
    match client.redeploy(token, target, image).await {
        Ok(message) => {
            println!("{} {}", "✓".green(), message);
            println!("  Target: {}", target.bold());
            println!("  Image:  {}", image);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), describe(&e).red());
            Err(e.into())
        }
    }
}

async fn health(client: &RedeployerClient) -> Result<()> {
    let message = client.health().await?;
    println!(
        "{} {} ({})",
        "✓".green(),
        message,
        client.base_url().dimmed()
    );
    Ok(())
}

/// Human readable reason for a failed trigger
fn describe(error: &ClientError) -> String {
    if error.is_unauthorized() {
        "Deploy token rejected".to_string()
    } else if error.is_forbidden() {
        "Image is not allowed for this target".to_string()
    } else if error.is_not_found() {
        "Unknown target".to_string()
    } else {
        error.to_string()
    }
}
