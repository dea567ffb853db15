//! Key command handlers
//!
//! Generates encoded scrypt keys for the service configuration and checks
//! tokens against them offline.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use redeployer_core::key::{KeyParams, generate_salt};
use redeployer_core::{AuthError, Authenticator, ScryptKey};

/// Random bytes in a generated token
const TOKEN_BYTES: usize = 16;

/// Key subcommands
#[derive(Subcommand)]
pub enum KeyCommands {
    /// Generate an encoded key and salt for a deploy token
    Keygen {
        /// Token to hash; a random one is generated when omitted
        #[arg(long)]
        token: Option<String>,

        /// scrypt CPU/memory cost, a power of two
        #[arg(long, default_value_t = 16384)]
        n: u64,

        /// scrypt block size
        #[arg(long, default_value_t = 8)]
        r: u32,

        /// scrypt parallelism
        #[arg(long, default_value_t = 1)]
        p: u32,

        /// Derived key length in bytes
        #[arg(long, default_value_t = 32)]
        key_len: usize,
    },

    /// Check a token against an encoded key and salt
    Verify {
        /// Encoded key (alg=scrypt$N=...$hash=...)
        #[arg(long)]
        key: String,

        /// Hex encoded salt
        #[arg(long)]
        salt: String,

        /// Token to check
        #[arg(long, env = "REDEPLOYER_TOKEN")]
        token: String,
    },
}

/// Handle key commands
pub async fn handle_key_command(command: KeyCommands) -> Result<()> {
    match command {
        KeyCommands::Keygen {
            token,
            n,
            r,
            p,
            key_len,
        } => keygen(token, KeyParams { n, r, p, key_len }).await,
        KeyCommands::Verify { key, salt, token } => verify(&key, &salt, &token).await,
    }
}

/// Result of a keygen run
struct GeneratedKey {
    key: ScryptKey,
    /// Set only when the token was generated here
    token: Option<String>,
}

fn generate_key(token: Option<String>, params: KeyParams) -> Result<GeneratedKey> {
    let (token, generated) = match token {
        Some(token) if !token.is_empty() => (token, false),
        Some(_) => anyhow::bail!("Token must not be empty"),
        None => (generate_salt(TOKEN_BYTES), true),
    };

    let key = ScryptKey::generate(&token, params).context("Failed to generate key")?;

    Ok(GeneratedKey {
        key,
        token: generated.then_some(token),
    })
}

async fn keygen(token: Option<String>, params: KeyParams) -> Result<()> {
    let generated = tokio::task::spawn_blocking(move || generate_key(token, params)).await??;

    println!("{}", "Key generated".green().bold());
    println!();
    println!("  Key:   {}", generated.key);
    println!("  Salt:  {}", generated.key.salt());
    if let Some(token) = &generated.token {
        println!("  Token: {}", token.bold());
        println!();
        println!(
            "{}",
            "Store the token now, it cannot be recovered from the key.".yellow()
        );
    }

    Ok(())
}

fn check_token(key: &str, salt: &str, token: &str) -> Result<bool> {
    let key = ScryptKey::parse(key)
        .context("Failed to parse key")?
        .with_salt(salt);
    key.validate().context("Key is not usable")?;

    match Authenticator::new(key).authenticate(Some(token)) {
        Ok(()) => Ok(true),
        Err(AuthError::Unauthorized) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn verify(key: &str, salt: &str, token: &str) -> Result<()> {
    let (key, salt, token) = (key.to_string(), salt.to_string(), token.to_string());
    let matched = tokio::task::spawn_blocking(move || check_token(&key, &salt, &token)).await??;

    if matched {
        println!("{}", "✓ Token matches key".green());
        Ok(())
    } else {
        println!("{}", "✗ Token does not match key".red());
        anyhow::bail!("Token mismatch")
    }
}
