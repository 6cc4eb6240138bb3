//! setup-account — First-time setup for the social agent.
//!
//! Expects `config.toml` to already exist (copied from `config.toml.template`).
//! Verifies the X access token against `/2/users/me`, prints the account it
//! belongs to, and stores the token in the existing config file.
//!
//! By default, reads the token interactively (hidden input) to avoid
//! leaking it into shell history. Use `--access-token` only for scripted/CI use.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use social_agent_clients::auth;
use social_agent_clients::config::{AppConfig, CONFIG_PATH};

#[derive(Parser)]
#[command(
    name = "setup-account",
    about = "Verify the X access token, print the account, and save it to config.toml"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// OAuth 2.0 user-context access token.
    /// If omitted, reads interactively with hidden input (recommended).
    #[arg(long)]
    access_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_path();

    let mut app_config = AppConfig::load(config_path).with_context(|| {
        format!(
            "{} not found — copy config.toml.template to config.toml first",
            config_path.display()
        )
    })?;

    println!("=== Social Agent — Account Setup ===\n");

    // ── Step 1: Read access token ──────────────────────────────────
    let token = match cli.access_token {
        Some(token) => token.trim().to_string(),
        None => rpassword::prompt_password("Enter X access token: ")
            .context("failed to read access token")?
            .trim()
            .to_string(),
    };
    if token.is_empty() {
        bail!("access token cannot be empty");
    }

    // ── Step 2: Verify against the X API ───────────────────────────
    println!("Verifying access token...");
    let ctx = auth::authenticate(&app_config.endpoints.twitter_api, &token).await?;
    println!("  Authentication successful");
    println!();

    // ── Step 3: Check the rest of the config ───────────────────────
    if app_config.agent.topics.is_empty() {
        println!("  WARNING: [agent] topics is empty — discovery and like will never search");
    }
    if app_config.account.telegram_bot_token.is_empty() {
        println!("  NOTE: no Telegram bot token — scalping and trending cannot run");
    }
    if app_config.account.llm_api_key.is_empty() {
        println!("  NOTE: no model API key — only keyless endpoints will work");
    }
    println!();

    // ── Step 4: Update access token in config.toml ─────────────────
    println!("Updating access token in {}...", config_path.display());
    app_config.account.twitter_access_token = token;
    app_config.save(config_path)?;
    println!("  Config updated successfully");
    println!();

    // ── Summary ────────────────────────────────────────────────────
    println!("=== Setup Complete ===");
    println!();
    println!("Account:");
    println!("  Handle:  @{}", ctx.profile.username);
    println!("  Name:    {}", ctx.profile.name);
    println!("  User id: {}", ctx.profile.id);
    println!();
    println!("Next steps:");
    println!("  cargo run --bin social-agent -- --dry-run \\");
    println!("    --clients discovery,like,scalping,trending");

    Ok(())
}
