use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use social_agent_clients::agent::Agent;
use social_agent_clients::api::MarketApi;
use social_agent_clients::auth;
use social_agent_clients::config::{AppConfig, CONFIG_PATH};
use social_agent_clients::llm::OpenAiCompatClient;
use social_agent_clients::poller::{PollSettings, TopicClient, TopicMode};
use social_agent_clients::reporter;
use social_agent_clients::scalping::{MarketSettings, ScalpingClient};
use social_agent_clients::scheduler;
use social_agent_clients::store::{FileCache, LocalStore};
use social_agent_clients::telegram::TelegramBot;
use social_agent_clients::trending::TrendingClient;
use social_agent_clients::twitter::SocialClient;
use social_agent_clients::types::{ClientKind, ExitSummary, Profile};

#[derive(Parser)]
#[command(name = "social-agent", about = "Scheduled X and Telegram clients for a chat agent")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Log actions instead of posting, liking or messaging
    #[arg(long, conflicts_with = "live")]
    dry_run: bool,

    /// Send for real, overriding a dry_run setting in the config
    #[arg(long, conflicts_with = "dry_run")]
    live: bool,

    /// Clients to run (comma separated)
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_value = "discovery,like,scalping,trending"
    )]
    clients: Vec<ClientKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    if args.dry_run {
        config.settings.dry_run = true;
    } else if args.live {
        config.settings.dry_run = false;
    }
    config.validate()?;
    info!("Loaded config from {}", args.config.display());

    let mut seen = HashSet::new();
    let kinds: Vec<ClientKind> = args.clients.into_iter().filter(|k| seen.insert(*k)).collect();
    let wants_twitter = kinds
        .iter()
        .any(|k| matches!(k, ClientKind::Discovery | ClientKind::Like));
    let wants_telegram = kinds
        .iter()
        .any(|k| matches!(k, ClientKind::Scalping | ClientKind::Trending));

    if wants_telegram {
        if config.account.telegram_bot_token.trim().is_empty() {
            bail!("scalping/trending need a Telegram bot token (TELEGRAM_BOT_TOKEN)");
        }
        if config.settings.telegram_channel_id.trim().is_empty() {
            bail!("scalping/trending need a Telegram channel (TELEGRAM_CHANNEL_ID)");
        }
    }
    if wants_twitter && config.agent.topics.is_empty() {
        warn!("No topics configured; discovery and like ticks will be no-ops");
    }

    let mode = if config.settings.dry_run { "dry-run" } else { "live" };
    let names: Vec<&str> = kinds.iter().map(|k| k.prefix()).collect();
    info!("Starting social agent ({mode}) with clients: {}", names.join(", "));

    // ── Shared collaborators ──────────────────────────────────────
    let data_dir = &config.settings.data_dir;
    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let memory = Arc::new(LocalStore::open(data_dir.join("memory.json")).await?);
    let cache = Arc::new(FileCache::new(data_dir.join("cache")));

    let api_key = Some(config.account.llm_api_key.trim()).filter(|k| !k.is_empty());
    let model = Arc::new(OpenAiCompatClient::new(
        &config.endpoints.llm_api,
        api_key,
        config.model.clone(),
    ));

    let (social, profile): (Option<Arc<dyn SocialClient>>, Profile) = if wants_twitter {
        info!("Authenticating with the X API...");
        let ctx = auth::authenticate(
            &config.endpoints.twitter_api,
            &config.account.twitter_access_token,
        )
        .await?;
        info!("Authenticated as @{} ({})", ctx.profile.username, ctx.profile.id);
        let social: Arc<dyn SocialClient> = Arc::new(ctx.client);
        (Some(social), ctx.profile)
    } else {
        let profile = Profile {
            id: String::new(),
            username: config.agent.name.to_lowercase().replace(' ', "_"),
            name: config.agent.name.clone(),
        };
        (None, profile)
    };

    let agent = Arc::new(
        Agent::new(config.agent.clone(), profile, memory, cache, model)
            .with_templates(config.templates.clone()),
    );
    info!("Agent {} ({})", agent.persona.name, agent.id);

    // ── Spawn clients ─────────────────────────────────────────────
    let started_at = Utc::now();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    let market = Arc::new(MarketApi::new(
        &config.endpoints.binance_api,
        &config.endpoints.coingecko_api,
    ));
    let telegram = Arc::new(TelegramBot::new(
        &config.endpoints.telegram_api,
        config.account.telegram_bot_token.trim(),
    ));

    for kind in &kinds {
        let rx = shutdown_rx.clone();
        let handle = match (kind, &social) {
            (ClientKind::Discovery | ClientKind::Like, Some(social)) => {
                let mode = if *kind == ClientKind::Discovery {
                    TopicMode::Discovery
                } else {
                    TopicMode::Like
                };
                let client = TopicClient::new(
                    mode,
                    agent.clone(),
                    social.clone(),
                    PollSettings::from_config(&config.settings, mode),
                );
                scheduler::spawn(client, rx)
            }
            (ClientKind::Scalping, _) => {
                let client = ScalpingClient::new(
                    agent.clone(),
                    market.clone(),
                    telegram.clone(),
                    MarketSettings::from_config(&config.settings, *kind),
                );
                scheduler::spawn(client, rx)
            }
            (ClientKind::Trending, _) => {
                let client = TrendingClient::new(
                    agent.clone(),
                    market.clone(),
                    telegram.clone(),
                    MarketSettings::from_config(&config.settings, *kind),
                );
                scheduler::spawn(client, rx)
            }
            (_, None) => bail!("{kind} requires an authenticated X client"),
        };
        handles.push(handle);
    }

    info!("Clients running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Shutdown signal received, waiting for in-flight ticks...");
    let _ = shutdown_tx.send(true);

    let mut clients = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(summary) => clients.push(summary),
            Err(e) => warn!("Client task failed: {e}"),
        }
    }

    reporter::report_exit_summary(&ExitSummary {
        started_at: started_at.to_rfc3339(),
        stopped_at: Utc::now().to_rfc3339(),
        dry_run: config.settings.dry_run,
        clients,
    });

    Ok(())
}
