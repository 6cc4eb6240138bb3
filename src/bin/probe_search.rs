//! Probe: one topic search
//!
//! Authenticates with TWITTER_ACCESS_TOKEN, runs a single latest-mode search
//! and prints the raw batch next to the candidates a topic client would
//! process, as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use social_agent_clients::TWITTER_API_BASE;
use social_agent_clients::auth;
use social_agent_clients::engine::select_candidates;
use social_agent_clients::twitter::SocialClient;
use social_agent_clients::types::SearchMode;

#[derive(Parser)]
#[command(name = "probe_search", about = "Run one search and show candidate selection")]
struct Args {
    /// Search query (a topic, or @handle for mentions)
    query: String,

    /// Items to request
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let token = std::env::var("TWITTER_ACCESS_TOKEN").context("TWITTER_ACCESS_TOKEN not set")?;
    let base = std::env::var("TWITTER_API_BASE").unwrap_or_else(|_| TWITTER_API_BASE.into());
    let ctx = auth::authenticate(&base, &token).await?;
    eprintln!("Authenticated as @{}", ctx.profile.username);

    let batch = ctx
        .client
        .search(&args.query, args.limit, SearchMode::Latest)
        .await?;
    let fetched: Vec<String> = batch.iter().map(|t| t.id.clone()).collect();
    let candidates = select_candidates(batch, &ctx.profile.id);

    let out = json!({
        "query": args.query,
        "fetched": fetched,
        "candidates": candidates,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    Ok(())
}
