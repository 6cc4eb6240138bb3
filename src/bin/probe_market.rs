//! Probe: public market-data endpoints
//!
//! Hits the Binance 24h ticker, CoinGecko trending and CoinGecko simple
//! price endpoints and prints what the scalping and trending clients would
//! see: the scalping pool, the small-cap trending sample and its prompt block.

use std::time::Instant;

use anyhow::Result;
use reqwest::Client;

use social_agent_clients::api::{fetch_simple_price, fetch_tickers_24h, fetch_trending};
use social_agent_clients::engine::{
    MAX_TRENDING_CAP_BTC, RELATED_TOKENS, SCALPING_POOL_SIZE, TRENDING_SAMPLE_SIZE,
    compact_volume, describe_ticker, format_trending_coins, select_scalping_tokens,
    select_trending_coins,
};
use social_agent_clients::{BINANCE_API_BASE, COINGECKO_API_BASE};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let binance = std::env::var("BINANCE_API_BASE").unwrap_or_else(|_| BINANCE_API_BASE.into());
    let coingecko =
        std::env::var("COINGECKO_API_BASE").unwrap_or_else(|_| COINGECKO_API_BASE.into());
    let client = Client::new();

    println!("=== Probe: market data ===");
    println!();

    // 1. Binance tickers
    println!("--- 1. Binance 24h tickers ---");
    let start = Instant::now();
    let tickers = fetch_tickers_24h(&client, &binance).await?;
    println!("Fetched {} tickers (latency: {:?})", tickers.len(), start.elapsed());
    let pool = select_scalping_tokens(tickers, RELATED_TOKENS, SCALPING_POOL_SIZE);
    println!("Scalping pool ({} of max {SCALPING_POOL_SIZE}):", pool.len());
    for t in &pool {
        println!(
            "  {:<12} vol {:>8}  {}",
            t.symbol,
            compact_volume(t.quote_volume),
            describe_ticker(t)
        );
    }
    println!();

    // 2. CoinGecko trending
    println!("--- 2. CoinGecko trending ---");
    let start = Instant::now();
    let coins = fetch_trending(&client, &coingecko).await?;
    println!("Fetched {} trending coins (latency: {:?})", coins.len(), start.elapsed());
    for c in &coins {
        let cap = c
            .item
            .data
            .as_ref()
            .and_then(|d| d.market_cap_btc.clone())
            .unwrap_or_else(|| "?".into());
        println!("  {:<10} rank {:?}  cap_btc {cap}", c.item.symbol, c.item.market_cap_rank);
    }
    let sample = select_trending_coins(
        coins,
        MAX_TRENDING_CAP_BTC,
        TRENDING_SAMPLE_SIZE,
        &mut rand::rng(),
    );
    println!("\nSample under {MAX_TRENDING_CAP_BTC} BTC:\n");
    println!("{}", format_trending_coins(&sample));
    println!();

    // 3. BTC spot price
    println!("--- 3. BTC simple price ---");
    let price = fetch_simple_price(&client, &coingecko, "bitcoin", "usd").await?;
    println!("bitcoin/usd: {price}");

    Ok(())
}
