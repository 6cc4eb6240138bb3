use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::{Ticker24h, TrendingCoin, TrendingResponse};

/// Market-data collaborator used by the scalping and trending clients.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn tickers_24h(&self) -> Result<Vec<Ticker24h>>;
    async fn trending(&self) -> Result<Vec<TrendingCoin>>;
}

/// Public Binance and CoinGecko endpoints, no keys required.
pub struct MarketApi {
    client: Client,
    binance_base: String,
    coingecko_base: String,
}

impl MarketApi {
    pub fn new(binance_base: &str, coingecko_base: &str) -> Self {
        Self {
            client: Client::new(),
            binance_base: binance_base.to_string(),
            coingecko_base: coingecko_base.to_string(),
        }
    }
}

#[async_trait]
impl MarketData for MarketApi {
    async fn tickers_24h(&self) -> Result<Vec<Ticker24h>> {
        fetch_tickers_24h(&self.client, &self.binance_base).await
    }

    async fn trending(&self) -> Result<Vec<TrendingCoin>> {
        fetch_trending(&self.client, &self.coingecko_base).await
    }
}

async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
) -> Result<T> {
    let resp = client
        .get(url)
        .query(query)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("GET {url} failed ({status}): {body}");
    }
    resp.json().await.with_context(|| format!("GET {url}: bad body"))
}

/// Fetch the 24h rolling ticker for every Binance spot symbol.
pub async fn fetch_tickers_24h(client: &Client, base: &str) -> Result<Vec<Ticker24h>> {
    let url = format!("{}/api/v3/ticker/24hr", base.trim_end_matches('/'));
    let tickers: Vec<Ticker24h> = get_json(client, &url, &[]).await?;
    debug!("Fetched {} tickers", tickers.len());
    Ok(tickers)
}

/// Fetch CoinGecko's trending coins.
pub async fn fetch_trending(client: &Client, base: &str) -> Result<Vec<TrendingCoin>> {
    let url = format!("{}/api/v3/search/trending", base.trim_end_matches('/'));
    let resp: TrendingResponse = get_json(client, &url, &[]).await?;
    debug!("Fetched {} trending coins", resp.coins.len());
    Ok(resp.coins)
}

/// Spot price of `coin_id` in `vs` (e.g. `bitcoin` in `usd`).
pub async fn fetch_simple_price(
    client: &Client,
    base: &str,
    coin_id: &str,
    vs: &str,
) -> Result<Decimal> {
    let url = format!("{}/api/v3/simple/price", base.trim_end_matches('/'));
    let resp: HashMap<String, HashMap<String, Decimal>> =
        get_json(client, &url, &[("ids", coin_id), ("vs_currencies", vs)]).await?;
    resp.get(coin_id)
        .and_then(|prices| prices.get(vs))
        .copied()
        .with_context(|| format!("no {vs} price for {coin_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn trending_payload_parses() {
        let resp: TrendingResponse = serde_json::from_value(json!({
            "coins": [{
                "item": {
                    "id": "pepe",
                    "coin_id": 29850,
                    "name": "Pepe",
                    "symbol": "PEPE",
                    "market_cap_rank": 24,
                    "score": 0,
                    "data": {
                        "price": 0.0000213,
                        "price_change_percentage_24h": { "usd": 12.5, "btc": 9.1 },
                        "market_cap": "$8,961,524,312",
                        "market_cap_btc": "90412.2",
                        "total_volume": "$2,128,447,118"
                    }
                }
            }],
            "nfts": [],
            "categories": []
        }))
        .unwrap();
        let item = &resp.coins[0].item;
        assert_eq!(item.symbol, "PEPE");
        let data = item.data.as_ref().unwrap();
        assert_eq!(data.price_change_percentage_24h["usd"], 12.5);
        assert!(data.content.is_none());
    }

    #[test]
    fn simple_price_shape() {
        let resp: HashMap<String, HashMap<String, Decimal>> =
            serde_json::from_value(json!({ "bitcoin": { "usd": 67187.5 } })).unwrap();
        assert_eq!(resp["bitcoin"]["usd"], dec!(67187.5));
    }
}
