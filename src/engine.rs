use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::warn;

use crate::types::{Ticker24h, TrendingCoin, Tweet};

/// Quote asset the scalping client trades against.
pub const QUOTE_ASSET: &str = "USDT";

/// Coins the scalping client is allowed to talk about.
pub const RELATED_TOKENS: &[&str] = &[
    "BTC", "ETH", "BNB", "SOL", "XRP", "USDC", "ADA", "ARB", "LINK", "RUNE", "RNDR", "MATIC",
    "AAVE", "DOT", "KSM", "PEPE", "WIF", "GRT", "AVAX", "LTC", "SHIB", "UNI", "XMR", "ETC", "FIL",
    "OP", "TIA", "LUNC", "FTM", "MANA", "AXS", "CAKE", "AR", "INJ", "TRB", "JTO", "ENJ", "STETH",
    "TRX", "TON", "WBTC", "DAI", "BCH", "ATOM", "ICP", "NEAR", "XLM", "HBAR", "APT", "CRO", "STX",
    "QNT", "MNT", "TAO", "ALGO", "EGLD", "FDUSD", "BSV", "RETH", "FLOW", "MKR", "ORDI", "MINA",
    "THETA", "BTT", "SAND", "OSMO", "WEMIX", "KCS", "GALA", "SEI", "EOS", "BUSD", "KAVA", "NEO",
    "TKX", "SNX", "SUI", "ROSE",
];

/// Number of top-volume tokens the scalping client picks from.
pub const SCALPING_POOL_SIZE: usize = 10;

/// Trending coins above this BTC-denominated market cap are skipped.
pub const MAX_TRENDING_CAP_BTC: f64 = 40_000.0;

/// Trending coins included in one analysis prompt.
pub const TRENDING_SAMPLE_SIZE: usize = 3;

/// Prepare a fetched batch for the poll loop.
///
/// Drops repeated ids (first occurrence wins), the agent's own tweets and
/// tweets whose id is not an unsigned integer, then sorts ascending by the
/// numeric id.
pub fn select_candidates(batch: Vec<Tweet>, self_user_id: &str) -> Vec<Tweet> {
    let mut seen = HashSet::new();
    let mut out: Vec<(u64, Tweet)> = Vec::with_capacity(batch.len());

    for tweet in batch {
        if !seen.insert(tweet.id.clone()) {
            continue;
        }
        if tweet.user_id == self_user_id {
            continue;
        }
        match tweet.numeric_id() {
            Some(id) => out.push((id, tweet)),
            None => warn!("Dropping tweet with non-numeric id {:?}", tweet.id),
        }
    }

    out.sort_by_key(|(id, _)| *id);
    out.into_iter().map(|(_, t)| t).collect()
}

/// Whether a topic reply at `now` falls inside the conversation's window.
///
/// No prior reply means not limited. Exactly `min_interval` after the last
/// reply is eligible.
pub fn is_rate_limited(
    now: DateTime<Utc>,
    last_reply: Option<DateTime<Utc>>,
    min_interval: Duration,
) -> bool {
    match last_reply {
        None => false,
        Some(ts) => now.signed_duration_since(ts) < min_interval,
    }
}

/// Remove one layer of surrounding quotes. Both ends must carry the same
/// quote character.
pub fn strip_wrapping_quotes(text: &str) -> &str {
    let is_quote = |c: char| c == '"' || c == '\'';
    let mut chars = text.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if is_quote(first) && first == last => {
            &text[first.len_utf8()..text.len() - last.len_utf8()]
        }
        _ => text,
    }
}

/// Tidy a generated channel post: drop dingbat symbols (U+2700..U+27BF),
/// turn literal `\n` escapes into newlines, trim.
pub fn clean_generated_post(text: &str) -> String {
    text.chars()
        .filter(|c| !('\u{2700}'..='\u{27BF}').contains(c))
        .collect::<String>()
        .replace("\\n", "\n")
        .trim()
        .to_string()
}

/// Split `text` into chunks of at most `max` characters, keeping whole lines
/// together where possible. Lines longer than `max` are hard-split.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    if max == 0 {
        return Vec::new();
    }
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        if current_len + line_len + 1 > max {
            if !current.is_empty() {
                chunks.push(current.trim().to_string());
                current.clear();
                current_len = 0;
            }
            if line_len > max {
                let chars: Vec<char> = line.chars().collect();
                chunks.extend(chars.chunks(max).map(|c| c.iter().collect::<String>()));
                continue;
            }
        }
        current.push_str(line);
        current.push('\n');
        current_len += line_len + 1;
    }

    if !current.is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks.retain(|c| !c.is_empty());
    chunks
}

/// Render a tweet for the `currentPost` prompt slot.
pub fn format_tweet(tweet: &Tweet) -> String {
    format!(
        "  ID: {}\n  From: {} (@{})\n  Text: {}",
        tweet.id, tweet.name, tweet.username, tweet.text
    )
}

/// Render a reply thread (oldest first) for the prompt.
pub fn format_conversation(thread: &[Tweet]) -> String {
    thread
        .iter()
        .map(|t| {
            format!(
                "@{} ({}):\n        {}",
                t.username,
                t.created_at.format("%b %-d, %H:%M"),
                t.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Base asset of a `USDT`-quoted pair, e.g. `SOLUSDT` -> `SOL`.
pub fn base_asset(symbol: &str) -> Option<&str> {
    symbol
        .strip_suffix(QUOTE_ASSET)
        .filter(|base| !base.is_empty())
}

/// Pick the scalping pool: USDT pairs on related tokens, highest quote
/// volume first, at most `n`.
pub fn select_scalping_tokens(
    mut tickers: Vec<Ticker24h>,
    related: &[&str],
    n: usize,
) -> Vec<Ticker24h> {
    tickers.sort_by(|a, b| b.quote_volume.cmp(&a.quote_volume));
    tickers
        .into_iter()
        .filter(|t| !t.symbol.starts_with(QUOTE_ASSET))
        .filter(|t| base_asset(&t.symbol).is_some_and(|base| related.contains(&base)))
        .take(n)
        .collect()
}

/// One-line description of a ticker used as the prompt's message text.
pub fn describe_ticker(ticker: &Ticker24h) -> String {
    let direction = if ticker.price_change_percent >= Decimal::ZERO {
        "up"
    } else {
        "down"
    };
    format!(
        "Analyzing {} at {} ({}% {direction})",
        ticker.symbol,
        ticker.last_price.normalize(),
        ticker.price_change_percent.normalize()
    )
}

/// Compact quote volume, e.g. `912.3M`.
pub fn compact_volume(volume: Decimal) -> String {
    let v = volume.to_f64().unwrap_or(0.0);
    let (scaled, suffix) = if v >= 1e9 {
        (v / 1e9, "B")
    } else if v >= 1e6 {
        (v / 1e6, "M")
    } else if v >= 1e3 {
        (v / 1e3, "K")
    } else {
        (v, "")
    };
    let s = format!("{scaled:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    format!("{s}{suffix}")
}

/// Keep small-cap trending coins and sample `n` of them at random.
pub fn select_trending_coins<R: Rng + ?Sized>(
    coins: Vec<TrendingCoin>,
    max_cap_btc: f64,
    n: usize,
    rng: &mut R,
) -> Vec<TrendingCoin> {
    let mut eligible: Vec<TrendingCoin> = coins
        .into_iter()
        .filter(|c| {
            c.item
                .data
                .as_ref()
                .and_then(|d| d.market_cap_btc.as_deref())
                .and_then(|cap| cap.replace(',', "").trim().parse::<f64>().ok())
                .is_some_and(|cap| cap < max_cap_btc)
        })
        .collect();
    eligible.shuffle(rng);
    eligible.truncate(n);
    eligible
}

/// Render trending coins as the analysis prompt's data block.
pub fn format_trending_coins(coins: &[TrendingCoin]) -> String {
    coins
        .iter()
        .map(|coin| {
            let item = &coin.item;
            let rank = item
                .market_cap_rank
                .map(|r| format!("#{r}"))
                .unwrap_or_else(|| "n/a".to_string());
            let mut out = format!(
                "Coin: {} ({})\nRank: {rank}\n",
                item.name,
                item.symbol.to_uppercase()
            );
            if let Some(data) = &item.data {
                if let Some(price) = data.price {
                    out.push_str(&format!("Price: ${price:.4}\n"));
                }
                if let Some(change) = data.price_change_percentage_24h.get("usd") {
                    out.push_str(&format!("24h Change: {change:.2}%\n"));
                }
                if let Some(cap) = &data.market_cap {
                    out.push_str(&format!("Market Cap: {cap}\n"));
                }
                if let Some(volume) = &data.total_volume {
                    out.push_str(&format!("Volume: {volume}\n"));
                }
                if let Some(desc) = data
                    .content
                    .as_ref()
                    .and_then(|c| c.description.as_deref())
                    .filter(|d| !d.is_empty())
                {
                    out.push_str(&format!("Description: {desc}\n"));
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_tweet;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn ticker(symbol: &str, volume: Decimal) -> Ticker24h {
        Ticker24h {
            symbol: symbol.to_string(),
            last_price: dec!(1.5),
            price_change_percent: dec!(2.0),
            quote_volume: volume,
        }
    }

    fn trending(id: &str, cap_btc: Option<&str>) -> TrendingCoin {
        serde_json::from_value(json!({
            "item": {
                "id": id,
                "name": format!("Coin {id}"),
                "symbol": id,
                "market_cap_rank": 120,
                "score": 0,
                "data": {
                    "price": 0.01234,
                    "price_change_percentage_24h": { "usd": 12.3456 },
                    "market_cap": "$1,234,567",
                    "market_cap_btc": cap_btc,
                    "total_volume": "$99,000",
                    "content": null
                }
            }
        }))
        .expect("valid trending fixture")
    }

    // ── select_candidates ──────────────────────────────────────────

    #[test]
    fn candidates_dedup_by_id() {
        let batch = vec![
            make_tweet("200", "u1", "a"),
            make_tweet("100", "u2", "b"),
            make_tweet("200", "u1", "a again"),
        ];
        let out = select_candidates(batch, "me");
        let ids: Vec<&str> = out.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["100", "200"]);
        assert_eq!(out[1].text, "a");
    }

    #[test]
    fn candidates_exclude_self() {
        let batch = vec![make_tweet("100", "me", "mine"), make_tweet("101", "u2", "theirs")];
        let out = select_candidates(batch, "me");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "101");
    }

    #[test]
    fn candidates_sort_numerically() {
        // Lexicographic order would put "10" before "9".
        let batch = vec![
            make_tweet("10", "u", "x"),
            make_tweet("9", "u", "y"),
            make_tweet("1850000000000000001", "u", "z"),
        ];
        let ids: Vec<String> = select_candidates(batch, "me").into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["9", "10", "1850000000000000001"]);
    }

    #[test]
    fn candidates_drop_non_numeric() {
        let batch = vec![make_tweet("abc", "u", "x"), make_tweet("5", "u", "y")];
        let out = select_candidates(batch, "me");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "5");
    }

    // ── is_rate_limited ────────────────────────────────────────────

    #[test]
    fn rate_limit_boundaries() {
        let now = Utc::now();
        let window = Duration::seconds(3600);
        assert!(!is_rate_limited(now, None, window));
        assert!(is_rate_limited(now, Some(now - Duration::seconds(3599)), window));
        assert!(!is_rate_limited(now, Some(now - Duration::seconds(3600)), window));
        assert!(!is_rate_limited(now, Some(now - Duration::seconds(7200)), window));
    }

    // ── text helpers ───────────────────────────────────────────────

    #[test]
    fn strips_single_quote_layer() {
        assert_eq!(strip_wrapping_quotes("\"hello\""), "hello");
        assert_eq!(strip_wrapping_quotes("'hello'"), "hello");
        assert_eq!(strip_wrapping_quotes("\"\"nested\"\""), "\"nested\"");
        assert_eq!(strip_wrapping_quotes("no quotes"), "no quotes");
        assert_eq!(strip_wrapping_quotes("\"open only"), "\"open only");
        assert_eq!(strip_wrapping_quotes("\""), "\"");
        assert_eq!(strip_wrapping_quotes("\"mixed'"), "\"mixed'");
        assert_eq!(strip_wrapping_quotes("'mixed\""), "'mixed\"");
    }

    #[test]
    fn clean_post_drops_dingbats_and_unescapes() {
        let raw = "  sol looking ready \u{2705}\\nbreakout on 4h  ";
        assert_eq!(clean_generated_post(raw), "sol looking ready \nbreakout on 4h");
    }

    #[test]
    fn split_short_message_untouched() {
        assert_eq!(split_message("short", 280), vec!["short"]);
    }

    #[test]
    fn split_keeps_lines_together() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(split_message(text, 10), vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn split_hard_splits_long_lines() {
        let text = format!("intro\n{}", "x".repeat(25));
        let chunks = split_message(&text, 10);
        assert_eq!(chunks, vec!["intro", "xxxxxxxxxx", "xxxxxxxxxx", "xxxxx"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn format_conversation_renders_thread() {
        let mut t = make_tweet("1", "u", "gm");
        t.username = "bob".into();
        let out = format_conversation(&[t]);
        assert_eq!(out, "@bob (Nov 2, 12:00):\n        gm");
    }

    // ── scalping selection ─────────────────────────────────────────

    #[test]
    fn scalping_filters_and_orders_by_volume() {
        let tickers = vec![
            ticker("SOLUSDT", dec!(500)),
            ticker("BTCUSDT", dec!(900)),
            ticker("USDTTRY", dec!(10000)),
            ticker("FOOUSDT", dec!(800)),
            ticker("ETHBTC", dec!(700)),
            ticker("ETHUSDT", dec!(600)),
        ];
        let out = select_scalping_tokens(tickers, RELATED_TOKENS, 10);
        let symbols: Vec<&str> = out.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
    }

    #[test]
    fn scalping_caps_pool() {
        let tickers = vec![
            ticker("SOLUSDT", dec!(1)),
            ticker("BTCUSDT", dec!(3)),
            ticker("ETHUSDT", dec!(2)),
        ];
        let out = select_scalping_tokens(tickers, RELATED_TOKENS, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].symbol, "BTCUSDT");
    }

    #[test]
    fn base_asset_requires_quote_suffix() {
        assert_eq!(base_asset("SOLUSDT"), Some("SOL"));
        assert_eq!(base_asset("USDT"), None);
        assert_eq!(base_asset("ETHBTC"), None);
    }

    #[test]
    fn describe_ticker_mentions_direction() {
        let mut t = ticker("SOLUSDT", dec!(1));
        t.price_change_percent = dec!(-3.50);
        assert_eq!(describe_ticker(&t), "Analyzing SOLUSDT at 1.5 (-3.5% down)");
    }

    #[test]
    fn compact_volume_suffixes() {
        assert_eq!(compact_volume(dec!(912345678.12)), "912.35M");
        assert_eq!(compact_volume(dec!(1500)), "1.5K");
        assert_eq!(compact_volume(dec!(12)), "12");
    }

    // ── trending selection ─────────────────────────────────────────

    #[test]
    fn trending_filters_large_and_missing_caps() {
        let coins = vec![
            trending("a", Some("39999.5")),
            trending("b", Some("40000")),
            trending("c", None),
            trending("d", Some("1,234.5")),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        let mut ids: Vec<String> = select_trending_coins(coins, MAX_TRENDING_CAP_BTC, 3, &mut rng)
            .into_iter()
            .map(|c| c.item.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "d"]);
    }

    #[test]
    fn trending_samples_at_most_n() {
        let coins = (0..6).map(|i| trending(&i.to_string(), Some("10"))).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let out =
            select_trending_coins(coins, MAX_TRENDING_CAP_BTC, TRENDING_SAMPLE_SIZE, &mut rng);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn trending_format_block() {
        let out = format_trending_coins(&[trending("pepe", Some("10"))]);
        assert!(out.starts_with("Coin: Coin pepe (PEPE)\nRank: #120\n"));
        assert!(out.contains("Price: $0.0123\n"));
        assert!(out.contains("24h Change: 12.35%\n"));
        assert!(!out.contains("Description"));
    }
}
