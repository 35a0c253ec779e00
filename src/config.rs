//! Pipeline configuration, loaded from the environment. Follows the same
//! `dotenv` + `unwrap_or_else(default).parse().unwrap_or(default)` shape as
//! `models::Config::from_env`.

use anyhow::{Context, Result};

/// `MIN_TOTAL_USD` is a compile-time constant tied to the exchange's minimum
/// order size (spec §6), not an environment-tunable.
pub const MIN_TOTAL_USD: f64 = 1.00;

#[derive(Debug, Clone)]
pub struct Config {
    pub user_addresses: Vec<String>,
    pub proxy_wallet: String,
    pub fetch_interval_secs: u64,
    pub too_old_secs: u64,
    pub dedup_cache_ttl_secs: u64,
    pub dedup_cache_max_entries: usize,
    pub trade_aggregation_enabled: bool,
    pub trade_aggregation_window_secs: u64,
    pub paper_trading_enabled: bool,
    pub paper_trading_balance_usd: f64,
    pub retry_limit: u32,
    pub worker_count: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let user_addresses = std::env::var("USER_ADDRESSES")
            .context("USER_ADDRESSES is required")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        if user_addresses.is_empty() {
            anyhow::bail!("USER_ADDRESSES must name at least one leader address");
        }

        let proxy_wallet = std::env::var("PROXY_WALLET").context("PROXY_WALLET is required")?;

        let fetch_interval_secs = std::env::var("FETCH_INTERVAL")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let too_old_secs = std::env::var("TOO_OLD_SECONDS")
            .context("TOO_OLD_SECONDS is required")?
            .parse()
            .context("TOO_OLD_SECONDS must be an integer")?;

        let dedup_cache_ttl_secs = std::env::var("DEDUP_CACHE_TTL_SECONDS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60)
            .max(1);

        let dedup_cache_max_entries = std::env::var("DEDUP_CACHE_MAX_ENTRIES")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .unwrap_or(5000);

        let trade_aggregation_enabled = parse_bool_env("TRADE_AGGREGATION_ENABLED", false);

        let trade_aggregation_window_secs = if trade_aggregation_enabled {
            std::env::var("TRADE_AGGREGATION_WINDOW_SECONDS")
                .context("TRADE_AGGREGATION_WINDOW_SECONDS is required when aggregation is enabled")?
                .parse()
                .context("TRADE_AGGREGATION_WINDOW_SECONDS must be an integer")?
        } else {
            0
        };

        let paper_trading_enabled = parse_bool_env("PAPER_TRADING_ENABLED", false);

        let paper_trading_balance_usd = if paper_trading_enabled {
            std::env::var("PAPER_TRADING_BALANCE_USD")
                .context("PAPER_TRADING_BALANCE_USD is required when paper trading is enabled")?
                .parse()
                .context("PAPER_TRADING_BALANCE_USD must be a number")?
        } else {
            0.0
        };

        let retry_limit = std::env::var("RETRY_LIMIT")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .unwrap_or(3);

        let worker_count = std::env::var("WORKER_COUNT")
            .unwrap_or_else(|_| "4".to_string())
            .parse()
            .unwrap_or(4);

        Ok(Self {
            user_addresses,
            proxy_wallet,
            fetch_interval_secs,
            too_old_secs,
            dedup_cache_ttl_secs,
            dedup_cache_max_entries,
            trade_aggregation_enabled,
            trade_aggregation_window_secs,
            paper_trading_enabled,
            paper_trading_balance_usd,
            retry_limit,
            worker_count,
        })
    }
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
