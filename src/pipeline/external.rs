//! External collaborator contracts (spec §6). These name the interfaces the
//! core pipeline consumes; order sizing/pricing and wallet signing live
//! outside this crate's scope.
//!
//! HTTP client shape (timeouts, retry-free single attempt, logging on
//! failure) is grounded on `scrapers::polymarket_api::PolymarketScraper` and
//! `scrapers::dome_tracker::DomeClient`. Unlike those scrapers, the core
//! performs no retries of its own — per spec §5/§7 the monitor's poll cadence
//! and the executor's next-activity loop are the natural retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use super::types::Position;

const DATA_API_BASE: &str = "https://data-api.polymarket.com";
const FEED_TIMEOUT: Duration = Duration::from_secs(15);
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Context handed to the order-submission path for one activity.
pub struct OrderSubmission<'a> {
    pub side: &'a str,
    pub own_position: Option<&'a Position>,
    pub leader_position: Option<&'a Position>,
    pub usdc_size: f64,
    pub price: f64,
    pub own_balance: f64,
    pub user_balance: f64,
    pub leader_address: &'a str,
}

/// The live CLOB order-submission client. Sizing/pricing policy is out of
/// scope (spec §1); only the contract the executor calls is named here.
#[async_trait]
pub trait OrderSubmitter: Send + Sync {
    async fn submit_order(&self, ctx: OrderSubmission<'_>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PositionsClient: Send + Sync {
    async fn positions(&self, address: &str) -> anyhow::Result<Vec<Position>>;
}

#[async_trait]
pub trait BalanceClient: Send + Sync {
    async fn balance(&self, address: &str) -> anyhow::Result<f64>;
}

/// `GET /positions?user={addr}` client.
pub struct PolymarketPositionsClient {
    client: Client,
}

impl PolymarketPositionsClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .user_agent("copytrader/1.0")
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PositionsClient for PolymarketPositionsClient {
    async fn positions(&self, address: &str) -> anyhow::Result<Vec<Position>> {
        let url = format!("{}/positions", DATA_API_BASE);
        let response = self
            .client
            .get(&url)
            .query(&[("user", address)])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(address, error = %e, "positions lookup failed");
                return Err(e.into());
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            warn!(address, %status, "positions lookup returned an error status");
            anyhow::bail!("positions lookup failed with status {}", status);
        }

        Ok(response.json::<Vec<Position>>().await?)
    }
}

/// Opaque balance lookup (spec §6: "Balance lookup (opaque helper)"). The
/// concrete endpoint is unspecified by the data-api surface named in spec.md,
/// so this implementation treats it as a thin wrapper over the same host,
/// matching the opacity the spec ascribes to it.
pub struct PolymarketBalanceClient {
    client: Client,
}

impl PolymarketBalanceClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .user_agent("copytrader/1.0")
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BalanceClient for PolymarketBalanceClient {
    async fn balance(&self, address: &str) -> anyhow::Result<f64> {
        let url = format!("{}/balance", DATA_API_BASE);
        let response = self
            .client
            .get(&url)
            .query(&[("user", address)])
            .timeout(FEED_TIMEOUT)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(address, error = %e, "balance lookup failed");
                return Err(e.into());
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            warn!(address, %status, "balance lookup returned an error status");
            anyhow::bail!("balance lookup failed with status {}", status);
        }

        #[derive(serde::Deserialize)]
        struct BalanceResponse {
            balance: f64,
        }
        let parsed: BalanceResponse = response.json().await?;
        Ok(parsed.balance)
    }
}
